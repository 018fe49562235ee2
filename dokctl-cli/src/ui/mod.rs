pub mod keys;
pub mod render;
pub mod theme;

pub use theme::styles;
