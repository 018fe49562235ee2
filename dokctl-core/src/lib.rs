pub mod error;
pub mod model;
pub mod service;

// Remote operations over the service
pub mod api;
pub mod extract;
pub mod transfer;

// Local persistence
pub mod cache;
pub mod clock;
pub mod config;

// Interactive engine
pub mod reconcile;
pub mod reducer;
pub mod scheduler;
pub mod search;
pub mod session;
pub mod state;
pub mod wizard;
