//! Color palette and style helpers for the dokctl TUI.

use ratatui::style::{ Color, Modifier, Style };

use dokctl_core::model::ResourceKind;
use dokctl_core::state::Outcome;

/// Color palette tokens for the theme
#[derive(Clone, Debug)]
pub struct Palette {
    /// Panel border color
    pub panel_border: Color,
    /// Primary text color
    pub text: Color,
    /// Dimmed text (secondary info)
    pub text_dim: Color,
    /// Muted text (tertiary info, disabled)
    pub text_muted: Color,
    /// Accent color (highlights, focus)
    pub accent: Color,
    /// Success state (running, done)
    pub success: Color,
    /// Warning state (deploying, unknown)
    pub warn: Color,
    /// Error state
    pub error: Color,
    /// Info state (informational)
    pub info: Color,
    pub selection_bg: Color,
    pub selection_fg: Color,
    /// Key hint text
    pub key_hint: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self::dark()
    }
}

impl Palette {
    pub fn dark() -> Self {
        Self {
            panel_border: Color::Rgb(60, 60, 60),
            text: Color::Rgb(212, 212, 212),
            text_dim: Color::Rgb(150, 150, 150),
            text_muted: Color::Rgb(100, 100, 100),
            accent: Color::Rgb(79, 193, 255), // Light blue
            success: Color::Rgb(78, 201, 176), // Teal green
            warn: Color::Rgb(220, 180, 100), // Amber
            error: Color::Rgb(244, 135, 113), // Coral red
            info: Color::Rgb(156, 220, 254), // Light cyan
            selection_bg: Color::Rgb(38, 79, 120), // Dark blue
            selection_fg: Color::White,
            key_hint: Color::Rgb(206, 145, 120), // Soft orange
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Theme {
    pub palette: Palette,
}

/// Remote statuses are free-form strings; these are the ones the platform
/// reports for applications, compose stacks, databases, and deployments.
fn status_color(palette: &Palette, status: &str) -> Color {
    match status {
        "running" | "done" => palette.success,
        "idle" | "" => palette.text_muted,
        "error" => palette.error,
        _ => palette.warn,
    }
}

impl Theme {
    pub fn status_style(&self, status: &str) -> Style {
        Style::default().fg(status_color(&self.palette, status))
    }

    pub fn status_icon(&self, status: &str) -> &'static str {
        match status {
            "running" => "●",
            "done" => "◉",
            "idle" | "" => "○",
            "error" => "✗",
            _ => "◐",
        }
    }

    pub fn kind_icon(&self, kind: ResourceKind) -> &'static str {
        match kind {
            ResourceKind::Application => "▣",
            ResourceKind::Compose => "≡",
            ResourceKind::Database => "◆",
        }
    }

    pub fn outcome_style(&self, outcome: Outcome) -> Style {
        let color = match outcome {
            Outcome::Success => self.palette.success,
            Outcome::Failure => self.palette.error,
            Outcome::Info => self.palette.info,
        };
        Style::default().fg(color)
    }

    pub fn key_hint_style(&self) -> Style {
        Style::default().fg(self.palette.key_hint)
    }

    pub fn subtle_border_style(&self) -> Style {
        Style::default().fg(self.palette.panel_border)
    }

    pub fn focused_border_style(&self) -> Style {
        Style::default().fg(self.palette.accent)
    }

    pub fn selection_style(&self) -> Style {
        Style::default()
            .bg(self.palette.selection_bg)
            .fg(self.palette.selection_fg)
            .add_modifier(Modifier::BOLD)
    }

    pub fn text_style(&self) -> Style {
        Style::default().fg(self.palette.text)
    }

    pub fn text_dim_style(&self) -> Style {
        Style::default().fg(self.palette.text_dim)
    }

    pub fn text_muted_style(&self) -> Style {
        Style::default().fg(self.palette.text_muted)
    }

    pub fn accent_style(&self) -> Style {
        Style::default().fg(self.palette.accent)
    }

    pub fn accent_bold_style(&self) -> Style {
        Style::default()
            .fg(self.palette.accent)
            .add_modifier(Modifier::BOLD)
    }

    pub fn warn_style(&self) -> Style {
        Style::default().fg(self.palette.warn)
    }

    pub fn error_style(&self) -> Style {
        Style::default().fg(self.palette.error)
    }

    pub fn section_header_style(&self) -> Style {
        Style::default()
            .fg(self.palette.accent)
            .add_modifier(Modifier::BOLD)
    }
}

static DEFAULT_THEME: std::sync::OnceLock<Theme> = std::sync::OnceLock::new();

pub fn theme() -> &'static Theme {
    DEFAULT_THEME.get_or_init(Theme::default)
}

/// Shorthands over the global theme
pub mod styles {
    use super::*;

    pub fn status(status: &str) -> Style {
        theme().status_style(status)
    }

    pub fn status_icon(status: &str) -> &'static str {
        theme().status_icon(status)
    }

    pub fn kind_icon(kind: ResourceKind) -> &'static str {
        theme().kind_icon(kind)
    }

    pub fn outcome(outcome: Outcome) -> Style {
        theme().outcome_style(outcome)
    }

    pub fn key_hint() -> Style {
        theme().key_hint_style()
    }

    pub fn border_subtle() -> Style {
        theme().subtle_border_style()
    }

    pub fn border_focused() -> Style {
        theme().focused_border_style()
    }

    pub fn selection() -> Style {
        theme().selection_style()
    }

    pub fn text() -> Style {
        theme().text_style()
    }

    pub fn text_dim() -> Style {
        theme().text_dim_style()
    }

    pub fn text_muted() -> Style {
        theme().text_muted_style()
    }

    pub fn accent() -> Style {
        theme().accent_style()
    }

    pub fn accent_bold() -> Style {
        theme().accent_bold_style()
    }

    pub fn warn() -> Style {
        theme().warn_style()
    }

    pub fn error() -> Style {
        theme().error_style()
    }

    pub fn section_header() -> Style {
        theme().section_header_style()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_colors() {
        let palette = Palette::dark();
        assert_eq!(status_color(&palette, "running"), palette.success);
        assert_eq!(status_color(&palette, "error"), palette.error);
        assert_eq!(status_color(&palette, "idle"), palette.text_muted);
        assert_eq!(status_color(&palette, "queued"), palette.warn);
    }
}
