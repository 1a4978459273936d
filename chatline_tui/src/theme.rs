use ratatui::style::{Color, Modifier, Style};

pub struct Theme {
    // Background colors
    pub bg_primary: Color,
    pub bg_secondary: Color,

    // Foreground colors
    pub fg_primary: Color,
    pub fg_secondary: Color,
    pub fg_sent: Color,
    pub fg_received: Color,
    pub fg_failed: Color,
    pub fg_notice: Color,

    // Border colors
    pub border: Color,
    pub border_focused: Color,
}

impl Theme {
    pub fn chatline() -> Self {
        Self {
            bg_primary: Color::Rgb(30, 31, 38),
            bg_secondary: Color::Rgb(39, 40, 49),

            fg_primary: Color::Rgb(248, 248, 242),
            fg_secondary: Color::Rgb(139, 143, 150),
            fg_sent: Color::Rgb(139, 233, 253),
            fg_received: Color::Rgb(80, 250, 123),
            fg_failed: Color::Rgb(255, 85, 85),
            fg_notice: Color::Rgb(241, 250, 140),

            border: Color::Rgb(68, 71, 90),
            border_focused: Color::Rgb(139, 233, 253),
        }
    }

    pub fn input_style(&self) -> Style {
        Style::default().fg(self.fg_primary).bg(self.bg_secondary)
    }

    pub fn status_style(&self) -> Style {
        Style::default().fg(self.fg_secondary)
    }

    pub fn border_style(&self, focused: bool) -> Style {
        if focused {
            Style::default().fg(self.border_focused)
        } else {
            Style::default().fg(self.border)
        }
    }

    pub fn background_style(&self) -> Style {
        Style::default().bg(self.bg_primary)
    }

    pub fn text_style(&self) -> Style {
        Style::default().fg(self.fg_primary)
    }

    pub fn muted_style(&self) -> Style {
        Style::default().fg(self.fg_secondary)
    }

    pub fn sent_style(&self) -> Style {
        Style::default().fg(self.fg_sent)
    }

    pub fn received_style(&self) -> Style {
        Style::default().fg(self.fg_received)
    }

    /// Unconfirmed sends.
    pub fn pending_style(&self) -> Style {
        Style::default()
            .fg(self.fg_secondary)
            .add_modifier(Modifier::DIM | Modifier::ITALIC)
    }

    pub fn failed_style(&self) -> Style {
        Style::default().fg(self.fg_failed)
    }

    pub fn notice_style(&self) -> Style {
        Style::default().fg(self.fg_notice)
    }

    pub fn selected_style(&self) -> Style {
        Style::default()
            .bg(self.bg_secondary)
            .fg(self.border_focused)
            .add_modifier(Modifier::BOLD)
    }
}
