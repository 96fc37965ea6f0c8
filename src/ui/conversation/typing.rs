use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::Widget,
};
use std::time::Instant;

/// "Agent is typing..." line shown while a reply is in flight
pub struct TypingIndicator {
    label: String,
    visible: bool,
    since: Instant,
}

impl TypingIndicator {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            visible: false,
            since: Instant::now(),
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        if visible && !self.visible {
            self.since = Instant::now();
        }
        self.visible = visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Animated dots, one step every 300ms
    fn dots(&self) -> &'static str {
        match (self.since.elapsed().as_millis() / 300) % 4 {
            0 => ".",
            1 => "..",
            2 => "...",
            _ => "   ",
        }
    }
}

impl Widget for &TypingIndicator {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if !self.visible || area.height == 0 {
            return;
        }

        let indicator = Line::from(vec![
            Span::styled("🤖 ", Style::default().fg(Color::Green)),
            Span::styled(self.label.as_str(), Style::default().fg(Color::Green)),
            Span::styled(self.dots(), Style::default().fg(Color::Yellow)),
        ]);
        buf.set_line(area.x, area.y, &indicator, area.width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_row(indicator: &TypingIndicator) -> String {
        let area = Rect::new(0, 0, 40, 1);
        let mut buf = Buffer::empty(area);
        indicator.render(area, &mut buf);
        (0..area.width).map(|x| buf.get(x, 0).symbol()).collect()
    }

    #[test]
    fn hidden_until_shown() {
        let mut indicator = TypingIndicator::new("El agente está escribiendo");
        assert!(first_row(&indicator).trim().is_empty());

        indicator.set_visible(true);
        assert!(indicator.is_visible());
        assert!(first_row(&indicator).contains("El agente está escribiendo"));

        indicator.set_visible(false);
        assert!(first_row(&indicator).trim().is_empty());
    }
}
