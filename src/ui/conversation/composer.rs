use crate::ui::conversation::commands::{CommandEntry, ParsedCommand, command_entries, parse_slash_command};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};
use unicode_width::UnicodeWidthChar;

/// Result returned when the user interacts with the composer
#[derive(Debug, PartialEq)]
pub enum ComposerResult {
    Submitted(String),
    Command(ParsedCommand),
    None,
}

/// Text being typed. `cursor` counts characters, not bytes.
#[derive(Debug, Clone, Default)]
pub struct TextAreaState {
    pub content: String,
    pub cursor: usize,
}

impl TextAreaState {
    fn byte_index(&self, cursor: usize) -> usize {
        self.content
            .char_indices()
            .nth(cursor)
            .map(|(i, _)| i)
            .unwrap_or(self.content.len())
    }

    fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    fn insert(&mut self, c: char) {
        let at = self.byte_index(self.cursor);
        self.content.insert(at, c);
        self.cursor += 1;
    }

    fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        let at = self.byte_index(self.cursor);
        self.content.remove(at);
        true
    }

    fn delete(&mut self) -> bool {
        if self.cursor >= self.char_len() {
            return false;
        }
        let at = self.byte_index(self.cursor);
        self.content.remove(at);
        true
    }

    fn clear(&mut self) {
        self.content.clear();
        self.cursor = 0;
    }
}

/// Input line plus the slash-command palette
#[derive(Clone)]
pub struct ConversationComposer {
    state: TextAreaState,
    placeholder: String,
    command_entries: Vec<CommandEntry>,
    filtered_commands: Vec<CommandEntry>,
    show_command_palette: bool,
    selected_command: Option<usize>,
}

impl ConversationComposer {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            state: TextAreaState::default(),
            placeholder: placeholder.into(),
            command_entries: command_entries(),
            filtered_commands: Vec::new(),
            show_command_palette: false,
            selected_command: None,
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ComposerResult {
        if key.kind != KeyEventKind::Press {
            return ComposerResult::None;
        }

        match key.code {
            KeyCode::Enter => {
                if self.show_command_palette && self.apply_selected_command() {
                    return ComposerResult::None;
                }
                if self.state.content.trim().is_empty() {
                    return ComposerResult::None;
                }

                let content = std::mem::take(&mut self.state.content);
                self.state.cursor = 0;
                self.close_command_palette();
                return match parse_slash_command(&content) {
                    Some(command) => ComposerResult::Command(command),
                    None => ComposerResult::Submitted(content),
                };
            }
            KeyCode::Up if self.show_command_palette => self.move_command_selection(-1),
            KeyCode::Down if self.show_command_palette => self.move_command_selection(1),
            KeyCode::Esc if self.show_command_palette => self.close_command_palette(),
            KeyCode::Tab if self.show_command_palette => {
                self.apply_selected_command();
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.state.insert(c);
                self.sync_command_palette();
            }
            KeyCode::Backspace => {
                if self.state.backspace() {
                    self.sync_command_palette();
                }
            }
            KeyCode::Delete => {
                if self.state.delete() {
                    self.sync_command_palette();
                }
            }
            KeyCode::Left => {
                self.state.cursor = self.state.cursor.saturating_sub(1);
            }
            KeyCode::Right => {
                self.state.cursor = (self.state.cursor + 1).min(self.state.char_len());
            }
            KeyCode::Home => self.state.cursor = 0,
            KeyCode::End => self.state.cursor = self.state.char_len(),
            _ => {}
        }

        ComposerResult::None
    }

    /// Open, refresh or close the palette to match what has been typed
    fn sync_command_palette(&mut self) {
        let content = &self.state.content;
        let wants_palette = content.starts_with('/') && !content.contains(char::is_whitespace);

        if wants_palette {
            if !self.show_command_palette {
                self.show_command_palette = true;
                self.selected_command = Some(0);
            }
            self.refresh_command_palette();
        } else if self.show_command_palette {
            self.close_command_palette();
        }
    }

    fn close_command_palette(&mut self) {
        self.show_command_palette = false;
        self.filtered_commands.clear();
        self.selected_command = None;
    }

    fn refresh_command_palette(&mut self) {
        let query = self.state.content.trim_start_matches('/').to_lowercase();
        self.filtered_commands = self
            .command_entries
            .iter()
            .filter(|entry| query.is_empty() || entry.keyword.starts_with(&query))
            .copied()
            .collect();

        self.selected_command = if self.filtered_commands.is_empty() {
            None
        } else {
            let index = self.selected_command.unwrap_or(0);
            Some(index.min(self.filtered_commands.len() - 1))
        };
    }

    fn move_command_selection(&mut self, delta: isize) {
        if self.filtered_commands.is_empty() {
            self.selected_command = None;
            return;
        }

        let current = self.selected_command.unwrap_or(0) as isize;
        let len = self.filtered_commands.len() as isize;
        self.selected_command = Some((current + delta).rem_euclid(len) as usize);
    }

    fn apply_selected_command(&mut self) -> bool {
        let Some(entry) = self
            .selected_command
            .and_then(|index| self.filtered_commands.get(index))
            .copied()
        else {
            return false;
        };

        let completed = format!("/{}", entry.keyword);
        if self.state.content == completed {
            // Already complete: let Enter submit it
            self.close_command_palette();
            return false;
        }

        self.state.content = completed;
        self.state.cursor = self.state.char_len();
        self.close_command_palette();
        true
    }

    pub fn content(&self) -> &str {
        &self.state.content
    }

    pub fn clear(&mut self) {
        self.state.clear();
        self.close_command_palette();
    }

    /// The part of the input shown in `width` columns, scrolled so the
    /// cursor stays in view
    fn visible_input(&self, width: usize) -> String {
        let mut chars: Vec<char> = self.state.content.chars().collect();
        let cursor = self.state.cursor.min(chars.len());

        // Columns up to and including the cursor cell
        let mut through_cursor = chars[..cursor].iter().map(|c| c.width().unwrap_or(0)).sum::<usize>() + 1;
        let mut skip = 0;
        while through_cursor > width && skip < cursor {
            through_cursor -= chars[skip].width().unwrap_or(0);
            skip += 1;
        }

        chars.insert(cursor, '▌');
        chars[skip..].iter().collect()
    }
}

impl Widget for &ConversationComposer {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title("Message")
            .style(Style::default().fg(Color::Green));

        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.state.content.is_empty() {
            let placeholder_line = Line::from(vec![Span::styled(
                self.placeholder.as_str(),
                Style::default().fg(Color::DarkGray),
            )]);
            buf.set_line(inner_area.x, inner_area.y, &placeholder_line, inner_area.width);
        } else {
            let visible = self.visible_input(inner_area.width as usize);
            let line = Line::from(vec![Span::styled(visible, Style::default().fg(Color::White))]);
            buf.set_line(inner_area.x, inner_area.y, &line, inner_area.width);
        }

        if self.show_command_palette && !self.filtered_commands.is_empty() {
            let palette_height = (self.filtered_commands.len().min(5) + 2) as u16;
            let palette_area = Rect {
                x: area.x,
                y: area.y.saturating_sub(palette_height),
                width: area.width,
                height: palette_height,
            };

            let block = Block::default()
                .borders(Borders::ALL)
                .title("Commands")
                .style(Style::default().fg(Color::Blue));
            let inner = block.inner(palette_area);
            ratatui::widgets::Clear.render(palette_area, buf);
            block.render(palette_area, buf);

            for (index, entry) in self.filtered_commands.iter().enumerate() {
                if index >= inner.height as usize {
                    break;
                }

                let style = if self.selected_command == Some(index) {
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Cyan)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::White)
                };

                let line = Line::from(vec![
                    Span::styled(format!("/{}", entry.keyword), style),
                    Span::styled(" — ", Style::default().fg(Color::DarkGray)),
                    Span::styled(entry.description, Style::default().fg(Color::Gray)),
                ]);

                buf.set_line(inner.x, inner.y + index as u16, &line, inner.width);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::conversation::commands::SlashCommand;
    use unicode_width::UnicodeWidthStr;

    fn press(composer: &mut ConversationComposer, code: KeyCode) -> ComposerResult {
        composer.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_str(composer: &mut ConversationComposer, text: &str) {
        for c in text.chars() {
            press(composer, KeyCode::Char(c));
        }
    }

    #[test]
    fn enter_submits_and_clears() {
        let mut composer = ConversationComposer::new("Escribe un mensaje...");
        type_str(&mut composer, "¿Qué tal?");
        assert_eq!(
            press(&mut composer, KeyCode::Enter),
            ComposerResult::Submitted("¿Qué tal?".to_string())
        );
        assert_eq!(composer.content(), "");
    }

    #[test]
    fn editing_multibyte_text_by_character() {
        let mut composer = ConversationComposer::new("");
        type_str(&mut composer, "añb");
        press(&mut composer, KeyCode::Left);
        press(&mut composer, KeyCode::Backspace);
        assert_eq!(composer.content(), "ab");
        press(&mut composer, KeyCode::Home);
        press(&mut composer, KeyCode::Delete);
        assert_eq!(composer.content(), "b");
    }

    #[test]
    fn long_input_scrolls_by_display_width() {
        let mut composer = ConversationComposer::new("");
        type_str(&mut composer, "你好世界你好");

        let visible = composer.visible_input(7);
        assert_eq!(visible, "界你好▌");
        assert!(visible.width() <= 7);

        press(&mut composer, KeyCode::Home);
        assert!(composer.visible_input(7).starts_with("▌你好"));
    }

    #[test]
    fn blank_enter_does_nothing() {
        let mut composer = ConversationComposer::new("");
        type_str(&mut composer, "   ");
        assert_eq!(press(&mut composer, KeyCode::Enter), ComposerResult::None);
        assert_eq!(composer.content(), "   ");
    }

    #[test]
    fn palette_completes_then_submits_command() {
        let mut composer = ConversationComposer::new("");
        type_str(&mut composer, "/ne");
        // first Enter completes the selection
        assert_eq!(press(&mut composer, KeyCode::Enter), ComposerResult::None);
        assert_eq!(composer.content(), "/new");
        match press(&mut composer, KeyCode::Enter) {
            ComposerResult::Command(parsed) => assert_eq!(parsed.command, SlashCommand::New),
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn command_with_argument_bypasses_palette() {
        let mut composer = ConversationComposer::new("");
        type_str(&mut composer, "/copy 2");
        match press(&mut composer, KeyCode::Enter) {
            ComposerResult::Command(parsed) => assert_eq!(parsed.copy_target(), Some(2)),
            other => panic!("expected command, got {other:?}"),
        }
    }
}
