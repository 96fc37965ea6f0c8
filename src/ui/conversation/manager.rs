use crate::config::UiConfig;
use crate::driver::ChatHandle;
use crate::ui::conversation::composer::ComposerResult;
use crate::ui::conversation::{
    ConversationComposer, ConversationHistory, ParsedCommand, SlashCommand, TypingIndicator, get_help_text,
};
use crate::view::ViewEvent;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};

const NOTICE_TTL: Duration = Duration::from_secs(4);
const PAGE: usize = 10;

/// Actions that can be requested by the conversation manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationAction {
    None,
    Exit,
}

/// Destination for copied code blocks
pub trait Clipboard {
    fn set_text(&mut self, text: String) -> Result<(), String>;
}

/// System clipboard, opened on first use
#[derive(Default)]
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
}

impl Clipboard for SystemClipboard {
    fn set_text(&mut self, text: String) -> Result<(), String> {
        if self.inner.is_none() {
            self.inner = Some(arboard::Clipboard::new().map_err(|err| err.to_string())?);
        }
        match self.inner.as_mut() {
            Some(clipboard) => clipboard.set_text(text).map_err(|err| err.to_string()),
            None => Err("clipboard unavailable".to_string()),
        }
    }
}

/// Wires the UI components to a running chat session
pub struct ConversationManager {
    history: ConversationHistory,
    composer: ConversationComposer,
    typing: TypingIndicator,
    handle: Option<ChatHandle>,
    events: mpsc::UnboundedReceiver<ViewEvent>,
    clipboard: Box<dyn Clipboard>,
    session_id: String,
    notice: Option<(String, Instant)>,
    show_help: bool,
}

impl ConversationManager {
    pub fn new(
        handle: ChatHandle,
        events: mpsc::UnboundedReceiver<ViewEvent>,
        ui: &UiConfig,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            history: ConversationHistory::new(ui.max_messages, ui.copy_label.clone(), ui.copied_label.clone()),
            composer: ConversationComposer::new("Escribe un mensaje..."),
            typing: TypingIndicator::new(ui.typing_label.clone()),
            handle: Some(handle),
            events,
            clipboard: Box::new(SystemClipboard::default()),
            session_id: session_id.into(),
            notice: None,
            show_help: false,
        }
    }

    #[cfg(test)]
    pub fn with_clipboard(mut self, clipboard: impl Clipboard + 'static) -> Self {
        self.clipboard = Box::new(clipboard);
        self
    }

    /// Apply queued display updates (called from main loop).
    /// Returns true when something changed.
    pub fn process_view_events(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.events.try_recv() {
            changed = true;
            match event {
                ViewEvent::Typing(visible) => self.typing.set_visible(visible),
                // The composer empties itself on Enter; text typed since then
                // belongs to the next message
                ViewEvent::ClearInput => {}
                other => self.history.apply(other),
            }
        }
        changed
    }

    /// True while something on screen animates or expires
    pub fn is_animating(&self) -> bool {
        self.typing.is_visible()
            || self.history.is_streaming()
            || self.history.has_copy_feedback()
            || self.notice.is_some()
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationAction {
        if key.kind != KeyEventKind::Press {
            return ConversationAction::None;
        }

        if self.show_help {
            self.show_help = false;
            return ConversationAction::None;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') | KeyCode::Char('d') => return ConversationAction::Exit,
                KeyCode::Char('n') => {
                    self.new_chat();
                    return ConversationAction::None;
                }
                KeyCode::Char('y') => {
                    self.copy(None);
                    return ConversationAction::None;
                }
                _ => {}
            }
        }

        match key.code {
            KeyCode::PageUp => {
                self.history.scroll_up(PAGE);
                return ConversationAction::None;
            }
            KeyCode::PageDown => {
                self.history.scroll_down(PAGE);
                return ConversationAction::None;
            }
            _ => {}
        }

        match self.composer.handle_key(key) {
            ComposerResult::Submitted(input) => {
                self.history.scroll_to_bottom();
                self.submit(input);
                ConversationAction::None
            }
            ComposerResult::Command(command) => self.handle_slash_command(command),
            ComposerResult::None => ConversationAction::None,
        }
    }

    fn submit(&mut self, input: String) {
        let sent = self.handle.as_ref().is_some_and(|handle| handle.submit(input));
        if !sent {
            warn!("Chat session is no longer running");
            self.set_notice("The chat session has stopped; restart to continue.");
        }
    }

    fn new_chat(&mut self) {
        if let Some(handle) = &self.handle {
            if handle.reset() {
                info!(session = %self.session_id, "Starting a new chat");
            }
        }
        self.composer.clear();
    }

    fn copy(&mut self, target: Option<usize>) {
        let Some((node, index, text)) = self.history.copy_block(target) else {
            let message = match target {
                Some(number) => format!("No code block {number} in the latest reply."),
                None => "No code block to copy.".to_string(),
            };
            self.set_notice(message);
            return;
        };

        match self.clipboard.set_text(text) {
            Ok(()) => self.history.mark_copied(node, index),
            Err(err) => {
                warn!(error = %err, "Failed to copy to clipboard");
                self.set_notice(format!("Could not copy: {err}"));
            }
        }
    }

    /// Handle slash commands
    fn handle_slash_command(&mut self, command: ParsedCommand) -> ConversationAction {
        match command.command {
            SlashCommand::New => {
                self.new_chat();
                ConversationAction::None
            }
            SlashCommand::Copy => {
                if command.argument().is_some() && command.copy_target().is_none() {
                    self.set_notice("Usage: /copy [N]");
                } else {
                    self.copy(command.copy_target());
                }
                ConversationAction::None
            }
            SlashCommand::Help => {
                self.show_help = true;
                ConversationAction::None
            }
            SlashCommand::Bye => ConversationAction::Exit,
        }
    }

    fn set_notice(&mut self, message: impl Into<String>) {
        self.notice = Some((message.into(), Instant::now()));
    }

    fn current_notice(&self) -> Option<&str> {
        self.notice
            .as_ref()
            .filter(|(_, at)| at.elapsed() < NOTICE_TTL)
            .map(|(message, _)| message.as_str())
    }

    /// Drop expired notices
    pub fn tick(&mut self) {
        if self.current_notice().is_none() {
            self.notice = None;
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Stop the session task, abandoning a reply still in flight
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for ConversationManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Widget for &ConversationManager {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),    // History
                Constraint::Length(1), // Typing indicator
                Constraint::Length(3), // Composer
                Constraint::Length(1), // Status line
            ])
            .split(area);

        self.history.render(chunks[0], buf);
        self.typing.render(chunks[1], buf);
        self.composer.render(chunks[2], buf);

        let status = match self.current_notice() {
            Some(notice) => Line::from(Span::styled(notice, Style::default().fg(Color::Yellow))),
            None => Line::from(vec![
                Span::styled(format!("session {}", self.session_id), Style::default().fg(Color::DarkGray)),
                Span::styled("  ·  /help", Style::default().fg(Color::DarkGray)),
            ]),
        };
        buf.set_line(chunks[3].x, chunks[3].y, &status, chunks[3].width);

        if self.show_help {
            let width = area.width.saturating_sub(4).min(80);
            let height = area.height.saturating_sub(4).min(12);
            let popup = Rect {
                x: area.x + (area.width - width) / 2,
                y: area.y + (area.height - height) / 2,
                width,
                height,
            };
            Clear.render(popup, buf);
            Paragraph::new(get_help_text())
                .wrap(Wrap { trim: false })
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title("Help (any key to close)")
                        .style(Style::default().fg(Color::Cyan)),
                )
                .render(popup, buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::CmarkTransform;
    use crate::session::ChatSession;
    use crate::storage::{MemoryStore, TranscriptStore};
    use crate::transport::{ReplyStream, Transport};
    use crate::view::ChannelView;
    use crate::{driver, error::ChatError, events::ChatRequest};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct FixedReply(&'static str);

    #[async_trait]
    impl Transport for FixedReply {
        async fn open(&self, _request: &ChatRequest) -> Result<ReplyStream, ChatError> {
            Ok(ReplyStream::from_chunks([self.0]))
        }
    }

    #[derive(Clone, Default)]
    struct RecordingClipboard(Arc<Mutex<Vec<String>>>);

    impl Clipboard for RecordingClipboard {
        fn set_text(&mut self, text: String) -> Result<(), String> {
            self.0.lock().unwrap().push(text);
            Ok(())
        }
    }

    struct BrokenClipboard;

    impl Clipboard for BrokenClipboard {
        fn set_text(&mut self, _text: String) -> Result<(), String> {
            Err("no display".to_string())
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn manager(reply: &'static str, clipboard: impl Clipboard + 'static) -> ConversationManager {
        let session = ChatSession::new(
            FixedReply(reply),
            TranscriptStore::new(MemoryStore::new(), "chatHistory"),
            CmarkTransform,
            "Error: No se pudo conectar con el agente.",
        );
        let (view, rx) = ChannelView::new();
        let handle = driver::spawn(session, view);
        ConversationManager::new(handle, rx, &UiConfig::default(), "test").with_clipboard(clipboard)
    }

    fn type_and_send(manager: &mut ConversationManager, text: &str) {
        for c in text.chars() {
            manager.handle_key(key(KeyCode::Char(c)));
        }
        manager.handle_key(key(KeyCode::Enter));
    }

    async fn settle(manager: &mut ConversationManager) {
        for _ in 0..50 {
            tokio::task::yield_now().await;
            manager.process_view_events();
        }
    }

    #[tokio::test]
    async fn submit_then_copy_code_block() {
        let clipboard = RecordingClipboard::default();
        let mut manager = manager("```\nls -la\n```\n", clipboard.clone());

        type_and_send(&mut manager, "list files");
        settle(&mut manager).await;

        assert_eq!(manager.history().message_count(), 2);
        manager.handle_key(ctrl('y'));
        assert_eq!(clipboard.0.lock().unwrap().as_slice(), ["ls -la\n".to_string()]);
        assert!(manager.history().has_copy_feedback());
    }

    #[tokio::test]
    async fn failed_copy_keeps_the_copy_label() {
        let mut manager = manager("```\nls -la\n```\n", BrokenClipboard);

        type_and_send(&mut manager, "list files");
        settle(&mut manager).await;
        manager.handle_key(ctrl('y'));

        let reply = manager.history().messages().last().unwrap().node;
        assert_eq!(manager.history().copy_label_for(reply, 0), "Copiar");
        assert!(!manager.history().has_copy_feedback());
        assert!(manager.current_notice().unwrap().contains("Could not copy: no display"));
    }

    #[tokio::test]
    async fn slash_commands() {
        let clipboard = RecordingClipboard::default();
        let mut manager = manager("plain", clipboard.clone());

        type_and_send(&mut manager, "/copy");
        assert!(clipboard.0.lock().unwrap().is_empty());
        assert!(manager.current_notice().is_some());

        type_and_send(&mut manager, "/help");
        assert!(manager.show_help);
        manager.handle_key(key(KeyCode::Esc));
        assert!(!manager.show_help);

        type_and_send(&mut manager, "hello");
        settle(&mut manager).await;
        assert_eq!(manager.history().message_count(), 2);

        manager.handle_key(ctrl('n'));
        settle(&mut manager).await;
        assert_eq!(manager.history().message_count(), 0);

        assert_eq!(manager.handle_key(ctrl('c')), ConversationAction::Exit);
    }
}
