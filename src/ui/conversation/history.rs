//! Conversation history display component

use crate::events::Sender;
use crate::ui::markup::{render_markup, wrap_plain, wrap_text};
use crate::view::{NodeContent, NodeId, ViewEvent};
use chrono::{DateTime, Local};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Scrollbar, ScrollbarOrientation, ScrollbarState, StatefulWidget, Widget},
};
use std::cell::Cell;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// How long a copy control shows the confirmation label
pub const COPIED_FEEDBACK: Duration = Duration::from_secs(2);

/// A single displayed turn
#[derive(Debug, Clone)]
pub struct ConversationMessage {
    pub node: NodeId,
    pub sender: Sender,
    pub content: NodeContent,
    pub timestamp: DateTime<Local>,
    /// Code blocks that have a copy control attached, in document order
    pub copy_blocks: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct CopiedMark {
    node: NodeId,
    index: usize,
    at: Instant,
}

/// Conversation history display component
pub struct ConversationHistory {
    messages: VecDeque<ConversationMessage>,
    max_messages: usize,
    /// Agent node currently receiving streamed text
    streaming: Option<NodeId>,
    /// Lines scrolled up from the bottom
    scroll_offset: usize,
    max_scroll: Cell<usize>,
    copy_label: String,
    copied_label: String,
    copied: Option<CopiedMark>,
}

impl ConversationHistory {
    pub fn new(max_messages: usize, copy_label: impl Into<String>, copied_label: impl Into<String>) -> Self {
        Self {
            messages: VecDeque::new(),
            max_messages: max_messages.max(1),
            streaming: None,
            scroll_offset: 0,
            max_scroll: Cell::new(0),
            copy_label: copy_label.into(),
            copied_label: copied_label.into(),
            copied: None,
        }
    }

    /// Apply one display update from the session.
    ///
    /// Updates naming a node that is no longer shown are ignored.
    /// `Typing` and `ClearInput` belong to other components and are ignored too.
    pub fn apply(&mut self, event: ViewEvent) {
        match event {
            ViewEvent::Append {
                node,
                sender,
                content,
            } => {
                if sender == Sender::Agent && matches!(content, NodeContent::Text(_)) {
                    self.streaming = Some(node);
                }
                self.add_message(ConversationMessage {
                    node,
                    sender,
                    content,
                    timestamp: Local::now(),
                    copy_blocks: Vec::new(),
                });
            }
            ViewEvent::SetText { node, text } => {
                if let Some(message) = self.find_mut(node) {
                    message.content = NodeContent::Text(text);
                }
                self.follow_bottom();
            }
            ViewEvent::SetMarkup { node, markup } => {
                if let Some(message) = self.find_mut(node) {
                    message.content = NodeContent::Markup(markup);
                }
                if self.streaming == Some(node) {
                    self.streaming = None;
                }
                self.follow_bottom();
            }
            ViewEvent::CopyControls { node, blocks } => {
                if let Some(message) = self.find_mut(node) {
                    message.copy_blocks = blocks;
                }
            }
            ViewEvent::Remove { node } => {
                self.messages.retain(|message| message.node != node);
                if self.streaming == Some(node) {
                    self.streaming = None;
                }
            }
            ViewEvent::Clear => self.clear(),
            ViewEvent::Typing(_) | ViewEvent::ClearInput => {}
        }
    }

    fn add_message(&mut self, message: ConversationMessage) {
        self.messages.push_back(message);

        while self.messages.len() > self.max_messages {
            if let Some(dropped) = self.messages.pop_front() {
                if self.streaming == Some(dropped.node) {
                    self.streaming = None;
                }
            }
        }

        self.scroll_to_bottom();
    }

    fn find_mut(&mut self, node: NodeId) -> Option<&mut ConversationMessage> {
        self.messages.iter_mut().find(|message| message.node == node)
    }

    /// Stay pinned to the bottom unless the user scrolled away
    fn follow_bottom(&mut self) {
        if self.scroll_offset == 0 {
            self.scroll_to_bottom();
        }
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = (self.scroll_offset + lines).min(self.max_scroll.get());
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.streaming = None;
        self.copied = None;
        self.scroll_offset = 0;
    }

    #[cfg(test)]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn messages(&self) -> impl Iterator<Item = &ConversationMessage> {
        self.messages.iter()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    /// Pick a code block from the latest turn that has copy controls.
    ///
    /// `target` is 1-based; `None` means the last block. Returns the owning
    /// node, the block index and its text.
    pub fn copy_block(&self, target: Option<usize>) -> Option<(NodeId, usize, String)> {
        let message = self
            .messages
            .iter()
            .rev()
            .find(|message| !message.copy_blocks.is_empty())?;

        let index = match target {
            Some(number) => number.checked_sub(1)?,
            None => message.copy_blocks.len() - 1,
        };
        let text = message.copy_blocks.get(index)?.clone();
        Some((message.node, index, text))
    }

    /// Show the confirmation label on a copy control for a while
    pub fn mark_copied(&mut self, node: NodeId, index: usize) {
        self.copied = Some(CopiedMark {
            node,
            index,
            at: Instant::now(),
        });
    }

    /// Label shown on a copy control right now
    pub fn copy_label_for(&self, node: NodeId, index: usize) -> &str {
        match self.copied {
            Some(mark) if mark.node == node && mark.index == index && mark.at.elapsed() < COPIED_FEEDBACK => {
                &self.copied_label
            }
            _ => &self.copy_label,
        }
    }

    /// True while a confirmation label is on screen
    pub fn has_copy_feedback(&self) -> bool {
        self.copied.is_some_and(|mark| mark.at.elapsed() < COPIED_FEEDBACK)
    }

    /// Render a single message into lines
    fn render_message(&self, message: &ConversationMessage, width: u16) -> Vec<Line<'static>> {
        let mut lines = Vec::new();

        let (icon, name_style) = match message.sender {
            Sender::User => ("👤", Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD)),
            Sender::Agent => ("🤖", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
        };
        let timestamp = message.timestamp.format("%H:%M:%S").to_string();
        lines.push(Line::from(vec![
            Span::styled(format!("{icon} {}", message.sender.display_name()), name_style),
            Span::styled(format!(" {timestamp} {}", "─".repeat(20)), Style::default().fg(Color::DarkGray)),
        ]));

        let content_width = width.saturating_sub(2);
        match &message.content {
            NodeContent::Text(text) => {
                let style = match message.sender {
                    Sender::User => Style::default().fg(Color::Blue),
                    Sender::Agent => Style::default().fg(Color::Green),
                };
                let content_lines = wrap_plain(text, content_width as usize);
                let last = content_lines.len() - 1;
                let streaming = self.streaming == Some(message.node);

                for (i, content_line) in content_lines.into_iter().enumerate() {
                    let mut spans = vec![Span::raw("  "), Span::styled(content_line, style)];
                    if streaming && i == last {
                        spans.push(Span::styled("▋", Style::default().fg(Color::Yellow)));
                    }
                    lines.push(Line::from(spans));
                }
            }
            NodeContent::Markup(markup) => {
                let label = |index: usize| {
                    (index < message.copy_blocks.len())
                        .then(|| self.copy_label_for(message.node, index).to_string())
                };
                for line in render_markup(markup, content_width, &label) {
                    let mut spans = vec![Span::raw("  ")];
                    spans.extend(line.spans);
                    lines.push(Line::from(spans));
                }
            }
            NodeContent::Error(text) => {
                for content_line in wrap_text(text, content_width as usize) {
                    lines.push(Line::from(vec![
                        Span::raw("  "),
                        Span::styled(content_line, Style::default().fg(Color::Red)),
                    ]));
                }
            }
        }

        lines
    }
}

impl Widget for &ConversationHistory {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default().borders(Borders::ALL).title("💬 Chat");

        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.messages.is_empty() {
            let welcome_lines = [
                Line::from(Span::styled("Start by typing a message below.", Style::default().fg(Color::Gray))),
                Line::from(""),
                Line::from(Span::styled(
                    "Enter to send, /help for commands, Ctrl+C to quit.",
                    Style::default().fg(Color::DarkGray),
                )),
            ];

            for (i, line) in welcome_lines.iter().enumerate() {
                if i < inner_area.height as usize {
                    buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
                }
            }
            self.max_scroll.set(0);
            return;
        }

        // Leave a column for the scrollbar
        let text_width = inner_area.width.saturating_sub(1);
        let mut all_lines: Vec<Line> = Vec::new();
        for message in &self.messages {
            all_lines.extend(self.render_message(message, text_width));
            all_lines.push(Line::from(""));
        }
        all_lines.pop();

        let height = inner_area.height as usize;
        let total = all_lines.len();
        let max_scroll = total.saturating_sub(height);
        self.max_scroll.set(max_scroll);

        let offset = self.scroll_offset.min(max_scroll);
        let start = max_scroll - offset;
        let visible = &all_lines[start..(start + height).min(total)];

        for (i, line) in visible.iter().enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, text_width);
        }

        if max_scroll > 0 {
            let mut state = ScrollbarState::new(max_scroll).position(start);
            Scrollbar::default()
                .orientation(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("↑"))
                .end_symbol(Some("↓"))
                .render(inner_area, buf, &mut state);
        }
    }
}
