//! Display side of a conversation.
//!
//! [`ChatView`] is everything the session needs from a front-end: append a
//! node per turn, update a node in place, toggle the typing indicator. It
//! never manages layout.

use crate::events::Sender;
use std::io::Write;
use tokio::sync::mpsc;

/// Handle to one displayed turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

pub trait ChatView: Send {
    /// Append a turn shown as plain text
    fn append_text(&mut self, sender: Sender, text: &str) -> NodeId;

    /// Append a turn whose content is already-rendered markup
    fn append_markup(&mut self, sender: Sender, markup: &str) -> NodeId;

    /// Append a display-only agent turn reporting a failure
    fn append_error(&mut self, text: &str) -> NodeId {
        self.append_text(Sender::Agent, text)
    }

    /// Replace a node's content with plain text
    fn set_text(&mut self, node: NodeId, text: &str);

    /// Replace a node's content with rendered markup
    fn set_markup(&mut self, node: NodeId, markup: &str);

    /// Attach one copy-to-clipboard control per code block of a node
    fn attach_copy_controls(&mut self, node: NodeId, blocks: &[String]);

    fn remove(&mut self, node: NodeId);

    fn set_typing(&mut self, visible: bool);

    fn clear_input(&mut self);

    /// Drop every displayed turn
    fn clear(&mut self);
}

/// Content of a freshly appended node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeContent {
    Text(String),
    Markup(String),
    Error(String),
}

/// A single display update, as sent to the terminal UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    Append {
        node: NodeId,
        sender: Sender,
        content: NodeContent,
    },
    SetText {
        node: NodeId,
        text: String,
    },
    SetMarkup {
        node: NodeId,
        markup: String,
    },
    CopyControls {
        node: NodeId,
        blocks: Vec<String>,
    },
    Remove {
        node: NodeId,
    },
    Typing(bool),
    ClearInput,
    Clear,
}

/// Forwards every update over a channel to whoever draws the screen
pub struct ChannelView {
    tx: mpsc::UnboundedSender<ViewEvent>,
    next_id: usize,
}

impl ChannelView {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ViewEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, next_id: 0 }, rx)
    }

    fn send(&self, event: ViewEvent) {
        // The UI may already be gone during shutdown
        let _ = self.tx.send(event);
    }

    fn append(&mut self, sender: Sender, content: NodeContent) -> NodeId {
        let node = NodeId(self.next_id);
        self.next_id += 1;
        self.send(ViewEvent::Append {
            node,
            sender,
            content,
        });
        node
    }
}

impl ChatView for ChannelView {
    fn append_text(&mut self, sender: Sender, text: &str) -> NodeId {
        self.append(sender, NodeContent::Text(text.to_string()))
    }

    fn append_markup(&mut self, sender: Sender, markup: &str) -> NodeId {
        self.append(sender, NodeContent::Markup(markup.to_string()))
    }

    fn append_error(&mut self, text: &str) -> NodeId {
        self.append(Sender::Agent, NodeContent::Error(text.to_string()))
    }

    fn set_text(&mut self, node: NodeId, text: &str) {
        self.send(ViewEvent::SetText {
            node,
            text: text.to_string(),
        });
    }

    fn set_markup(&mut self, node: NodeId, markup: &str) {
        self.send(ViewEvent::SetMarkup {
            node,
            markup: markup.to_string(),
        });
    }

    fn attach_copy_controls(&mut self, node: NodeId, blocks: &[String]) {
        self.send(ViewEvent::CopyControls {
            node,
            blocks: blocks.to_vec(),
        });
    }

    fn remove(&mut self, node: NodeId) {
        self.send(ViewEvent::Remove { node });
    }

    fn set_typing(&mut self, visible: bool) {
        self.send(ViewEvent::Typing(visible));
    }

    fn clear_input(&mut self) {
        self.send(ViewEvent::ClearInput);
    }

    fn clear(&mut self) {
        self.send(ViewEvent::Clear);
    }
}

/// Line-oriented output for non-interactive use.
///
/// Streams the agent's text as it grows; user turns are not echoed.
pub struct PlainView<W: Write + Send> {
    out: W,
    show_markup: bool,
    next_id: usize,
    /// Node being streamed and how many bytes of it are already written
    streaming: Option<(NodeId, usize)>,
}

impl<W: Write + Send> PlainView<W> {
    pub fn new(out: W, show_markup: bool) -> Self {
        Self {
            out,
            show_markup,
            next_id: 0,
            streaming: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn allocate(&mut self) -> NodeId {
        let node = NodeId(self.next_id);
        self.next_id += 1;
        node
    }
}

impl<W: Write + Send> ChatView for PlainView<W> {
    fn append_text(&mut self, sender: Sender, text: &str) -> NodeId {
        let node = self.allocate();
        if sender == Sender::Agent {
            let _ = write!(self.out, "{text}");
            let _ = self.out.flush();
            self.streaming = Some((node, text.len()));
        }
        node
    }

    fn append_markup(&mut self, sender: Sender, markup: &str) -> NodeId {
        let node = self.allocate();
        let _ = writeln!(self.out, "{}: {}", sender.display_name(), markup.trim_end());
        node
    }

    fn append_error(&mut self, text: &str) -> NodeId {
        let node = self.allocate();
        let _ = writeln!(self.out, "{text}");
        node
    }

    fn set_text(&mut self, node: NodeId, text: &str) {
        let Some((current, written)) = self.streaming else {
            return;
        };
        if current != node {
            return;
        }
        // Streamed text only ever grows, so the unwritten part is a suffix
        if let Some(delta) = text.get(written..) {
            let _ = write!(self.out, "{delta}");
            let _ = self.out.flush();
        }
        self.streaming = Some((node, text.len()));
    }

    fn set_markup(&mut self, node: NodeId, markup: &str) {
        if matches!(self.streaming, Some((current, _)) if current == node) {
            self.streaming = None;
            let _ = writeln!(self.out);
        }
        if self.show_markup {
            let _ = writeln!(self.out, "{}", markup.trim_end());
        }
    }

    fn attach_copy_controls(&mut self, _node: NodeId, _blocks: &[String]) {}

    fn remove(&mut self, node: NodeId) {
        if matches!(self.streaming, Some((current, _)) if current == node) {
            self.streaming = None;
            let _ = writeln!(self.out);
        }
    }

    fn set_typing(&mut self, _visible: bool) {}

    fn clear_input(&mut self) {}

    fn clear(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_view_numbers_nodes_in_order() {
        let (mut view, mut rx) = ChannelView::new();
        let first = view.append_text(Sender::User, "hi");
        let second = view.append_markup(Sender::Agent, "<p>yo</p>");
        assert_eq!(first, NodeId(0));
        assert_eq!(second, NodeId(1));

        assert_eq!(
            rx.try_recv().unwrap(),
            ViewEvent::Append {
                node: first,
                sender: Sender::User,
                content: NodeContent::Text("hi".to_string()),
            }
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            ViewEvent::Append {
                content: NodeContent::Markup(_),
                ..
            }
        ));
    }

    #[test]
    fn channel_view_survives_dropped_receiver() {
        let (mut view, rx) = ChannelView::new();
        drop(rx);
        view.set_typing(true);
        view.clear();
    }

    #[test]
    fn plain_view_writes_only_new_suffixes() {
        let mut view = PlainView::new(Vec::new(), false);
        view.append_text(Sender::User, "question");
        let node = view.append_text(Sender::Agent, "");
        view.set_text(node, "Hel");
        view.set_text(node, "Hello, ");
        view.set_text(node, "Hello, world");
        view.set_markup(node, "<p>Hello, world</p>\n");

        let out = String::from_utf8(view.into_inner()).unwrap();
        assert_eq!(out, "Hello, world\n");
    }

    #[test]
    fn plain_view_can_print_final_markup() {
        let mut view = PlainView::new(Vec::new(), true);
        let node = view.append_text(Sender::Agent, "");
        view.set_text(node, "**hi**");
        view.set_markup(node, "<p><strong>hi</strong></p>\n");

        let out = String::from_utf8(view.into_inner()).unwrap();
        assert_eq!(out, "**hi**\n<p><strong>hi</strong></p>\n");
    }
}
