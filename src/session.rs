//! The conversation stream renderer.
//!
//! A [`ChatSession`] owns the transcript of one conversation. It sends each
//! user message to the agent, shows the reply as plain text while it
//! streams, renders it as markup once complete, and persists the transcript
//! after every finished turn.

use crate::error::ChatError;
use crate::events::{ChatRequest, Sender, Transcript, Turn};
use crate::markdown::{MarkdownTransform, code_blocks};
use crate::storage::{SessionStore, TranscriptStore};
use crate::streaming::StreamState;
use crate::transport::Transport;
use crate::view::{ChatView, NodeId};
use tracing::{debug, info, warn};

/// What a call to [`ChatSession::submit`] ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Input was blank; nothing changed
    Ignored,
    /// Agent reply streamed, rendered and persisted
    Completed,
    /// Request or stream failed; an error turn was shown
    Failed,
}

/// Display state of the turn being answered, so a failure can be unwound
#[derive(Debug, Default)]
struct PendingReply {
    typing: bool,
    placeholder: Option<NodeId>,
}

pub struct ChatSession<T, S, M> {
    transport: T,
    store: TranscriptStore<S>,
    markdown: M,
    transcript: Transcript,
    error_message: String,
}

impl<T, S, M> ChatSession<T, S, M>
where
    T: Transport,
    S: SessionStore,
    M: MarkdownTransform,
{
    pub fn new(
        transport: T,
        store: TranscriptStore<S>,
        markdown: M,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            store,
            markdown,
            transcript: Transcript::new(),
            error_message: error_message.into(),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Load the persisted transcript and redraw it.
    ///
    /// Agent turns are stored as finalized markup and are shown as such.
    /// Returns the number of turns restored.
    pub fn restore<V: ChatView + ?Sized>(&mut self, view: &mut V) -> usize {
        let transcript = match self.store.load() {
            Ok(Some(transcript)) => transcript,
            Ok(None) => Transcript::new(),
            Err(err) => {
                warn!(error = %err, "Could not read stored transcript, starting empty");
                Transcript::new()
            }
        };

        for turn in transcript.turns() {
            match turn.sender {
                Sender::User => {
                    view.append_text(Sender::User, &turn.text);
                }
                Sender::Agent => {
                    let node = view.append_markup(Sender::Agent, &turn.text);
                    Self::attach_copy_controls(view, node, &turn.text);
                }
            }
        }

        let restored = transcript.len();
        if restored > 0 {
            info!(turns = restored, "Restored conversation");
        }
        self.transcript = transcript;
        restored
    }

    /// Send one user message and stream the agent's answer into `view`
    pub async fn submit<V: ChatView + ?Sized>(&mut self, view: &mut V, input: &str) -> SubmitOutcome {
        let message = input.trim();
        if message.is_empty() {
            return SubmitOutcome::Ignored;
        }

        view.append_text(Sender::User, message);
        self.transcript.push(Turn::user(message));
        self.persist();

        view.clear_input();
        view.set_typing(true);

        let request = ChatRequest {
            user_message: message.to_string(),
            history: self.transcript.without_last().to_vec(),
        };

        let mut pending = PendingReply {
            typing: true,
            placeholder: None,
        };

        match self.stream_reply(view, &request, &mut pending).await {
            Ok(markup) => {
                self.transcript.push(Turn::agent(markup));
                self.persist();
                SubmitOutcome::Completed
            }
            Err(err) => {
                warn!(error = %err, "Chat turn failed");
                if pending.typing {
                    view.set_typing(false);
                }
                if let Some(node) = pending.placeholder {
                    view.remove(node);
                }
                view.append_error(&self.error_message);
                SubmitOutcome::Failed
            }
        }
    }

    /// Start a new chat: forget the transcript everywhere
    pub fn reset<V: ChatView + ?Sized>(&mut self, view: &mut V) {
        self.transcript.clear();
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "Could not remove stored transcript");
        }
        view.clear();
        debug!("Conversation reset");
    }

    async fn stream_reply<V: ChatView + ?Sized>(
        &mut self,
        view: &mut V,
        request: &ChatRequest,
        pending: &mut PendingReply,
    ) -> Result<String, ChatError> {
        let mut reply = self.transport.open(request).await?;

        view.set_typing(false);
        pending.typing = false;

        let node = view.append_text(Sender::Agent, "");
        pending.placeholder = Some(node);

        // Plain text only until the reply is complete; partial markdown is
        // never interpreted
        let mut state = StreamState::new();
        while let Some(chunk) = reply.next_chunk().await? {
            if state.push_chunk(&chunk) {
                view.set_text(node, state.text());
            }
        }

        let chunks = state.chunk_count();
        let text = state.finalize();
        let markup = self.markdown.render(&text);
        view.set_markup(node, &markup);
        Self::attach_copy_controls(view, node, &markup);

        info!(chunks, chars = text.chars().count(), "Agent reply complete");
        Ok(markup)
    }

    fn attach_copy_controls<V: ChatView + ?Sized>(view: &mut V, node: NodeId, markup: &str) {
        let blocks = code_blocks(markup);
        if !blocks.is_empty() {
            view.attach_copy_controls(node, &blocks);
        }
    }

    fn persist(&mut self) {
        // A storage hiccup must not take the conversation down with it
        if let Err(err) = self.store.save(&self.transcript) {
            warn!(error = %err, "Could not persist transcript");
        }
    }
}
