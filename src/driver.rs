//! Runs one [`ChatSession`] on its own task.
//!
//! Commands are handled strictly one after another: a message submitted
//! while a reply is still streaming waits in the queue until that turn has
//! been finalized (or has failed). Turns of two submissions never
//! interleave.

use crate::markdown::MarkdownTransform;
use crate::session::ChatSession;
use crate::storage::SessionStore;
use crate::transport::Transport;
use crate::view::ChatView;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Send a user message
    Submit(String),
    /// Start a new chat
    Reset,
}

/// Front-end side of a running session
pub struct ChatHandle {
    tx: mpsc::UnboundedSender<ChatCommand>,
    task: JoinHandle<()>,
}

impl ChatHandle {
    /// Queue a message. Returns false once the session task is gone.
    pub fn submit(&self, text: impl Into<String>) -> bool {
        self.tx.send(ChatCommand::Submit(text.into())).is_ok()
    }

    pub fn reset(&self) -> bool {
        self.tx.send(ChatCommand::Reset).is_ok()
    }

    /// Stop accepting commands and wait for the queued ones to finish
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(err) = self.task.await {
            debug!(error = %err, "Chat task ended abnormally");
        }
    }

    /// Stop immediately, abandoning any reply in flight
    pub fn abort(self) {
        self.task.abort();
    }
}

/// Restore the session into `view`, then serve commands until every
/// [`ChatHandle`] sender is dropped
pub fn spawn<T, S, M, V>(mut session: ChatSession<T, S, M>, mut view: V) -> ChatHandle
where
    T: Transport + 'static,
    S: SessionStore + 'static,
    M: MarkdownTransform + 'static,
    V: ChatView + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        session.restore(&mut view);

        while let Some(command) = rx.recv().await {
            match command {
                ChatCommand::Submit(text) => {
                    let outcome = session.submit(&mut view, &text).await;
                    debug!(?outcome, "Submission handled");
                }
                ChatCommand::Reset => session.reset(&mut view),
            }
        }

        debug!("Chat session task finished");
    });

    ChatHandle { tx, task }
}
