//! Non-interactive commands: `send`, `history` and `new`.

use crate::config::Config;
use crate::events::Sender;
use crate::markdown::CmarkTransform;
use crate::session::{ChatSession, SubmitOutcome};
use crate::storage::{FileStore, SessionStore, TranscriptStore};
use crate::transport::{HttpTransport, Transport};
use crate::ui::markup::render_markup;
use crate::view::PlainView;
use anyhow::{Context, Result};
use std::io::{self, Write};
use tracing::info;

/// Width agent markup is wrapped to when printed
const PRINT_WIDTH: u16 = 80;

pub fn open_store(config: &Config, session_id: &str) -> Result<TranscriptStore<FileStore>> {
    let dir = config.session_dir(session_id)?;
    Ok(TranscriptStore::new(FileStore::new(dir), config.storage.key.clone()))
}

/// Send one message to the agent and print the reply as it streams
pub async fn send_message(config: &Config, session_id: &str, message: &str, show_markup: bool) -> Result<SubmitOutcome> {
    let store = open_store(config, session_id)?;
    let transport = HttpTransport::new(config)?;
    info!(url = transport.url(), session = session_id, "Sending message");

    let outcome = send_with(
        transport,
        store,
        &config.ui.error_message,
        message,
        PlainView::new(io::stdout(), show_markup),
    )
    .await;
    Ok(outcome)
}

/// [`send_message`] with every collaborator supplied by the caller
pub async fn send_with<T, S, W>(
    transport: T,
    store: TranscriptStore<S>,
    error_message: &str,
    message: &str,
    mut view: PlainView<W>,
) -> SubmitOutcome
where
    T: Transport,
    S: SessionStore,
    W: Write + Send,
{
    let mut session = ChatSession::new(transport, store, CmarkTransform, error_message);
    // Earlier turns go out as history but are not printed again
    let mut quiet = PlainView::new(io::sink(), false);
    session.restore(&mut quiet);
    session.submit(&mut view, message).await
}

/// Print the persisted transcript of a session
pub fn print_history(config: &Config, session_id: &str) -> Result<()> {
    let mut store = open_store(config, session_id)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let turns = write_history(&mut store, &mut out)?;
    if turns == 0 {
        writeln!(out, "No messages in session {session_id}.")?;
    }
    Ok(())
}

/// Write every stored turn to `out`; returns the number of turns
pub fn write_history<S: SessionStore>(store: &mut TranscriptStore<S>, out: &mut impl Write) -> Result<usize> {
    let Some(transcript) = store.load().context("Failed to read stored conversation")? else {
        return Ok(0);
    };

    for (i, turn) in transcript.turns().iter().enumerate() {
        if i > 0 {
            writeln!(out)?;
        }
        writeln!(out, "{}:", turn.sender.display_name())?;
        match turn.sender {
            Sender::User => writeln!(out, "  {}", turn.text)?,
            Sender::Agent => {
                for line in render_markup(&turn.text, PRINT_WIDTH - 2, &|_| None) {
                    let text: String = line.spans.iter().map(|span| span.content.as_ref()).collect();
                    writeln!(out, "  {text}")?;
                }
            }
        }
    }

    Ok(transcript.len())
}

/// Forget a session's conversation
pub fn new_chat(config: &Config, session_id: &str) -> Result<()> {
    let mut store = open_store(config, session_id)?;
    store.clear().context("Failed to remove stored conversation")?;
    info!(session = session_id, "Conversation cleared");
    println!("Started a new chat in session {session_id}.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use crate::events::{ChatRequest, Transcript, Turn};
    use crate::storage::MemoryStore;
    use crate::transport::ReplyStream;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Echo {
        seen: Arc<Mutex<Vec<ChatRequest>>>,
    }

    #[async_trait]
    impl Transport for Echo {
        async fn open(&self, request: &ChatRequest) -> Result<ReplyStream, ChatError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(ReplyStream::from_chunks(["echo: ", "ok"]))
        }
    }

    #[tokio::test]
    async fn send_prints_stream_and_sends_prior_history() {
        let store = MemoryStore::new();
        let mut seeded = TranscriptStore::new(store.clone(), "chatHistory");
        seeded
            .save(&Transcript::from(vec![Turn::user("before"), Turn::agent("<p>earlier</p>\n")]))
            .unwrap();

        let transport = Echo::default();
        let outcome = send_with(
            transport.clone(),
            TranscriptStore::new(store.clone(), "chatHistory"),
            "error",
            "now",
            PlainView::new(Vec::new(), false),
        )
        .await;
        assert_eq!(outcome, SubmitOutcome::Completed);

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].user_message, "now");
        assert_eq!(seen[0].history.len(), 2);

        let stored = seeded.load().unwrap().unwrap();
        assert_eq!(stored.len(), 4);
        assert_eq!(stored.turns()[3], Turn::agent("<p>echo: ok</p>\n"));
    }

    #[test]
    fn history_renders_agent_markup_as_text() {
        let mut store = TranscriptStore::new(MemoryStore::new(), "chatHistory");
        store
            .save(&Transcript::from(vec![
                Turn::user("show code"),
                Turn::agent("<p>Here:</p>\n<pre><code>ls\n</code></pre>\n"),
            ]))
            .unwrap();

        let mut out = Vec::new();
        assert_eq!(write_history(&mut store, &mut out).unwrap(), 2);
        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed, "You:\n  show code\n\nAgent:\n  Here:\n  │ ls\n");
    }

    #[test]
    fn store_refuses_session_ids_outside_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.root = dir.path().to_path_buf();

        assert!(open_store(&config, "../escape").is_err());
        assert!(open_store(&config, "work").is_ok());
    }

    #[test]
    fn empty_history_writes_nothing() {
        let mut store = TranscriptStore::new(MemoryStore::new(), "chatHistory");
        let mut out = Vec::new();
        assert_eq!(write_history(&mut store, &mut out).unwrap(), 0);
        assert!(out.is_empty());
    }
}
