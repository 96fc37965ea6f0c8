use crate::config::Config;
use crate::error::ChatError;
use crate::events::ChatRequest;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::pin::Pin;
use tokio::time::Duration;
use tracing::debug;

type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, ChatError>> + Send>>;

/// The body of one agent reply as a finite sequence of byte chunks.
///
/// `next_chunk` yields `Ok(None)` once the body has ended and keeps doing so
/// afterwards; a reply cannot be read twice. Dropping the stream cancels the
/// underlying read.
pub struct ReplyStream {
    inner: Option<ChunkStream>,
}

impl ReplyStream {
    pub fn new(stream: impl Stream<Item = Result<Bytes, ChatError>> + Send + 'static) -> Self {
        Self {
            inner: Some(Box::pin(stream)),
        }
    }

    /// A reply whose chunks are all known up front
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        let chunks: Vec<Result<Bytes, ChatError>> =
            chunks.into_iter().map(|chunk| Ok(chunk.into())).collect();
        Self::new(stream::iter(chunks))
    }

    /// Wait for the next chunk. `Ok(None)` is the end-of-stream signal.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, ChatError> {
        let Some(stream) = self.inner.as_mut() else {
            return Ok(None);
        };

        match stream.next().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(err)) => {
                self.inner = None;
                Err(err)
            }
            None => {
                self.inner = None;
                Ok(None)
            }
        }
    }

    #[cfg(test)]
    fn is_finished(&self) -> bool {
        self.inner.is_none()
    }
}

/// Something that can carry a chat request to the agent
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request; resolves once the response headers are in
    async fn open(&self, request: &ChatRequest) -> Result<ReplyStream, ChatError>;
}

/// Reply shape of agent servers that answer with one JSON object instead of
/// a streamed body
#[derive(Debug, Deserialize)]
struct JsonReply {
    agent_response: Option<String>,
    error: Option<String>,
}

/// HTTP transport: `POST {endpoint}{chat_path}` with a JSON body
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        // No overall timeout: a reply may legitimately stream for minutes
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url: config.chat_url(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn is_json(response: &reqwest::Response) -> bool {
        response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/json"))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ReplyStream, ChatError> {
        let mut builder = self.client.post(&self.url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header("X-API-Key", key);
        }

        debug!(url = %self.url, history = request.history.len(), "Sending chat request");
        let response = builder.send().await.map_err(|source| ChatError::Request {
            url: self.url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > 512 {
                let mut cut = 512;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(ChatError::Status { status, body });
        }

        if Self::is_json(&response) {
            let reply: JsonReply = response
                .json()
                .await
                .map_err(|err| ChatError::Decode(err.to_string()))?;
            return match (reply.agent_response, reply.error) {
                (Some(text), _) => Ok(ReplyStream::from_chunks([text])),
                (None, Some(error)) => Err(ChatError::Decode(error)),
                (None, None) => Err(ChatError::Decode("reply has no agent_response".to_string())),
            };
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|err| ChatError::Read(err.to_string())));
        Ok(ReplyStream::new(body))
    }
}
