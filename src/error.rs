use thiserror::Error;

/// Failures while talking to the chat endpoint.
///
/// The user only ever sees one fallback message for all of these; the
/// variants exist so the log says what actually went wrong.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("endpoint answered with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("reply stream broke off: {0}")]
    Read(String),

    #[error("could not decode reply: {0}")]
    Decode(String),
}

/// Failures of the session key-value store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed for key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid storage key {0:?}")]
    InvalidKey(String),
}
