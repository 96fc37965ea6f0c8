//! Terminal chat client for a streaming agent endpoint.
//!
//! A [`session::ChatSession`] sends each message to the agent, shows the
//! reply as plain text while it streams, renders it as markdown once the
//! stream ends and keeps the transcript in session-scoped storage.

pub mod commands;
pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod logging;
pub mod markdown;
pub mod session;
pub mod storage;
pub mod streaming;
pub mod transport;
pub mod ui;
pub mod view;
