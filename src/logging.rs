use anyhow::{Context, Result, anyhow};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (`tracing` directive syntax)
pub const LOG_ENV: &str = "STREAMCHAT_LOG";

/// Where log lines go
#[derive(Debug, Clone)]
pub enum LogTarget {
    /// Non-interactive commands: stderr, warnings and up by default
    Stderr,
    /// The terminal UI owns the screen, so it logs to a file
    File(PathBuf),
}

impl LogTarget {
    fn default_directive(&self) -> &'static str {
        match self {
            LogTarget::Stderr => "warn",
            LogTarget::File(_) => "info",
        }
    }
}

pub fn init(target: LogTarget) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(target.default_directive()));

    let installed = match target {
        LogTarget::Stderr => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init(),
        LogTarget::File(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).context("Failed to create log directory")?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
    };

    installed.map_err(|err| anyhow!("Failed to install log subscriber: {err}"))
}
