use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use streamchat::commands;
use streamchat::config::Config;
use streamchat::driver;
use streamchat::logging::{self, LogTarget};
use streamchat::markdown::CmarkTransform;
use streamchat::session::{ChatSession, SubmitOutcome};
use streamchat::transport::HttpTransport;
use streamchat::ui::{self, conversation::ConversationManager};
use streamchat::view::ChannelView;
use tracing::info;

#[derive(Parser)]
#[command(name = "streamchat")]
#[command(version)]
#[command(about = "Chat with a streaming agent from the terminal", long_about = None)]
struct Cli {
    /// Config file (default: ~/.streamchat/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Session to use; a new one is created when omitted
    #[arg(long, short, global = true)]
    session: Option<String>,

    /// Agent base URL, overriding the config file
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message and print the streamed reply
    Send {
        message: String,
        /// Also print the rendered reply markup
        #[arg(long)]
        markup: bool,
    },
    /// Print a session's conversation
    History,
    /// Start a new chat, clearing the session's conversation
    New,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }

    match cli.command {
        None => {
            let session_id = cli.session.unwrap_or_else(new_session_id);
            logging::init(LogTarget::File(config.session_dir(&session_id)?.join("streamchat.log")))?;
            run_tui(&config, session_id).await?;
        }
        Some(Commands::Send { message, markup }) => {
            logging::init(LogTarget::Stderr)?;
            let session_id = match cli.session {
                Some(id) => id,
                None => {
                    let id = new_session_id();
                    eprintln!("session: {id}");
                    id
                }
            };
            let outcome = commands::send_message(&config, &session_id, &message, markup).await?;
            if outcome == SubmitOutcome::Failed {
                return Ok(ExitCode::FAILURE);
            }
        }
        Some(Commands::History) => {
            logging::init(LogTarget::Stderr)?;
            commands::print_history(&config, &require_session(cli.session)?)?;
        }
        Some(Commands::New) => {
            logging::init(LogTarget::Stderr)?;
            commands::new_chat(&config, &require_session(cli.session)?)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn require_session(session: Option<String>) -> Result<String> {
    session.ok_or_else(|| anyhow::anyhow!("--session is required for this command"))
}

async fn run_tui(config: &Config, session_id: String) -> Result<()> {
    let transport = HttpTransport::new(config)?;
    info!(url = transport.url(), session = %session_id, "Starting chat");

    let session = ChatSession::new(
        transport,
        commands::open_store(config, &session_id)?,
        CmarkTransform,
        config.ui.error_message.clone(),
    );
    let (view, events) = ChannelView::new();
    let handle = driver::spawn(session, view);

    let manager = ConversationManager::new(handle, events, &config.ui, session_id);
    ui::run(manager).await
}
