//! Terminal lifecycle and the main draw loop.

use crate::ui::conversation::{ConversationAction, ConversationManager};
use anyhow::{Context, Result};
use crossterm::event::{self, Event};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::{self, Stdout};
use std::panic;
use std::time::Duration;
use tracing::debug;

/// Input poll interval; also the animation frame time
const FRAME: Duration = Duration::from_millis(50);

type Tui = Terminal<CrosstermBackend<Stdout>>;

fn setup_terminal() -> Result<Tui> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;
    Terminal::new(CrosstermBackend::new(stdout)).context("Failed to create terminal")
}

/// Safe to call more than once
fn restore_terminal() -> Result<()> {
    execute!(io::stdout(), LeaveAlternateScreen).context("Failed to leave alternate screen")?;
    disable_raw_mode().context("Failed to disable raw mode")?;
    Ok(())
}

fn install_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = restore_terminal();
        original_hook(panic_info);
    }));
}

/// Run the chat screen until the user quits
pub async fn run(mut manager: ConversationManager) -> Result<()> {
    install_panic_hook();
    let mut terminal = setup_terminal()?;

    let result = event_loop(&mut terminal, &mut manager).await;

    manager.shutdown();
    restore_terminal()?;
    terminal.show_cursor().context("Failed to show cursor")?;
    result
}

async fn event_loop(terminal: &mut Tui, manager: &mut ConversationManager) -> Result<()> {
    let mut dirty = true;

    loop {
        dirty |= manager.process_view_events();
        manager.tick();

        if dirty || manager.is_animating() {
            terminal
                .draw(|frame| frame.render_widget(&*manager, frame.size()))
                .context("Failed to draw")?;
            dirty = false;
        }

        // Poll without blocking the runtime so the session task keeps streaming
        let ready = tokio::task::block_in_place(|| event::poll(FRAME)).context("Failed to poll input")?;
        if !ready {
            tokio::task::yield_now().await;
            continue;
        }

        match event::read().context("Failed to read input")? {
            Event::Key(key) => {
                dirty = true;
                if manager.handle_key(key) == ConversationAction::Exit {
                    debug!("Exit requested");
                    return Ok(());
                }
            }
            Event::Resize(_, _) => dirty = true,
            _ => {}
        }
    }
}
