use anyhow::Result;

mod app;
mod backend;
mod config;
mod handler;
mod history;
mod session;
mod tui;
mod ui;

use app::App;
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = Config::load().unwrap_or_else(|_| Config::new());
    let mut app = App::new(&config)?;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    let result = run(&mut terminal, &mut events, &mut app).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, events: &mut tui::EventHandler, app: &mut App) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        if let Some(event) = events.next().await {
            handler::handle_event(app, event)?;
        }

        // The tick event keeps this loop turning, so a settled dispatch is
        // noticed within one animation frame.
        app.poll_dispatch().await;
    }
    Ok(())
}

/// Log to a file under the config directory; the terminal belongs to the
/// TUI. Setup failure is not fatal, the client just runs unlogged.
fn init_logging() {
    let Some(config_dir) = dirs::config_dir() else {
        return;
    };
    let log_dir = config_dir.join("unid3");
    if std::fs::create_dir_all(&log_dir).is_err() {
        return;
    }
    let Ok(log_file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("unid3.log"))
    else {
        return;
    };

    let _ = tracing_subscriber::fmt()
        .with_writer(std::sync::Mutex::new(log_file))
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .try_init();
}
