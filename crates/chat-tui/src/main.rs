use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use app::App;
use chat_core::theme::detect_prefers_dark;
use chat_core::{Config, ConfigStore, GenerateClient, Theme, ThemeManager};
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "prompt-chat")]
#[command(version, about = "Terminal chat client for a /generate endpoint")]
struct Cli {
    /// Backend base URL
    #[arg(short, long, env = "PROMPT_CHAT_SERVER")]
    server: Option<String>,
    /// Start with this theme (light or dark) and save it
    #[arg(short, long)]
    theme: Option<Theme>,
}

/// Flag or env first, then the saved config, then the built-in default.
fn resolve_server_url(cli: Option<&str>, config: &Config) -> String {
    match cli.map(str::trim).filter(|s| !s.is_empty()) {
        Some(url) => url.to_string(),
        None => config.server_url().to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging is best-effort; the app runs without it
    let _log_guard = match logging::init() {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: logging disabled: {e:#}");
            None
        }
    };

    let store = match ConfigStore::default_location() {
        Ok(store) => Some(store),
        Err(e) => {
            warn!(error = %e, "no config directory");
            None
        }
    };

    let config = match store.as_ref().map(ConfigStore::load).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "could not load config; using defaults");
            Config::default()
        }
    };

    let server_url = resolve_server_url(cli.server.as_deref(), &config);
    info!(server = %server_url, "starting");

    let theme = match cli.theme {
        Some(theme) => ThemeManager::with_theme(store, theme),
        None => ThemeManager::initialize(store, detect_prefers_dark()),
    };

    let mut app = App::new(GenerateClient::new(&server_url), theme);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    info!("exiting");
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        let Some(event) = events.next().await else {
            break;
        };
        handler::handle_event(app, event);
        app.poll_request().await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::config::DEFAULT_SERVER_URL;

    #[test]
    fn test_cli_parses_server_and_theme() {
        let cli = Cli::try_parse_from(["prompt-chat", "--server", "http://h:1", "--theme", "dark"])
            .unwrap();
        assert_eq!(cli.server.as_deref(), Some("http://h:1"));
        assert_eq!(cli.theme, Some(Theme::Dark));

        assert!(Cli::try_parse_from(["prompt-chat", "--theme", "sepia"]).is_err());
    }

    #[test]
    fn test_server_url_precedence() {
        let mut config = Config::default();
        assert_eq!(resolve_server_url(None, &config), DEFAULT_SERVER_URL);

        config.server_url = Some("http://saved:9000".to_string());
        assert_eq!(resolve_server_url(None, &config), "http://saved:9000");
        assert_eq!(resolve_server_url(Some("  "), &config), "http://saved:9000");
        assert_eq!(resolve_server_url(Some("http://flag:1"), &config), "http://flag:1");
    }
}
