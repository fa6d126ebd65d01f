// qdesk - queue desk client
//
// Talks to the queue desk REST backend and its live notification socket.
//
// Architecture:
// - Gateway (reqwest): every HTTP call, bearer auth, central 401 handling
// - Session: login/logout/restore over two durable storage scopes
// - Resource stores: cached CRUD collections (queues, services)
// - List views: filters, paging and local sorting over a store
// - Live channel (tokio-tungstenite): self-reconnecting JSON WebSocket
// - Context: wires all of the above once from Config

mod api;
mod channel;
mod cli;
mod commands;
mod config;
mod context;
mod error;
mod events;
mod list_view;
mod logging;
mod models;
mod resources;
mod session;
mod util;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use context::AppContext;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => {
            // Ensure config template exists (helps users discover options)
            Config::ensure_config_exists();
            Config::from_env()?
        }
    };

    // Config commands work even when the backend settings are wrong
    if let Commands::Config { show, reset, path } = cli.command {
        return commands::handle_config(&config, cli.config.as_deref(), show, reset, path);
    }

    // Must stay alive until exit so buffered file logs are flushed
    let _file_guard = logging::init(&config.logging);

    tracing::debug!(api = %config.api_base_url, ws = %config.ws_url, "Starting qdesk");

    let ctx = AppContext::new(config);
    let mut stdout = std::io::stdout();
    commands::run(&ctx, cli.command, &mut stdout).await
}
