mod bot;
mod commands;
mod config;
mod leads;
mod links;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::commands::CommandRegistry;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,leadbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Pick up a local .env before reading variables
    let _ = dotenvy::dotenv();

    // Load configuration: a TOML file if one is given, the environment otherwise
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(config_path) => {
            info!("Loading configuration from: {}", config_path.display());
            Config::load(&config_path).with_context(|| {
                format!("Failed to load config from {}", config_path.display())
            })?
        }
        None => {
            info!("Loading configuration from environment");
            Config::from_env().context("Failed to load config from environment")?
        }
    };

    info!("Configuration loaded successfully");
    info!("  Operator: @{}", config.operator.username);
    info!(
        "  Lead forwarding: {}",
        if config.leads.webhook_url.is_some() { "enabled" } else { "disabled" }
    );
    info!("  Lead timeout: {}s", config.leads.timeout_secs);

    let state = Arc::new(AppState::new(&config)?);
    info!("  CTA links: {}...", state.links.prefix());
    let commands = Arc::new(CommandRegistry::standard());

    info!("Bot is starting...");
    bot::run(&config.telegram.bot_token, state, commands).await?;

    Ok(())
}
