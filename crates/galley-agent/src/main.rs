//! # galley-agent
//!
//! Device agent binary: loads settings, connects to the backend event
//! stream, and keeps the cart and checkout consumers in sync until Ctrl-C.

#![deny(unsafe_code)]

mod app;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use galley_cart::FileStorage;
use galley_core::logging::{LogFormat, init_subscriber};
use galley_realtime::{NoToken, RealtimeClient, StaticToken, TracingInterceptor};
use galley_settings::{GalleySettings, load_settings_from_path, settings_home, settings_path};
use tracing::info;

use crate::app::App;

/// Galley device agent.
#[derive(Parser, Debug)]
#[command(name = "galley-agent", about = "Galley realtime sync agent")]
struct Cli {
    /// Settings file (defaults to `~/.galley/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Backend endpoint, overriding settings.
    #[arg(long)]
    base_url: Option<String>,

    /// Restaurant to sync, overriding settings.
    #[arg(long)]
    restaurant_id: Option<String>,

    /// Bearer token. Falls back to `GALLEY_TOKEN`.
    #[arg(long)]
    token: Option<String>,

    /// Log filter, overriding settings.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,

    /// Log every frame on the wire at trace level.
    #[arg(long)]
    trace_wire: bool,
}

impl Cli {
    fn apply(&self, settings: &mut GalleySettings) {
        if let Some(url) = &self.base_url {
            settings.realtime.base_url.clone_from(url);
        }
        if let Some(id) = &self.restaurant_id {
            settings.restaurant_id = Some(id.clone());
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.format = LogFormat::Json;
        }
    }

    fn token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var("GALLEY_TOKEN").ok())
            .filter(|t| !t.is_empty())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("invalid settings after CLI overrides")?;

    init_subscriber(&settings.logging.level, settings.logging.format);
    info!(
        settings = %path.display(),
        base_url = %settings.realtime.base_url,
        restaurant_id = settings.restaurant_id.as_deref().unwrap_or("-"),
        "starting galley agent"
    );

    let mut client = RealtimeClient::builder(settings.client_config());
    client = match cli.token() {
        Some(token) => client.token_provider(StaticToken::new(token)),
        None => client.token_provider(NoToken),
    };
    if cli.trace_wire {
        client = client.interceptor(TracingInterceptor);
    }

    let cart_dir = settings.cart.resolved_dir(&settings_home());
    let app = App::start(&settings, client, Arc::new(FileStorage::new(cart_dir)))?;
    app.connect().await;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");
    app.shutdown().await;
    Ok(())
}
