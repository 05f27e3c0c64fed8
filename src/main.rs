//! eobot - message store and anti-repeat replay bot.

use eobot::config::{self, Config};
use eobot::db::{StorePair, redact};
use eobot::handlers::{BotSettings, Registry};
use eobot::http;
use eobot::transport::console::{self, ConsoleTransport};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing. Stdout carries console replies, so logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("EOBOT_LOG_FORMAT").is_ok_and(|v| v == "json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "eobot.toml".to_string());

    let mut config = Config::load_or_default(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;
    config::apply_env(&mut config);

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "Refusing to start with {} configuration error(s)",
            errors.len()
        ));
    }

    let secondary = config
        .database
        .secondary_url
        .as_deref()
        .map(redact)
        .unwrap_or_else(|| "none".to_string());
    info!(path = %config.database.path, %secondary, "Starting eobot");

    let db = StorePair::open_with(
        &config.database.path,
        config.database.secondary_url.as_deref(),
        config.database.migration_batch_size,
    )
    .await
    .map_err(|e| {
        error!(code = e.error_code(), error = %e, "Failed to open message stores");
        e
    })?;
    let db = Arc::new(db);

    if config.http.enabled {
        let db = Arc::clone(&db);
        let addr = config.http.listen;
        tokio::spawn(async move {
            http::run_http_server(addr, db).await;
        });
    }

    let settings = BotSettings::from(&config);
    let registry = Registry::new();
    let transport = ConsoleTransport::stdout();
    let input = BufReader::new(tokio::io::stdin());

    tokio::select! {
        result = console::run(input, &transport, &registry, &db, &settings) => {
            if let Err(e) = result {
                warn!(error = %e, "Console input failed");
            }
            info!("Input closed, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
        }
    }

    db.close().await?;
    info!("Stores closed");
    Ok(())
}
