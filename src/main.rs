//! cardmarket server.
//!
//! Starts the HTTP API for the player-card marketplace:
//! - Storage: embedded Sled database (users, players, ownership records)
//! - Auth: bcrypt password hashes + HS256 session tokens
//! - Networking: Axum on Tokio, graceful ctrl-c shutdown
//!
//! Usage:
//!   cargo run --bin seed_data     # populate demo data
//!   cargo run --bin cardmarket    # start the server
//!   # then drive it with cardmarket-cli or curl

use std::io;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use cardmarket::config::Config;
use cardmarket::rest::create_router;
use cardmarket::storage::Storage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    // Log to stdout and a daily-rotated file; the guard must outlive main so
    // buffered log lines are flushed on shutdown.
    let file_appender = tracing_appender::rolling::daily("logs", "cardmarket.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(file_writer.and(io::stdout))
        .init();

    let storage = Storage::open(&config.data_dir)?;
    let app = create_router(storage, &config);

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, data_dir = %config.data_dir, "cardmarket listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
    }
}
