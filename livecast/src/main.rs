mod server;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use livecast_core::{
    bootstrap::{init_database, init_services, load_config},
    logging,
};

use server::LivecastServer;

/// Live-stream session server: signaling relay, HLS assembly and recordings
#[derive(Debug, Parser)]
#[command(name = "livecast", version, about)]
struct Args {
    /// Path to a YAML/TOML config file
    #[arg(short, long, env = "LIVECAST_CONFIG_PATH")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load and validate configuration
    let config = load_config(args.config.as_deref())?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("LiveCast server starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Durable store: Postgres when configured, otherwise in memory
    let pool = if config.use_database() {
        let pool = init_database(&config).await?;

        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&pool).await.map_err(|e| {
            error!(error = %e, "Failed to run migrations");
            anyhow::anyhow!("Migration failed: {e}")
        })?;
        info!("Migrations completed");

        Some(pool)
    } else {
        None
    };

    // 4. Services
    let services = init_services(pool, &config);

    // 5. Serve until a shutdown signal arrives
    LivecastServer::new(Arc::new(config), services).start().await
}
