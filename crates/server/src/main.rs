//! Snakepit game server.

use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Snakepit Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = server::Config::load()?;
    info!("Loaded configuration");
    info!("  Listen: {}:{}", config.server.bind, config.server.port);
    info!("  Workers: {}", config.server.workers);
    info!("  Tick: {}ms", config.server.tick_interval_ms);
    info!("  Grid: {}x{}", config.grid.width, config.grid.height);
    info!(
        "  Limits: {} players, {} food, {} chat lines",
        config.limits.max_players, config.limits.max_food, config.limits.chat_history
    );

    // Start the game server
    server::run(config).await?;

    Ok(())
}
