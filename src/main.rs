//! Conditional swap order monitor - Main executable
//!
//! Polls token prices on a fixed cadence, executes pending swap orders whose
//! target price was reached and records price trigger matches.
use anyhow::Context;
use dotenv::dotenv;
use log::{error, info};
use order_monitor::{AppConfig, ServiceContainer};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

/// Application entry point
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize logging with default level of "info"
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    info!("Starting order monitor v{}", order_monitor::VERSION);

    let config = AppConfig::load().context("Failed to load configuration")?;

    // Setup database connection pool
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to create database connection pool")?;

    // Run database migrations
    info!("Running database migrations...");
    if let Err(e) = sqlx::migrate!("./migrations").run(&db_pool).await {
        error!("Failed to run migrations: {}", e);
        return Err(anyhow::Error::from(e));
    }
    info!("Migrations completed successfully");

    let db_pool = Arc::new(db_pool);
    let container = ServiceContainer::new(db_pool.clone(), config)
        .context("Failed to initialize services")?;

    let mut scheduler = container.build_scheduler();
    scheduler.start();

    info!("Monitor is running! Press Ctrl+C to stop.");
    wait_for_shutdown_signal().await?;

    info!("Shutting down...");
    scheduler.shutdown().await;
    db_pool.close().await;
    info!("Database pool closed");

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl+C")?,
        _ = terminate.recv() => info!("Received SIGTERM"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")
}
