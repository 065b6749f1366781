//! Gift Room Backend Service
//!
//! Main entry point for the gift room service.
//! This service provides:
//! - HTTP API for creating, joining, claiming and refunding gift rooms
//! - Background sweep that finalises expired rooms

use anyhow::{Context, Result};
use giftroom_backend::clock::{Clock, SystemClock};
use giftroom_backend::config::{AppConfig, StorageBackend};
use giftroom_backend::database::connect;
use giftroom_backend::http_service;
use giftroom_backend::repositories::PgGiftRoomStore;
use giftroom_backend::services::AuditTrailService;
use giftroom_backend::store::{GiftRoomStore, MemoryStore};
use giftroom_backend::{AppError, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("giftroom_backend={},sqlx=warn,axum=info", config.log_level).into()
    });

    if config.is_production() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn build_store(config: &AppConfig) -> Result<Arc<dyn GiftRoomStore>> {
    match config.storage_backend {
        StorageBackend::Memory => {
            if config.is_production() {
                warn!("In-memory store does not coordinate across instances; do not scale out");
            }
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Postgres => {
            let db_config = config
                .database
                .as_ref()
                .context("DATABASE_URL must be set for the postgres backend")?;

            info!("Connecting to database...");
            let pool = connect(db_config)
                .await
                .context("Database initialization failed")?;

            Ok(Arc::new(PgGiftRoomStore::new(pool)))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    let config = AppConfig::from_env()
        .map_err(AppError::Config)
        .context("Configuration error")?;

    init_tracing(&config);

    info!("Gift Room backend starting");
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);
    info!("Storage backend: {}", config.storage_backend.as_str());
    info!("HTTP port: {}", config.http_port);

    let store = build_store(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let audit = Arc::new(
        AuditTrailService::new(PathBuf::from(&config.audit_log_dir))
            .context("Audit trail initialization failed")?,
    );

    let http_port = config.http_port;
    let state = Arc::new(AppState::new(config, store, clock, audit));
    info!("Application state initialized");

    let sweeper = state.sweeper();
    let sweeper_handle = tokio::spawn(async move {
        sweeper.start().await;
    });
    info!(
        "Expiration sweeper started ({}s interval, {}m claim grace)",
        state.config.gift_rooms.sweep_interval_secs, state.config.gift_rooms.claim_grace_minutes
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server on {}", addr))?;
    let app = http_service::router(state.clone());

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            error!("HTTP server error: {}", e);
        }
    });
    info!("HTTP server listening on {}", addr);
    info!("Press Ctrl+C to shutdown gracefully");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        _ = server_handle => {
            error!("HTTP server exited unexpectedly");
        }
        _ = sweeper_handle => {
            error!("Expiration sweeper exited unexpectedly");
        }
    }

    info!("Gift Room backend shutdown complete");
    Ok(())
}
