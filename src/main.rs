mod auth;
mod config;
mod db;
mod domain;
mod error;
mod extractors;
mod handlers;
mod middleware;
mod models;
mod notify;
mod openapi;
mod startup;
#[cfg(test)]
mod test_support;
mod worker;

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use auth::JwksCache;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use handlers::MetricsState;

use db::{ConfigStore, PgConfigStore};
use notify::{HttpSmsSender, LogSmsSender, SmsSender};
use worker::AutoCloseWorker;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub jwks_cache: Arc<JwksCache>,
    pub user_cache: Cache<String, String>, // clerk_user_id → email
    pub config: AppConfig,
    pub metrics: Arc<MetricsState>,
    pub config_store: Arc<dyn ConfigStore>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables before reading RUST_LOG / LOG_FORMAT
    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .unwrap_or_else(|_| "text".to_string()) == "json";

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,detailhub_axum=debug,tower_http=debug".into());

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let config = AppConfig::from_env().map_err(|e| {
        tracing::error!("Configuration error: {}", e);
        e
    })?;

    let db = db::create_pool(&config.database_url).await.map_err(|e| {
        tracing::error!("Failed to create database pool: {}", e);
        e
    })?;
    tracing::info!("Database pool created successfully");

    let metrics_state = Arc::new(handlers::setup_metrics_recorder()?);
    tracing::info!("Metrics recorder initialized");

    let jwks_cache = Arc::new(JwksCache::new(&config.clerk_domain));

    // clerk_user_id → email, 5-minute TTL
    let user_cache = Cache::builder()
        .time_to_live(Duration::from_secs(300))
        .max_capacity(10_000)
        .build();

    let sms: Arc<dyn SmsSender> = match &config.sms_webhook_url {
        Some(url) => {
            tracing::info!(webhook = %url, "SMS delivery via webhook");
            Arc::new(HttpSmsSender::new(url.clone(), config.sms_api_key.clone()))
        }
        None => {
            tracing::warn!("SMS_WEBHOOK_URL not set, SMS messages will only be logged");
            Arc::new(LogSmsSender)
        }
    };

    let config_store: Arc<dyn ConfigStore> = Arc::new(PgConfigStore::new(db.clone()));

    let shutdown = CancellationToken::new();
    let worker = AutoCloseWorker::new(
        db.clone(),
        sms,
        config.default_timezone,
        config.auto_close_scan_interval,
        shutdown.clone(),
    );
    let worker_handle = tokio::spawn(worker.run());

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState {
        db,
        jwks_cache,
        user_cache,
        config,
        metrics: metrics_state,
        config_store,
    });

    let app = startup::build_router(state)?;

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Auto-close worker task failed");
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
            }
            tracing::info!("Shutdown signal received");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
