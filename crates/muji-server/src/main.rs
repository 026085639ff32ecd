//! # muji-server
//!
//! Back-office server for the Muji catalog.
//!
//! This binary provides:
//! - **SQLite store** for users, listings, chats, orders, comments,
//!   promocodes and settings, with ownership checks on every user-scoped
//!   read and write
//! - **Admin session guard**: credential login issuing an HttpOnly cookie
//! - **Telegram identity**: HMAC-verified Mini App init data
//! - **REST API** (axum) for the admin dashboard and the Mini App, plus
//!   static serving of uploads
//! - **Order reaper** deleting unpaid orders past their expiry

mod api;
mod auth;
mod blob_store;
mod config;
mod error;
mod session;

use std::sync::Arc;

use chrono::Utc;
use muji_shared::constants::APP_NAME;
use muji_store::Database;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::auth::TelegramVerifier;
use crate::blob_store::BlobStore;
use crate::config::ServerConfig;
use crate::session::{InMemorySessionStore, SessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,muji_server=debug,muji_store=debug")),
        )
        .init();

    info!("Starting {} server v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    if config.uses_default_credentials() {
        warn!("Admin credentials are the built-in defaults; set ADMIN_USERNAME and ADMIN_PASSWORD");
    }

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Database (runs migrations on open)
    let db = Database::open_at(&config.database_path)?;
    info!(path = %config.database_path.display(), "Database opened");
    let db = Arc::new(Mutex::new(db));

    // Upload directory (created if missing)
    let blob_store =
        Arc::new(BlobStore::new(config.upload_dir.clone(), config.max_upload_size).await?);

    let session_ttl = i64::try_from(config.session_ttl_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX);
    let sessions = Arc::new(InMemorySessionStore::new(session_ttl));

    let telegram = Arc::new(TelegramVerifier::from_config(&config));
    if !telegram.is_enabled() {
        warn!("TELEGRAM_BOT_TOKEN is not set; Telegram sign-in is disabled");
    }

    let http_addr = config.http_addr;
    let reap_interval = config.order_reap_interval_secs;

    let app_state = AppState {
        db: db.clone(),
        blob_store,
        sessions: sessions.clone(),
        telegram,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic session cleanup (every 10 minutes)
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(600));
        loop {
            interval.tick().await;
            sessions.purge_expired().await;
        }
    });

    // Order reaper; an interval of 0 disables it
    if reap_interval > 0 {
        let db = db.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(reap_interval));
            loop {
                interval.tick().await;
                if let Err(e) = db.lock().await.reap_expired_orders(Utc::now()) {
                    tracing::error!(error = %e, "Order reaper failed");
                }
            }
        });
        info!(interval_secs = reap_interval, "Order reaper running in background");
    }

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
