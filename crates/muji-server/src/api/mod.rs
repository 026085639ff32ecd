//! HTTP API (axum).
//!
//! - public routes: health, admin login/logout, Telegram sign-in, uploads
//! - admin routes: guarded by the `admin_session` cookie
//! - user routes: guarded by verified Telegram init data

mod account;
mod admin;
mod form;
mod user;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    middleware,
    routing::get,
    Json, Router,
};
use muji_shared::constants::{APP_NAME, UPLOADS_URL_PREFIX};
use muji_store::Database;
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{require_admin, TelegramVerifier};
use crate::blob_store::BlobStore;
use crate::config::ServerConfig;
use crate::session::SessionStore;

pub use form::MAX_FILES_PER_REQUEST;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub blob_store: Arc<BlobStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub telegram: Arc<TelegramVerifier>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let admin_routes = admin::routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        require_admin,
    ));

    // A request may carry several files, each up to the configured size.
    let body_limit = state
        .config
        .max_upload_size
        .saturating_mul(MAX_FILES_PER_REQUEST);

    Router::new()
        .route("/health", get(health_check))
        .merge(account::routes())
        .merge(admin_routes)
        .merge(user::routes())
        .nest_service(UPLOADS_URL_PREFIX, ServeDir::new(state.blob_store.base_path()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    name: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        name: APP_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `{"status": ...}` acknowledgement body.
fn ack(value: &'static str) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": value }))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
