//! Endpoints for Telegram users. Every handler takes a [`TelegramIdentity`],
//! so each request is verified before it reaches the store, and all lookups
//! are scoped to the caller's external id.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use muji_shared::OrderStatus;
use muji_store::{FileId, ListingId, NewFile, NewMessage, NewOrder, OrderId, OrderUpdate};
use serde::Deserialize;
use tracing::info;

use super::form::{discard, store_files, Form};
use super::{ack, AppState};
use crate::auth::TelegramIdentity;
use crate::error::ServerError;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/files", get(list_files).post(upload_file))
        .route("/api/files/stats", get(storage_stats))
        .route("/api/files/:id", get(get_file).delete(delete_file))
        .route("/api/profiles", get(list_profiles))
        .route(
            "/api/profiles/:id/comments",
            get(list_comments).post(add_comment),
        )
        .route(
            "/api/chats/:profile_id/messages",
            get(chat_messages).post(send_message),
        )
        .route("/api/orders", get(list_orders).post(place_order))
        .route("/api/orders/:id/cancel", post(cancel_order))
        .route("/api/promocodes/redeem", post(redeem_promocode))
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

async fn list_files(
    State(state): State<AppState>,
    identity: TelegramIdentity,
) -> Result<impl IntoResponse, ServerError> {
    let files = state
        .db
        .lock()
        .await
        .list_user_files(identity.external_id())?;
    Ok(Json(serde_json::json!({ "files": files })))
}

async fn upload_file(
    State(state): State<AppState>,
    identity: TelegramIdentity,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ServerError> {
    let form = Form::read(&mut multipart, state.blob_store.max_size()).await?;
    let Some(upload) = form.files_named("file").next() else {
        return Err(ServerError::BadRequest("No file provided".into()));
    };

    let stored = store_files(&state.blob_store, &[upload]).await?;
    let Some(blob) = stored.first() else {
        return Err(ServerError::Internal("upload produced no blob".into()));
    };

    let record = NewFile {
        filename: blob.filename.clone(),
        original_filename: upload.filename.clone(),
        file_path: blob.path.to_string_lossy().into_owned(),
        file_size: blob.size as i64,
        mime_type: upload.content_type.clone(),
    };

    let result = {
        let db = state.db.lock().await;
        db.add_file(identity.0.id, identity.external_id(), &record)
            .and_then(|id| db.get_file(id, identity.external_id()))
    };

    match result {
        Ok(file) => {
            info!(file_id = file.id, user = identity.external_id(), "File uploaded");
            Ok((
                StatusCode::CREATED,
                Json(serde_json::json!({
                    "status": "uploaded",
                    "file": file,
                    "url": blob.url,
                })),
            ))
        }
        Err(e) => {
            discard(&state.blob_store, &stored).await;
            Err(e.into())
        }
    }
}

async fn storage_stats(
    State(state): State<AppState>,
    identity: TelegramIdentity,
) -> Result<impl IntoResponse, ServerError> {
    let stats = state
        .db
        .lock()
        .await
        .user_storage_stats(identity.external_id())?;
    Ok(Json(stats))
}

async fn get_file(
    State(state): State<AppState>,
    identity: TelegramIdentity,
    Path(id): Path<FileId>,
) -> Result<impl IntoResponse, ServerError> {
    let file = state
        .db
        .lock()
        .await
        .get_file(id, identity.external_id())?;
    Ok(Json(file))
}

async fn delete_file(
    State(state): State<AppState>,
    identity: TelegramIdentity,
    Path(id): Path<FileId>,
) -> Result<impl IntoResponse, ServerError> {
    let deleted = state.db.lock().await.delete_file(
        id,
        identity.external_id(),
        &*state.blob_store,
    )?;
    if !deleted {
        return Err(ServerError::NotFound);
    }
    Ok(ack("deleted"))
}

// ---------------------------------------------------------------------------
// Catalog and comments
// ---------------------------------------------------------------------------

async fn list_profiles(
    State(state): State<AppState>,
    _identity: TelegramIdentity,
) -> Result<impl IntoResponse, ServerError> {
    let profiles = state.db.lock().await.list_visible_listings()?;
    Ok(Json(serde_json::json!({ "profiles": profiles })))
}

async fn list_comments(
    State(state): State<AppState>,
    _identity: TelegramIdentity,
    Path(listing_id): Path<ListingId>,
) -> Result<impl IntoResponse, ServerError> {
    let db = state.db.lock().await;
    db.get_listing(listing_id)?;
    let comments = db.list_comments_for_listing(listing_id)?;
    Ok(Json(serde_json::json!({ "comments": comments })))
}

#[derive(Deserialize)]
struct NewCommentRequest {
    text: String,
    author_name: Option<String>,
}

async fn add_comment(
    State(state): State<AppState>,
    identity: TelegramIdentity,
    Path(listing_id): Path<ListingId>,
    Json(req): Json<NewCommentRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let author = req.author_name.or_else(|| identity.0.first_name.clone());
    let comment_id = state
        .db
        .lock()
        .await
        .add_comment(listing_id, author.as_deref(), &req.text)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "status": "created", "comment_id": comment_id })),
    ))
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct AfterQuery {
    /// Only return messages with a larger id (polling).
    after: Option<i64>,
}

async fn chat_messages(
    State(state): State<AppState>,
    identity: TelegramIdentity,
    Path(profile_id): Path<ListingId>,
    Query(query): Query<AfterQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let db = state.db.lock().await;
    let Some(chat) = db.find_chat(profile_id, Some(identity.external_id()))? else {
        db.get_listing(profile_id)?;
        return Ok(Json(serde_json::json!({ "chat": null, "messages": [] })));
    };

    let messages = match query.after {
        Some(after) => db.get_chat_messages_after(chat.id, after)?,
        None => db.get_chat_messages(chat.id)?,
    };
    Ok(Json(serde_json::json!({ "chat": chat, "messages": messages })))
}

#[derive(Deserialize)]
struct SendMessageRequest {
    text: String,
}

async fn send_message(
    State(state): State<AppState>,
    identity: TelegramIdentity,
    Path(profile_id): Path<ListingId>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let text = req.text.trim();
    if text.is_empty() {
        return Err(ServerError::BadRequest("Message text is required".into()));
    }

    let mut db = state.db.lock().await;
    let chat = db.get_or_create_chat(profile_id, Some(identity.external_id()))?;
    let message_id = db.add_message(chat.id, &NewMessage::from_user(text))?;

    Ok(Json(serde_json::json!({
        "status": "sent",
        "chat_id": chat.id,
        "message_id": message_id,
    })))
}

// ---------------------------------------------------------------------------
// Orders and promocodes
// ---------------------------------------------------------------------------

async fn list_orders(
    State(state): State<AppState>,
    identity: TelegramIdentity,
) -> Result<impl IntoResponse, ServerError> {
    let orders = state
        .db
        .lock()
        .await
        .list_orders(Some(identity.external_id()), None)?;
    Ok(Json(serde_json::json!({ "orders": orders })))
}

#[derive(Deserialize)]
struct PlaceOrderRequest {
    profile_id: ListingId,
    amount: f64,
    #[serde(default)]
    bonus_amount: f64,
    method: String,
    currency: Option<String>,
}

fn order_number() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}",
        Utc::now().format("%Y%m%d"),
        suffix[..8].to_ascii_uppercase()
    )
}

/// A user holds at most one unpaid order per listing: placing another one
/// rewrites the pending order and restarts its expiry.
async fn place_order(
    State(state): State<AppState>,
    identity: TelegramIdentity,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let owner = identity.external_id();
    let expires_at = i64::try_from(state.config.order_ttl_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|ttl| Utc::now().checked_add_signed(ttl));

    let db = state.db.lock().await;
    if let Some(pending) = db.find_order(req.profile_id, OrderStatus::Unpaid, Some(owner))? {
        let update = OrderUpdate {
            amount: req.amount,
            bonus_amount: req.bonus_amount,
            method: req.method,
            currency: req.currency.unwrap_or(pending.currency),
            expires_at,
        };
        db.update_order(pending.id, &update)?;
        let order = db.get_order(pending.id)?;
        return Ok((
            StatusCode::OK,
            Json(serde_json::json!({ "status": "updated", "order": order })),
        ));
    }

    let order = db.create_order(&NewOrder {
        order_number: order_number(),
        listing_id: req.profile_id,
        owner_external_id: Some(owner),
        amount: req.amount,
        bonus_amount: req.bonus_amount,
        method: req.method,
        currency: req.currency,
        expires_at,
    })?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "status": "created", "order": order })),
    ))
}

async fn cancel_order(
    State(state): State<AppState>,
    identity: TelegramIdentity,
    Path(id): Path<OrderId>,
) -> Result<impl IntoResponse, ServerError> {
    let mut db = state.db.lock().await;
    let order = db.get_order(id)?;
    if order.owner_external_id != Some(identity.external_id()) {
        return Err(ServerError::NotFound);
    }
    let order = db.set_order_status(id, OrderStatus::Cancelled)?;
    Ok(Json(serde_json::json!({ "status": "cancelled", "order": order })))
}

#[derive(Deserialize)]
struct RedeemRequest {
    code: String,
}

async fn redeem_promocode(
    State(state): State<AppState>,
    identity: TelegramIdentity,
    Json(req): Json<RedeemRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let promocode = state
        .db
        .lock()
        .await
        .redeem_promocode(&req.code, identity.external_id())?;
    Ok(Json(serde_json::json!({
        "status": "redeemed",
        "code": promocode.code,
        "discount": promocode.discount,
    })))
}
