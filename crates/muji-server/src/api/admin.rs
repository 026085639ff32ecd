//! Back-office endpoints. Every route here sits behind `require_admin`.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use muji_shared::constants::UPLOADS_URL_PREFIX;
use muji_shared::OrderStatus;
use muji_store::{
    Banner, CommentId, ListingId, NewListing, NewMessage, OrderId, PromocodeId,
    VipCatalogs, WalletAddresses,
};
use serde::Deserialize;
use tracing::{info, warn};

use super::form::{discard, store_files, Form};
use super::{ack, AppState};
use crate::error::ServerError;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/stats", get(stats))
        .route("/api/admin/profiles", get(list_profiles).post(create_profile))
        .route("/api/admin/profiles/:id/toggle", post(toggle_profile))
        .route("/api/admin/profiles/:id/rename", post(rename_profile))
        .route("/api/admin/profiles/:id", delete(delete_profile))
        .route("/api/admin/chats", get(list_chats))
        .route("/api/admin/chats/:profile_id/messages", get(chat_messages))
        .route("/api/admin/chats/:profile_id/reply", post(reply))
        .route(
            "/api/admin/chats/:profile_id/system-message",
            post(system_message),
        )
        .route("/api/admin/comments", get(list_comments))
        .route("/api/admin/comments/:id", delete(delete_comment))
        .route(
            "/api/admin/promocodes",
            get(list_promocodes).post(create_promocode),
        )
        .route("/api/admin/promocodes/:id/toggle", post(toggle_promocode))
        .route("/api/admin/promocodes/:id", delete(delete_promocode))
        .route("/api/admin/banner", get(get_banner).post(set_banner))
        .route(
            "/api/admin/crypto_wallets",
            get(get_wallets).post(set_wallets),
        )
        .route(
            "/api/admin/vip_catalogs",
            get(get_vip_catalogs).post(set_vip_catalogs),
        )
        .route("/api/admin/orders", get(list_orders))
        .route("/api/admin/orders/:id/status", post(set_order_status))
        .route("/api/admin/orders/reap", post(reap_orders))
}

async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let stats = state.db.lock().await.stats()?;
    Ok(Json(stats))
}

// ---------------------------------------------------------------------------
// Listings ("profiles")
// ---------------------------------------------------------------------------

async fn list_profiles(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let profiles = state.db.lock().await.list_listings()?;
    Ok(Json(serde_json::json!({ "profiles": profiles })))
}

/// Accepts a JSON array or a comma separated list.
fn parse_travel_cities(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    serde_json::from_str::<Vec<String>>(raw).unwrap_or_else(|_| {
        raw.split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    })
}

async fn create_profile(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ServerError> {
    let form = Form::read(&mut multipart, state.blob_store.max_size()).await?;

    let photos: Vec<_> = form.files_named("photos").collect();
    if photos.is_empty() {
        return Err(ServerError::BadRequest(
            "At least one photo is required".into(),
        ));
    }

    let mut listing = NewListing {
        name: form.required("name")?.to_string(),
        age: form
            .parse("age")?
            .ok_or_else(|| ServerError::BadRequest("Field 'age' is required".into()))?,
        gender: form.text("gender").unwrap_or_default().to_string(),
        nationality: form.text("nationality").unwrap_or_default().to_string(),
        city: form.text("city").unwrap_or_default().to_string(),
        travel_cities: parse_travel_cities(form.text("travel_cities")),
        description: form.text("description").unwrap_or_default().to_string(),
        height: form.parse("height")?,
        weight: form.parse("weight")?,
        chest: form.parse("chest")?,
        photos: Vec::new(),
    };

    // Files go to disk before the store lock is taken.
    let stored = store_files(&state.blob_store, &photos).await?;
    listing.photos = stored.iter().map(|blob| blob.url.clone()).collect();

    let created = state.db.lock().await.create_listing(&listing);
    match created {
        Ok(profile) => Ok((
            StatusCode::CREATED,
            Json(serde_json::json!({ "status": "created", "profile": profile })),
        )),
        Err(e) => {
            discard(&state.blob_store, &stored).await;
            Err(e.into())
        }
    }
}

#[derive(Deserialize)]
struct ToggleRequest {
    visible: bool,
}

async fn toggle_profile(
    State(state): State<AppState>,
    Path(id): Path<ListingId>,
    Json(req): Json<ToggleRequest>,
) -> Result<impl IntoResponse, ServerError> {
    if !state.db.lock().await.set_listing_visible(id, req.visible)? {
        return Err(ServerError::NotFound);
    }
    Ok(ack("updated"))
}

#[derive(Deserialize)]
struct RenameRequest {
    name: String,
}

async fn rename_profile(
    State(state): State<AppState>,
    Path(id): Path<ListingId>,
    Json(req): Json<RenameRequest>,
) -> Result<impl IntoResponse, ServerError> {
    if !state.db.lock().await.rename_listing(id, &req.name)? {
        return Err(ServerError::NotFound);
    }
    Ok(ack("updated"))
}

async fn delete_profile(
    State(state): State<AppState>,
    Path(id): Path<ListingId>,
) -> Result<impl IntoResponse, ServerError> {
    let photos = {
        let mut db = state.db.lock().await;
        let listing = db.get_listing(id)?;
        db.delete_listing(id)?;
        listing.photos
    };

    // Photos are only removed once the rows are gone.
    let prefix = format!("{UPLOADS_URL_PREFIX}/");
    for url in &photos {
        if let Some(filename) = url.strip_prefix(&prefix) {
            if let Err(e) = state.blob_store.delete_upload(filename).await {
                warn!(listing_id = id, url = %url, error = %e, "Failed to remove listing photo");
            }
        }
    }

    info!(listing_id = id, photos = photos.len(), "Listing deleted by admin");
    Ok(ack("deleted"))
}

// ---------------------------------------------------------------------------
// Chats
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ChatQuery {
    /// Telegram id of the chat owner; absent for the anonymous chat.
    user: Option<i64>,
}

async fn list_chats(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let chats = state.db.lock().await.list_chat_summaries()?;
    Ok(Json(serde_json::json!({ "chats": chats })))
}

/// Messages of one chat. Viewing marks everything up to the newest message
/// as read.
async fn chat_messages(
    State(state): State<AppState>,
    Path(profile_id): Path<ListingId>,
    Query(query): Query<ChatQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let db = state.db.lock().await;
    let Some(chat) = db.find_chat(profile_id, query.user)? else {
        return Ok(Json(serde_json::json!({ "chat": null, "messages": [] })));
    };

    let messages = db.get_chat_messages(chat.id)?;
    if let Some(last) = messages.last() {
        db.mark_chat_read(chat.id, last.id)?;
    }
    Ok(Json(serde_json::json!({ "chat": chat, "messages": messages })))
}

async fn reply(
    State(state): State<AppState>,
    Path(profile_id): Path<ListingId>,
    Query(query): Query<ChatQuery>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ServerError> {
    let form = Form::read(&mut multipart, state.blob_store.max_size()).await?;
    let text = form.text("text").map(str::to_string);
    let files: Vec<_> = form.files_named("files").collect();

    if text.is_none() && files.is_empty() {
        return Err(ServerError::BadRequest("Text or files is required".into()));
    }

    let stored = store_files(&state.blob_store, &files).await?;

    // One message per file, each carrying the text; otherwise a single text
    // message.
    let messages: Vec<NewMessage> = if stored.is_empty() {
        vec![NewMessage::from_admin(text)]
    } else {
        stored
            .iter()
            .zip(&files)
            .map(|(blob, file)| {
                NewMessage::from_admin(text.clone())
                    .with_file(blob.url.clone(), file.filename.clone())
            })
            .collect()
    };

    // All messages commit together, so on failure none refer to the blobs.
    let posted = state
        .db
        .lock()
        .await
        .post_messages(profile_id, query.user, &messages);

    match posted {
        Ok((chat, message_ids)) => {
            info!(chat_id = chat.id, count = message_ids.len(), "Admin reply sent");
            Ok(Json(serde_json::json!({
                "status": "sent",
                "chat_id": chat.id,
                "message_ids": message_ids,
            })))
        }
        Err(e) => {
            discard(&state.blob_store, &stored).await;
            Err(e.into())
        }
    }
}

#[derive(Deserialize)]
struct SystemMessageRequest {
    text: String,
}

async fn system_message(
    State(state): State<AppState>,
    Path(profile_id): Path<ListingId>,
    Query(query): Query<ChatQuery>,
    Json(req): Json<SystemMessageRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let mut db = state.db.lock().await;
    let chat = db.get_or_create_chat(profile_id, query.user)?;
    let message_id = db.add_message(chat.id, &NewMessage::system(req.text))?;

    Ok(Json(serde_json::json!({
        "status": "sent",
        "message_id": message_id,
    })))
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

async fn list_comments(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let comments = state.db.lock().await.list_comments()?;
    Ok(Json(serde_json::json!({ "comments": comments })))
}

async fn delete_comment(
    State(state): State<AppState>,
    Path(id): Path<CommentId>,
) -> Result<impl IntoResponse, ServerError> {
    if !state.db.lock().await.delete_comment(id)? {
        return Err(ServerError::NotFound);
    }
    Ok(ack("deleted"))
}

// ---------------------------------------------------------------------------
// Promocodes
// ---------------------------------------------------------------------------

async fn list_promocodes(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServerError> {
    let promocodes = state.db.lock().await.list_promocodes()?;
    Ok(Json(serde_json::json!({ "promocodes": promocodes })))
}

#[derive(Deserialize)]
struct CreatePromocode {
    code: String,
    discount: u32,
}

async fn create_promocode(
    State(state): State<AppState>,
    Json(req): Json<CreatePromocode>,
) -> Result<impl IntoResponse, ServerError> {
    let promocode = state
        .db
        .lock()
        .await
        .create_promocode(&req.code, req.discount)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "status": "created", "promocode": promocode })),
    ))
}

async fn toggle_promocode(
    State(state): State<AppState>,
    Path(id): Path<PromocodeId>,
) -> Result<impl IntoResponse, ServerError> {
    let active = state
        .db
        .lock()
        .await
        .toggle_promocode(id)?
        .ok_or(ServerError::NotFound)?;
    Ok(Json(serde_json::json!({ "status": "updated", "is_active": active })))
}

async fn delete_promocode(
    State(state): State<AppState>,
    Path(id): Path<PromocodeId>,
) -> Result<impl IntoResponse, ServerError> {
    if !state.db.lock().await.delete_promocode(id)? {
        return Err(ServerError::NotFound);
    }
    Ok(ack("deleted"))
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

async fn get_banner(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let settings = state.db.lock().await.settings()?;
    Ok(Json(settings.banner))
}

async fn set_banner(
    State(state): State<AppState>,
    Json(banner): Json<Banner>,
) -> Result<impl IntoResponse, ServerError> {
    state.db.lock().await.set_banner(&banner)?;
    Ok(ack("updated"))
}

async fn get_wallets(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let settings = state.db.lock().await.settings()?;
    Ok(Json(settings.crypto_wallets))
}

async fn set_wallets(
    State(state): State<AppState>,
    Json(wallets): Json<WalletAddresses>,
) -> Result<impl IntoResponse, ServerError> {
    state.db.lock().await.set_wallets(&wallets)?;
    Ok(ack("updated"))
}

async fn get_vip_catalogs(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServerError> {
    let settings = state.db.lock().await.settings()?;
    Ok(Json(settings.vip_catalogs))
}

async fn set_vip_catalogs(
    State(state): State<AppState>,
    Json(catalogs): Json<VipCatalogs>,
) -> Result<impl IntoResponse, ServerError> {
    state.db.lock().await.set_vip_catalogs(&catalogs)?;
    Ok(ack("updated"))
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct OrderQuery {
    status: Option<OrderStatus>,
    user: Option<i64>,
}

async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let orders = state.db.lock().await.list_orders(query.user, query.status)?;
    Ok(Json(serde_json::json!({ "orders": orders })))
}

#[derive(Deserialize)]
struct StatusRequest {
    status: OrderStatus,
}

/// Moving an order to `paid` also drops a system note into the buyer's chat.
async fn set_order_status(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Json(req): Json<StatusRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let mut db = state.db.lock().await;
    let order = if req.status == OrderStatus::Paid {
        db.pay_order(id, |order| {
            format!("Payment received for order #{}", order.order_number)
        })?
    } else {
        db.set_order_status(id, req.status)?
    };

    Ok(Json(serde_json::json!({ "status": "updated", "order": order })))
}

async fn reap_orders(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let reaped = state.db.lock().await.reap_expired_orders(Utc::now())?;
    Ok(Json(serde_json::json!({ "status": "reaped", "deleted": reaped })))
}
