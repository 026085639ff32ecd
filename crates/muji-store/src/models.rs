//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so the HTTP layer can
//! hand it straight to the dashboard as JSON.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use muji_shared::{FileKind, IdentityKind, OrderStatus};
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type FileId = i64;
pub type ListingId = i64;
pub type ChatId = i64;
pub type MessageId = i64;
pub type CommentId = i64;
pub type OrderId = i64;
pub type PromocodeId = i64;

// ---------------------------------------------------------------------------
// User / profile
// ---------------------------------------------------------------------------

/// A verified identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Store-assigned id. Never used as an ownership key.
    pub id: UserId,
    /// Telegram user id; the ownership key for files, chats and orders.
    pub external_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub locale: String,
    pub is_premium: bool,
    pub kind: IdentityKind,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

/// Display attributes refreshed on every verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserAttrs {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub locale: Option<String>,
    pub is_premium: bool,
    pub kind: IdentityKind,
}

impl Default for UserAttrs {
    fn default() -> Self {
        Self {
            username: None,
            first_name: None,
            last_name: None,
            locale: None,
            is_premium: false,
            kind: IdentityKind::Telegram,
        }
    }
}

/// Per-user extension record (avatar and bio).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: i64,
    pub user_id: UserId,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Metadata for an uploaded file owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredFile {
    pub id: FileId,
    pub user_id: UserId,
    pub external_owner_id: i64,
    /// Name on disk.
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFile {
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageStats {
    pub file_count: i64,
    pub total_size: i64,
    pub total_size_mb: f64,
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// A catalog card. The dashboard calls these "profiles".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub id: ListingId,
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub nationality: String,
    pub city: String,
    pub travel_cities: Vec<String>,
    pub description: String,
    pub height: Option<u32>,
    pub weight: Option<u32>,
    pub chest: Option<u32>,
    /// Ordered photo URLs; never empty.
    pub photos: Vec<String>,
    pub visible: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewListing {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub nationality: String,
    pub city: String,
    pub travel_cities: Vec<String>,
    pub description: String,
    pub height: Option<u32>,
    pub weight: Option<u32>,
    pub chest: Option<u32>,
    pub photos: Vec<String>,
}

// ---------------------------------------------------------------------------
// Chat / message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chat {
    pub id: ChatId,
    pub listing_id: ListingId,
    /// Listing name at the time the chat was opened.
    pub listing_name: String,
    /// `None` for anonymous chats.
    pub owner_external_id: Option<i64>,
    pub last_read_message_id: MessageId,
    pub created_at: DateTime<Utc>,
}

/// A chat plus the counters the dashboard list needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSummary {
    #[serde(flatten)]
    pub chat: Chat,
    pub message_count: i64,
    /// User messages newer than `last_read_message_id`.
    pub unread_count: i64,
    pub last_message_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub is_from_user: bool,
    pub is_system: bool,
    pub text: Option<String>,
    pub file_url: Option<String>,
    pub file_type: Option<FileKind>,
    pub file_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for [`Database::add_message`](crate::Database::add_message).
///
/// Text and attachment may both be present.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub is_from_user: bool,
    pub is_system: bool,
    pub text: Option<String>,
    pub file_url: Option<String>,
    pub file_type: Option<FileKind>,
    pub file_name: Option<String>,
}

impl NewMessage {
    pub fn from_user(text: impl Into<String>) -> Self {
        Self {
            is_from_user: true,
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn from_admin(text: Option<String>) -> Self {
        Self {
            text,
            ..Self::default()
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            is_system: true,
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_file(mut self, url: String, name: String) -> Self {
        self.file_type = Some(FileKind::from_filename(&name));
        self.file_url = Some(url);
        self.file_name = Some(name);
        self
    }
}

// ---------------------------------------------------------------------------
// Comment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: CommentId,
    pub listing_id: ListingId,
    pub author_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Promocode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Promocode {
    pub id: PromocodeId,
    /// Always upper-case.
    pub code: String,
    /// Percent, 1..=100.
    pub discount: u32,
    pub is_active: bool,
    /// External ids of users who redeemed the code.
    pub redeemers: Vec<i64>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub listing_id: ListingId,
    pub owner_external_id: Option<i64>,
    pub amount: f64,
    pub bonus_amount: f64,
    pub total_amount: f64,
    /// Payment network tag (e.g. `trc20`).
    pub method: String,
    pub currency: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub listing_id: ListingId,
    pub owner_external_id: Option<i64>,
    pub amount: f64,
    pub bonus_amount: f64,
    pub method: String,
    pub currency: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewOrder {
    /// Total charged: the amount plus the bonus.
    pub fn total_amount(&self) -> f64 {
        self.amount + self.bonus_amount
    }
}

/// Mutable fields of an unpaid order.
#[derive(Debug, Clone)]
pub struct OrderUpdate {
    pub amount: f64,
    pub bonus_amount: f64,
    pub method: String,
    pub currency: String,
    pub expires_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Settings document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Banner {
    pub text: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub link_text: String,
    #[serde(default)]
    pub visible: bool,
}

impl Default for Banner {
    fn default() -> Self {
        Self {
            text: "Special Offer: 15% discount with promo code WELCOME15".to_string(),
            link: "https://t.me/yourchannel".to_string(),
            link_text: "Join Channel".to_string(),
            visible: true,
        }
    }
}

/// Network tag → receiving address.
pub type WalletAddresses = BTreeMap<String, String>;

pub fn default_wallets() -> WalletAddresses {
    [
        ("trc20", "TY76gU8J9o8j7U6tY5r4E3W2Q1"),
        ("erc20", "0x8a9C6e5D8b0E2a1F3c4B6E7D8C9A0B1C2D3E4F5"),
        ("bnb", "bnb1q3e5r7t9y1u3i5o7p9l1k3j5h7g9f2d4s6q8w0"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Listing card copied into a catalog preview.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PreviewProfile {
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VipCatalog {
    pub name: String,
    pub price: f64,
    pub redirect_url: String,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub preview_count: u32,
    #[serde(default)]
    pub preview_profiles: Vec<PreviewProfile>,
}

/// Catalog tier → configuration.
pub type VipCatalogs = BTreeMap<String, VipCatalog>;

pub fn default_vip_catalogs() -> VipCatalogs {
    [
        ("vip", "VIP Catalog", 100.0, "https://t.me/vip_channel"),
        ("extra_vip", "Extra VIP", 200.0, "https://t.me/extra_vip_channel"),
        ("secret", "Secret Catalog", 300.0, "https://t.me/secret_channel"),
    ]
    .into_iter()
    .map(|(tier, name, price, url)| {
        (
            tier.to_string(),
            VipCatalog {
                name: name.to_string(),
                price,
                redirect_url: url.to_string(),
                visible: true,
                preview_count: 0,
                preview_profiles: Vec::new(),
            },
        )
    })
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub banner: Banner,
    pub crypto_wallets: WalletAddresses,
    pub vip_catalogs: VipCatalogs,
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DatabaseStats {
    pub users_count: i64,
    pub files_count: i64,
    pub storage_bytes: i64,
    pub profiles_count: i64,
    pub visible_profiles_count: i64,
    pub chats_count: i64,
    pub messages_count: i64,
    pub unread_messages_count: i64,
    pub orders_count: i64,
    pub unpaid_orders_count: i64,
    pub comments_count: i64,
    pub promocodes_count: i64,
}
