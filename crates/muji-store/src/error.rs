use muji_shared::OrderStatus;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON column could not be encoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The record does not exist, or exists under a different owner.
    #[error("Record not found")]
    NotFound,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// External identity keys must be positive integers.
    #[error("Invalid identity key: {0}")]
    InvalidIdentity(i64),

    /// The internal user id does not carry the claimed external identity.
    #[error("Owner does not match the stated identity")]
    OwnershipMismatch,

    /// A promocode with the same normalized code already exists.
    #[error("Promocode already exists: {0}")]
    DuplicateCode(String),

    /// The identity already redeemed this promocode.
    #[error("Promocode already redeemed")]
    AlreadyRedeemed,

    /// The order cannot move between these states.
    #[error("Order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Input rejected before touching storage.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
