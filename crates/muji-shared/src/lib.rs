//! # muji-shared
//!
//! Types shared between the store and the HTTP server: identity and order
//! enums, well-known constants, and verification of Telegram Mini App
//! init data.

pub mod constants;
pub mod error;
pub mod telegram;
pub mod types;

pub use error::AuthError;
pub use types::{FileKind, IdentityKind, OrderStatus};
