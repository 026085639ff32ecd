//! # muji-store
//!
//! Persistent storage for the Muji back-office, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed operations for every domain
//! model. Ownership-scoped lookups take the caller's external identity and
//! treat records owned by someone else as missing. Multi-table deletes run
//! in one transaction.

pub mod chats;
pub mod comments;
pub mod database;
pub mod files;
pub mod listings;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod orders;
pub mod promocodes;
pub mod settings;
pub mod stats;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use files::{BlobCleanup, FsBlobCleanup};
pub use models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listings::tests::sample;

    /// Listing → chat → messages → delete leaves nothing behind.
    #[test]
    fn listing_lifecycle_end_to_end() {
        let mut db = Database::open_in_memory().unwrap();
        let user = db.upsert_user(500, &UserAttrs::default()).unwrap();

        let listing = db.create_listing(&sample("Alice")).unwrap();
        let chat = db
            .get_or_create_chat(listing.id, Some(user.external_id))
            .unwrap();
        db.add_message(chat.id, &NewMessage::from_user("hello"))
            .unwrap();
        db.add_message(chat.id, &NewMessage::system("Payment received"))
            .unwrap();
        db.add_comment(listing.id, Some("Ann"), "great").unwrap();
        assert_eq!(db.get_chat_messages(chat.id).unwrap().len(), 2);

        assert!(db.delete_listing(listing.id).unwrap());

        assert!(matches!(db.get_listing(listing.id), Err(StoreError::NotFound)));
        assert!(db.find_chat(listing.id, Some(500)).unwrap().is_none());
        assert!(db.list_chats_for_owner(Some(500)).unwrap().is_empty());
        assert!(db.get_chat_messages(chat.id).unwrap().is_empty());
        assert!(db.list_comments().unwrap().is_empty());

        let stats = db.stats().unwrap();
        assert_eq!(stats.profiles_count, 0);
        assert_eq!(stats.chats_count, 0);
        assert_eq!(stats.messages_count, 0);
        assert_eq!(stats.users_count, 1);
    }

    /// Same lifecycle for an anonymous visitor's chat.
    #[test]
    fn anonymous_chat_lifecycle_end_to_end() {
        let mut db = Database::open_in_memory().unwrap();
        let listing = db.create_listing(&sample("Alice")).unwrap();

        let chat = db.get_or_create_chat(listing.id, None).unwrap();
        assert!(chat.owner_external_id.is_none());
        db.add_message(chat.id, &NewMessage::from_user("anyone there?"))
            .unwrap();
        db.add_message(chat.id, &NewMessage::from_admin(Some("yes".into())))
            .unwrap();
        assert_eq!(db.get_chat_messages(chat.id).unwrap().len(), 2);
        assert_eq!(db.get_or_create_chat(listing.id, None).unwrap().id, chat.id);

        assert!(db.delete_listing(listing.id).unwrap());

        assert!(db.find_chat(listing.id, None).unwrap().is_none());
        assert!(db.list_chats_for_owner(None).unwrap().is_empty());
        assert!(db.get_chat_messages(chat.id).unwrap().is_empty());
        assert_eq!(db.stats().unwrap().messages_count, 0);
    }
}
