//! Chats: one message thread per (listing, owner) pair.
//!
//! A `None` owner is an anonymous visitor and forms its own group: there is
//! at most one anonymous chat per listing.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::{decode_opt_ts, decode_ts, encode_ts, not_found, Database};
use crate::error::{Result, StoreError};
use crate::models::{Chat, ChatId, ChatSummary, ListingId, MessageId};

const CHAT_COLUMNS: &str =
    "c.id, c.listing_id, c.listing_name, c.owner_external_id, c.last_read_message_id, c.created_at";

fn check_owner(owner: Option<i64>) -> Result<()> {
    match owner {
        Some(id) if id <= 0 => Err(StoreError::InvalidIdentity(id)),
        _ => Ok(()),
    }
}

impl Database {
    /// Return the chat for `(listing_id, owner)`, opening it if needed.
    ///
    /// A new chat snapshots the listing's current name.
    pub fn get_or_create_chat(&mut self, listing_id: ListingId, owner: Option<i64>) -> Result<Chat> {
        let tx = self.conn_mut().transaction()?;
        let chat = open_chat(&tx, listing_id, owner)?;
        tx.commit()?;
        Ok(chat)
    }

    pub fn find_chat(&self, listing_id: ListingId, owner: Option<i64>) -> Result<Option<Chat>> {
        select_chat(self.conn(), listing_id, owner)
    }

    pub fn get_chat(&self, id: ChatId) -> Result<Chat> {
        self.conn()
            .query_row(
                &format!("SELECT {CHAT_COLUMNS} FROM chats c WHERE c.id = ?1"),
                params![id],
                row_to_chat,
            )
            .map_err(not_found)
    }

    /// Chats belonging to one owner (`None` selects anonymous chats).
    pub fn list_chats_for_owner(&self, owner: Option<i64>) -> Result<Vec<Chat>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats c
             WHERE c.owner_external_id IS ?1
             ORDER BY c.id ASC"
        ))?;
        let rows = stmt.query_map(params![owner], row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }

    /// Every chat with its message counters, most recently active first.
    pub fn list_chat_summaries(&self) -> Result<Vec<ChatSummary>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CHAT_COLUMNS},
                    COUNT(m.id),
                    COALESCE(SUM(CASE WHEN m.is_from_user = 1
                                       AND m.id > c.last_read_message_id
                                      THEN 1 ELSE 0 END), 0),
                    MAX(m.created_at)
             FROM chats c
             LEFT JOIN messages m ON m.chat_id = c.id
             GROUP BY c.id
             ORDER BY MAX(m.created_at) IS NULL, MAX(m.created_at) DESC, c.id DESC"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(ChatSummary {
                chat: row_to_chat(row)?,
                message_count: row.get(6)?,
                unread_count: row.get(7)?,
                last_message_at: decode_opt_ts(row, 8)?,
            })
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }

    /// Advance the read marker. The marker never moves backwards.
    pub fn mark_chat_read(&self, chat_id: ChatId, message_id: MessageId) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE chats SET last_read_message_id = MAX(last_read_message_id, ?1)
             WHERE id = ?2",
            params![message_id, chat_id],
        )?;
        Ok(changed > 0)
    }
}

/// Find or insert the chat for `(listing_id, owner)` on `conn`, which may be
/// an open transaction.
pub(crate) fn open_chat(conn: &Connection, listing_id: ListingId, owner: Option<i64>) -> Result<Chat> {
    check_owner(owner)?;

    let listing_name: String = conn
        .query_row(
            "SELECT name FROM listings WHERE id = ?1",
            params![listing_id],
            |row| row.get(0),
        )
        .map_err(not_found)?;

    let inserted = conn.execute(
        "INSERT OR IGNORE INTO chats (listing_id, listing_name, owner_external_id,
                                      last_read_message_id, created_at)
         VALUES (?1, ?2, ?3, 0, ?4)",
        params![listing_id, listing_name, owner, encode_ts(&Utc::now())],
    )?;
    if inserted > 0 {
        tracing::info!(listing_id, owner = ?owner, "chat opened");
    }

    select_chat(conn, listing_id, owner)?.ok_or(StoreError::NotFound)
}

fn select_chat(conn: &Connection, listing_id: ListingId, owner: Option<i64>) -> Result<Option<Chat>> {
    let chat = conn
        .query_row(
            &format!(
                "SELECT {CHAT_COLUMNS} FROM chats c
                 WHERE c.listing_id = ?1 AND c.owner_external_id IS ?2"
            ),
            params![listing_id, owner],
            row_to_chat,
        )
        .optional()?;
    Ok(chat)
}

pub(crate) fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        listing_id: row.get(1)?,
        listing_name: row.get(2)?,
        owner_external_id: row.get(3)?,
        last_read_message_id: row.get(4)?,
        created_at: decode_ts(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listings::tests::sample;
    use crate::models::NewMessage;

    fn with_listing() -> (Database, ListingId) {
        let mut db = Database::open_in_memory().unwrap();
        let listing = db.create_listing(&sample("Alice")).unwrap();
        (db, listing.id)
    }

    #[test]
    fn one_chat_per_listing_and_owner() {
        let (mut db, listing) = with_listing();

        let a = db.get_or_create_chat(listing, Some(10)).unwrap();
        let again = db.get_or_create_chat(listing, Some(10)).unwrap();
        let b = db.get_or_create_chat(listing, Some(20)).unwrap();

        assert_eq!(a.id, again.id);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn anonymous_chat_is_unique_too() {
        let (mut db, listing) = with_listing();

        let anon = db.get_or_create_chat(listing, None).unwrap();
        let again = db.get_or_create_chat(listing, None).unwrap();
        assert_eq!(anon.id, again.id);
        assert!(anon.owner_external_id.is_none());

        let owned = db.get_or_create_chat(listing, Some(10)).unwrap();
        assert_ne!(anon.id, owned.id);
        assert_eq!(db.find_chat(listing, None).unwrap().unwrap().id, anon.id);
        assert_eq!(db.list_chats_for_owner(None).unwrap().len(), 1);
    }

    #[test]
    fn unknown_listing_and_bad_owner() {
        let (mut db, listing) = with_listing();
        assert!(matches!(
            db.get_or_create_chat(999, Some(1)),
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            db.get_or_create_chat(listing, Some(0)),
            Err(StoreError::InvalidIdentity(0))
        ));
    }

    #[test]
    fn snapshot_name_survives_rename() {
        let (mut db, listing) = with_listing();
        let chat = db.get_or_create_chat(listing, Some(10)).unwrap();

        assert!(db.rename_listing(listing, "Alicia").unwrap());
        assert_eq!(db.get_listing(listing).unwrap().name, "Alicia");
        assert_eq!(db.get_chat(chat.id).unwrap().listing_name, "Alice");
    }

    #[test]
    fn summaries_count_unread_user_messages() {
        let (mut db, listing) = with_listing();
        let chat = db.get_or_create_chat(listing, Some(10)).unwrap();
        let idle = db.get_or_create_chat(listing, Some(20)).unwrap();

        let first = db.add_message(chat.id, &NewMessage::from_user("hi")).unwrap();
        db.add_message(chat.id, &NewMessage::from_admin(Some("hello".into())))
            .unwrap();
        db.add_message(chat.id, &NewMessage::from_user("there?")).unwrap();

        let summaries = db.list_chat_summaries().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].chat.id, chat.id);
        assert_eq!(summaries[0].message_count, 3);
        assert_eq!(summaries[0].unread_count, 2);
        assert!(summaries[0].last_message_at.is_some());
        assert_eq!(summaries[1].chat.id, idle.id);
        assert_eq!(summaries[1].message_count, 0);

        assert!(db.mark_chat_read(chat.id, first).unwrap());
        assert_eq!(db.list_chat_summaries().unwrap()[0].unread_count, 1);
    }

    #[test]
    fn read_marker_is_monotonic() {
        let (mut db, listing) = with_listing();
        let chat = db.get_or_create_chat(listing, Some(10)).unwrap();

        db.mark_chat_read(chat.id, 5).unwrap();
        db.mark_chat_read(chat.id, 3).unwrap();
        assert_eq!(db.get_chat(chat.id).unwrap().last_read_message_id, 5);
        assert!(!db.mark_chat_read(999, 1).unwrap());
    }
}
