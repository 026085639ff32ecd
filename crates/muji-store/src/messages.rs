//! CRUD operations for chat [`Message`] records.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::chats::open_chat;
use crate::database::{decode_opt_enum, decode_ts, encode_ts, Database};
use crate::error::{Result, StoreError};
use crate::models::{Chat, ChatId, ListingId, Message, MessageId, NewMessage};

const MESSAGE_COLUMNS: &str =
    "id, chat_id, is_from_user, is_system, text, file_url, file_type, file_name, created_at";

impl Database {
    /// Append a message to a chat and return its id.
    ///
    /// A message must carry text, an attachment, or both.
    pub fn add_message(&self, chat_id: ChatId, message: &NewMessage) -> Result<MessageId> {
        insert_message(self.conn(), chat_id, message)
    }

    /// Open the chat for `(listing_id, owner)` if needed and append every
    /// message to it. Either all messages are stored or none are.
    pub fn post_messages(
        &mut self,
        listing_id: ListingId,
        owner: Option<i64>,
        messages: &[NewMessage],
    ) -> Result<(Chat, Vec<MessageId>)> {
        let tx = self.conn_mut().transaction()?;
        let chat = open_chat(&tx, listing_id, owner)?;
        let mut ids = Vec::with_capacity(messages.len());
        for message in messages {
            ids.push(insert_message(&tx, chat.id, message)?);
        }
        tx.commit()?;
        Ok((chat, ids))
    }

    /// All messages of a chat in insertion order.
    pub fn get_chat_messages(&self, chat_id: ChatId) -> Result<Vec<Message>> {
        self.get_chat_messages_after(chat_id, 0)
    }

    /// Messages with an id greater than `after`, oldest first. Used for
    /// incremental polling.
    pub fn get_chat_messages_after(
        &self,
        chat_id: ChatId,
        after: MessageId,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE chat_id = ?1 AND id > ?2
             ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params![chat_id, after], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Highest message id across all chats, `0` when there are none.
    pub fn last_message_id(&self) -> Result<MessageId> {
        let id = self
            .conn()
            .query_row("SELECT COALESCE(MAX(id), 0) FROM messages", [], |row| {
                row.get(0)
            })?;
        Ok(id)
    }
}

pub(crate) fn insert_message(
    conn: &Connection,
    chat_id: ChatId,
    message: &NewMessage,
) -> Result<MessageId> {
    let text = message
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if text.is_none() && message.file_url.is_none() {
        return Err(StoreError::Validation(
            "a message needs text or an attachment".into(),
        ));
    }

    // Surface a missing chat as NotFound rather than a constraint error.
    let exists: Option<i64> = conn
        .query_row("SELECT id FROM chats WHERE id = ?1", params![chat_id], |row| {
            row.get(0)
        })
        .optional()?;
    if exists.is_none() {
        return Err(StoreError::NotFound);
    }

    conn.execute(
        "INSERT INTO messages (chat_id, is_from_user, is_system, text, file_url,
                               file_type, file_name, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            chat_id,
            message.is_from_user,
            message.is_system,
            text,
            message.file_url,
            message.file_type.map(|k| k.as_str()),
            message.file_name,
            encode_ts(&Utc::now()),
        ],
    )?;
    let id = conn.last_insert_rowid();

    tracing::debug!(
        message_id = id,
        chat_id,
        from_user = message.is_from_user,
        system = message.is_system,
        "message stored"
    );
    Ok(id)
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        is_from_user: row.get(2)?,
        is_system: row.get(3)?,
        text: row.get(4)?,
        file_url: row.get(5)?,
        file_type: decode_opt_enum(row, 6)?,
        file_name: row.get(7)?,
        created_at: decode_ts(row, 8)?,
    })
}

#[cfg(test)]
mod tests {
    use muji_shared::FileKind;

    use super::*;
    use crate::listings::tests::sample;

    fn with_chat() -> (Database, ChatId) {
        let mut db = Database::open_in_memory().unwrap();
        let listing = db.create_listing(&sample("Alice")).unwrap();
        let chat = db.get_or_create_chat(listing.id, Some(10)).unwrap();
        (db, chat.id)
    }

    #[test]
    fn messages_come_back_in_order() {
        let (db, chat) = with_chat();
        let a = db.add_message(chat, &NewMessage::from_user("one")).unwrap();
        let b = db
            .add_message(chat, &NewMessage::from_admin(Some("two".into())))
            .unwrap();
        let c = db.add_message(chat, &NewMessage::system("three")).unwrap();

        let all = db.get_chat_messages(chat).unwrap();
        assert_eq!(all.iter().map(|m| m.id).collect::<Vec<_>>(), vec![a, b, c]);
        assert!(all[0].is_from_user);
        assert!(!all[1].is_from_user && !all[1].is_system);
        assert!(all[2].is_system);

        let newer = db.get_chat_messages_after(chat, a).unwrap();
        assert_eq!(newer.len(), 2);
        assert_eq!(db.last_message_id().unwrap(), c);
    }

    #[test]
    fn text_and_attachment_together() {
        let (db, chat) = with_chat();
        let msg = NewMessage::from_admin(Some("look".into()))
            .with_file("/uploads/x.jpg".into(), "x.jpg".into());
        db.add_message(chat, &msg).unwrap();

        let stored = &db.get_chat_messages(chat).unwrap()[0];
        assert_eq!(stored.text.as_deref(), Some("look"));
        assert_eq!(stored.file_type, Some(FileKind::Image));
        assert_eq!(stored.file_name.as_deref(), Some("x.jpg"));
    }

    #[test]
    fn empty_message_is_rejected() {
        let (db, chat) = with_chat();
        assert!(matches!(
            db.add_message(chat, &NewMessage::from_admin(Some("  ".into()))),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            db.add_message(999, &NewMessage::from_user("hi")),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn last_message_id_on_empty_store() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.last_message_id().unwrap(), 0);
    }

    #[test]
    fn post_messages_opens_chat_and_stores_all() {
        let mut db = Database::open_in_memory().unwrap();
        let listing = db.create_listing(&sample("Alice")).unwrap();

        let batch = [
            NewMessage::from_admin(Some("see".into())).with_file("/uploads/a.png".into(), "a.png".into()),
            NewMessage::from_admin(Some("see".into())).with_file("/uploads/b.mp4".into(), "b.mp4".into()),
        ];
        let (chat, ids) = db.post_messages(listing.id, None, &batch).unwrap();
        assert!(chat.owner_external_id.is_none());
        assert_eq!(ids.len(), 2);
        assert_eq!(db.get_chat_messages(chat.id).unwrap().len(), 2);
    }

    #[test]
    fn post_messages_is_all_or_nothing() {
        let mut db = Database::open_in_memory().unwrap();
        let listing = db.create_listing(&sample("Alice")).unwrap();

        let batch = [
            NewMessage::from_admin(Some("first".into())),
            NewMessage::from_admin(None),
        ];
        assert!(matches!(
            db.post_messages(listing.id, Some(10), &batch),
            Err(StoreError::Validation(_))
        ));
        assert!(db.find_chat(listing.id, Some(10)).unwrap().is_none());
        assert_eq!(db.last_message_id().unwrap(), 0);

        assert!(matches!(
            db.post_messages(999, Some(10), &[NewMessage::from_user("hi")]),
            Err(StoreError::NotFound)
        ));
    }
}
