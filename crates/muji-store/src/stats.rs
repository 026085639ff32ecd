use crate::database::Database;
use crate::error::Result;
use crate::models::DatabaseStats;

impl Database {
    /// Dashboard counters, computed in a single query.
    pub fn stats(&self) -> Result<DatabaseStats> {
        let stats = self.conn().query_row(
            "SELECT
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM files),
                (SELECT COALESCE(SUM(file_size), 0) FROM files),
                (SELECT COUNT(*) FROM listings),
                (SELECT COUNT(*) FROM listings WHERE visible = 1),
                (SELECT COUNT(*) FROM chats),
                (SELECT COUNT(*) FROM messages),
                (SELECT COUNT(*) FROM messages m JOIN chats c ON c.id = m.chat_id
                  WHERE m.is_from_user = 1 AND m.id > c.last_read_message_id),
                (SELECT COUNT(*) FROM orders),
                (SELECT COUNT(*) FROM orders WHERE status = 'unpaid'),
                (SELECT COUNT(*) FROM comments),
                (SELECT COUNT(*) FROM promocodes)",
            [],
            |row| {
                Ok(DatabaseStats {
                    users_count: row.get(0)?,
                    files_count: row.get(1)?,
                    storage_bytes: row.get(2)?,
                    profiles_count: row.get(3)?,
                    visible_profiles_count: row.get(4)?,
                    chats_count: row.get(5)?,
                    messages_count: row.get(6)?,
                    unread_messages_count: row.get(7)?,
                    orders_count: row.get(8)?,
                    unpaid_orders_count: row.get(9)?,
                    comments_count: row.get(10)?,
                    promocodes_count: row.get(11)?,
                })
            },
        )?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listings::tests::sample;
    use crate::models::{NewMessage, UserAttrs};

    #[test]
    fn empty_store_is_all_zero() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.stats().unwrap(), DatabaseStats::default());
    }

    #[test]
    fn counts_follow_writes() {
        let mut db = Database::open_in_memory().unwrap();
        db.upsert_user(1, &UserAttrs::default()).unwrap();
        let a = db.create_listing(&sample("A")).unwrap();
        db.create_listing(&sample("B")).unwrap();
        db.set_listing_visible(a.id, false).unwrap();
        let chat = db.get_or_create_chat(a.id, Some(1)).unwrap();
        db.add_message(chat.id, &NewMessage::from_user("hi")).unwrap();
        db.add_message(chat.id, &NewMessage::from_admin(Some("yo".into())))
            .unwrap();
        db.add_comment(a.id, None, "c").unwrap();
        db.create_promocode("X", 5).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.users_count, 1);
        assert_eq!(stats.profiles_count, 2);
        assert_eq!(stats.visible_profiles_count, 1);
        assert_eq!(stats.chats_count, 1);
        assert_eq!(stats.messages_count, 2);
        assert_eq!(stats.unread_messages_count, 1);
        assert_eq!(stats.comments_count, 1);
        assert_eq!(stats.promocodes_count, 1);
        assert_eq!(stats.orders_count, 0);
    }
}
