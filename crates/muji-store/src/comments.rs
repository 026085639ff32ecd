use chrono::Utc;
use muji_shared::constants::ANONYMOUS_AUTHOR;
use rusqlite::params;

use crate::database::{decode_ts, encode_ts, Database};
use crate::error::{Result, StoreError};
use crate::models::{Comment, CommentId, ListingId};

impl Database {
    /// Add a comment under a listing. A blank author is stored as
    /// [`ANONYMOUS_AUTHOR`].
    pub fn add_comment(
        &self,
        listing_id: ListingId,
        author: Option<&str>,
        text: &str,
    ) -> Result<CommentId> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StoreError::Validation("comment text is required".into()));
        }
        let author = author
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(ANONYMOUS_AUTHOR);

        self.get_listing(listing_id)?;

        self.conn().execute(
            "INSERT INTO comments (listing_id, author_name, text, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![listing_id, author, text, encode_ts(&Utc::now())],
        )?;
        let id = self.conn().last_insert_rowid();

        tracing::debug!(comment_id = id, listing_id, "comment added");
        Ok(id)
    }

    /// Comments of one listing, newest first.
    pub fn list_comments_for_listing(&self, listing_id: ListingId) -> Result<Vec<Comment>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, listing_id, author_name, text, created_at
             FROM comments WHERE listing_id = ?1
             ORDER BY id DESC",
        )?;
        let rows = stmt.query_map(params![listing_id], row_to_comment)?;

        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }

    /// All comments for moderation, newest first.
    pub fn list_comments(&self) -> Result<Vec<Comment>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, listing_id, author_name, text, created_at
             FROM comments ORDER BY id DESC",
        )?;
        let rows = stmt.query_map([], row_to_comment)?;

        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }

    pub fn delete_comment(&self, id: CommentId) -> Result<bool> {
        let changed = self
            .conn()
            .execute("DELETE FROM comments WHERE id = ?1", params![id])?;
        if changed > 0 {
            tracing::info!(comment_id = id, "comment deleted");
        }
        Ok(changed > 0)
    }
}

fn row_to_comment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        listing_id: row.get(1)?,
        author_name: row.get(2)?,
        text: row.get(3)?,
        created_at: decode_ts(row, 4)?,
    })
}
