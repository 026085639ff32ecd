//! Per-user file metadata.
//!
//! Every lookup is scoped by the owner's external identity, so a file that
//! exists under another owner is indistinguishable from a missing one.

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::database::{decode_ts, encode_ts, not_found, Database};
use crate::error::{Result, StoreError};
use crate::models::{FileId, NewFile, StorageStats, StoredFile, UserId};

const FILE_COLUMNS: &str = "id, user_id, external_owner_id, filename, original_filename, \
                            file_path, file_size, mime_type, uploaded_at";

/// Removes the blob behind a file record once its metadata is gone.
pub trait BlobCleanup {
    fn remove_blob(&self, path: &str) -> std::io::Result<()>;
}

/// Deletes blobs straight from the local filesystem.
pub struct FsBlobCleanup;

impl BlobCleanup for FsBlobCleanup {
    fn remove_blob(&self, path: &str) -> std::io::Result<()> {
        match std::fs::remove_file(Path::new(path)) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

impl Database {
    /// Record an uploaded file for `owner_id`.
    ///
    /// The user row must carry `external_owner_id`, otherwise the insert is
    /// refused with [`StoreError::OwnershipMismatch`].
    pub fn add_file(
        &self,
        owner_id: UserId,
        external_owner_id: i64,
        file: &NewFile,
    ) -> Result<FileId> {
        if external_owner_id <= 0 {
            return Err(StoreError::InvalidIdentity(external_owner_id));
        }

        let actual: Option<i64> = self
            .conn()
            .query_row(
                "SELECT external_id FROM users WHERE id = ?1",
                params![owner_id],
                |row| row.get(0),
            )
            .optional()?;
        if actual != Some(external_owner_id) {
            tracing::warn!(
                owner_id,
                external_owner_id,
                "file owner does not match the stated identity"
            );
            return Err(StoreError::OwnershipMismatch);
        }

        self.conn().execute(
            "INSERT INTO files (user_id, external_owner_id, filename, original_filename,
                                file_path, file_size, mime_type, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                owner_id,
                external_owner_id,
                file.filename,
                file.original_filename,
                file.file_path,
                file.file_size,
                file.mime_type,
                encode_ts(&Utc::now()),
            ],
        )?;
        let id = self.conn().last_insert_rowid();

        tracing::debug!(file_id = id, owner_id, size = file.file_size, "file recorded");
        Ok(id)
    }

    pub fn get_file(&self, file_id: FileId, external_owner_id: i64) -> Result<StoredFile> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {FILE_COLUMNS} FROM files WHERE id = ?1 AND external_owner_id = ?2"
                ),
                params![file_id, external_owner_id],
                row_to_file,
            )
            .map_err(not_found)
    }

    pub fn get_file_by_filename(
        &self,
        filename: &str,
        external_owner_id: i64,
    ) -> Result<StoredFile> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {FILE_COLUMNS} FROM files
                     WHERE filename = ?1 AND external_owner_id = ?2"
                ),
                params![filename, external_owner_id],
                row_to_file,
            )
            .map_err(not_found)
    }

    /// All files of one owner, newest first.
    pub fn list_user_files(&self, external_owner_id: i64) -> Result<Vec<StoredFile>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE external_owner_id = ?1
             ORDER BY uploaded_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![external_owner_id], row_to_file)?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    /// Delete a file record and then its blob.
    ///
    /// Returns `false` when the owner has no such file. The metadata delete
    /// is authoritative: a failing blob removal is logged and swallowed.
    pub fn delete_file(
        &mut self,
        file_id: FileId,
        external_owner_id: i64,
        cleanup: &dyn BlobCleanup,
    ) -> Result<bool> {
        self.delete_file_where("id = ?1", &file_id, external_owner_id, cleanup)
    }

    pub fn delete_file_by_filename(
        &mut self,
        filename: &str,
        external_owner_id: i64,
        cleanup: &dyn BlobCleanup,
    ) -> Result<bool> {
        self.delete_file_where("filename = ?1", &filename, external_owner_id, cleanup)
    }

    fn delete_file_where(
        &mut self,
        predicate: &str,
        key: &dyn rusqlite::ToSql,
        external_owner_id: i64,
        cleanup: &dyn BlobCleanup,
    ) -> Result<bool> {
        let tx = self.conn_mut().transaction()?;
        let found: Option<(FileId, String)> = tx
            .query_row(
                &format!(
                    "SELECT id, file_path FROM files WHERE {predicate} AND external_owner_id = ?2"
                ),
                params![key, external_owner_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((file_id, path)) = found else {
            return Ok(false);
        };
        tx.execute("DELETE FROM files WHERE id = ?1", params![file_id])?;
        tx.commit()?;

        if let Err(e) = cleanup.remove_blob(&path) {
            tracing::warn!(file_id, path = %path, error = %e, "failed to remove blob");
        }

        tracing::info!(file_id, external_owner_id, "file deleted");
        Ok(true)
    }

    pub fn user_storage_stats(&self, external_owner_id: i64) -> Result<StorageStats> {
        let (file_count, total_size): (i64, i64) = self.conn().query_row(
            "SELECT COUNT(*), COALESCE(SUM(file_size), 0)
             FROM files WHERE external_owner_id = ?1",
            params![external_owner_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let total_size_mb = (total_size as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;
        Ok(StorageStats {
            file_count,
            total_size,
            total_size_mb,
        })
    }
}

fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredFile> {
    Ok(StoredFile {
        id: row.get(0)?,
        user_id: row.get(1)?,
        external_owner_id: row.get(2)?,
        filename: row.get(3)?,
        original_filename: row.get(4)?,
        file_path: row.get(5)?,
        file_size: row.get(6)?,
        mime_type: row.get(7)?,
        uploaded_at: decode_ts(row, 8)?,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::models::UserAttrs;

    struct RecordingCleanup {
        removed: RefCell<Vec<String>>,
        fail: bool,
    }

    impl RecordingCleanup {
        fn new(fail: bool) -> Self {
            Self {
                removed: RefCell::new(Vec::new()),
                fail,
            }
        }
    }

    impl BlobCleanup for RecordingCleanup {
        fn remove_blob(&self, path: &str) -> std::io::Result<()> {
            self.removed.borrow_mut().push(path.to_string());
            if self.fail {
                Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"))
            } else {
                Ok(())
            }
        }
    }

    fn new_file(name: &str, size: i64) -> NewFile {
        NewFile {
            filename: name.to_string(),
            original_filename: format!("orig-{name}"),
            file_path: format!("/tmp/uploads/{name}"),
            file_size: size,
            mime_type: Some("image/png".into()),
        }
    }

    fn setup() -> (Database, UserId, UserId) {
        let mut db = Database::open_in_memory().unwrap();
        let a = db.upsert_user(100, &UserAttrs::default()).unwrap();
        let b = db.upsert_user(200, &UserAttrs::default()).unwrap();
        (db, a.id, b.id)
    }

    #[test]
    fn owner_mismatch_is_rejected() {
        let (db, a, _) = setup();
        assert!(matches!(
            db.add_file(a, 200, &new_file("x.png", 1)),
            Err(StoreError::OwnershipMismatch)
        ));
        assert!(matches!(
            db.add_file(999, 100, &new_file("x.png", 1)),
            Err(StoreError::OwnershipMismatch)
        ));
    }

    #[test]
    fn files_are_isolated_per_owner() {
        let (mut db, a, b) = setup();
        let fa = db.add_file(a, 100, &new_file("a.png", 10)).unwrap();
        let fb = db.add_file(b, 200, &new_file("b.png", 20)).unwrap();

        assert_eq!(db.get_file(fa, 100).unwrap().filename, "a.png");
        assert!(matches!(db.get_file(fa, 200), Err(StoreError::NotFound)));
        assert!(matches!(
            db.get_file_by_filename("b.png", 100),
            Err(StoreError::NotFound)
        ));

        let listed: Vec<_> = db.list_user_files(100).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, fa);

        let cleanup = RecordingCleanup::new(false);
        assert!(!db.delete_file(fb, 100, &cleanup).unwrap());
        assert!(cleanup.removed.borrow().is_empty());
        assert!(db.get_file(fb, 200).is_ok());
    }

    #[test]
    fn list_is_newest_first() {
        let (db, a, _) = setup();
        let first = db.add_file(a, 100, &new_file("1.png", 1)).unwrap();
        let second = db.add_file(a, 100, &new_file("2.png", 1)).unwrap();

        let ids: Vec<_> = db.list_user_files(100).unwrap().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn delete_removes_metadata_and_blob() {
        let (mut db, a, _) = setup();
        let id = db.add_file(a, 100, &new_file("a.png", 10)).unwrap();

        let cleanup = RecordingCleanup::new(false);
        assert!(db.delete_file(id, 100, &cleanup).unwrap());
        assert_eq!(*cleanup.removed.borrow(), vec!["/tmp/uploads/a.png".to_string()]);
        assert!(matches!(db.get_file(id, 100), Err(StoreError::NotFound)));
    }

    #[test]
    fn failed_blob_cleanup_still_deletes_record() {
        let (mut db, a, _) = setup();
        db.add_file(a, 100, &new_file("a.png", 10)).unwrap();

        let cleanup = RecordingCleanup::new(true);
        assert!(db.delete_file_by_filename("a.png", 100, &cleanup).unwrap());
        assert!(db.list_user_files(100).unwrap().is_empty());
    }

    #[test]
    fn storage_stats_sum_sizes() {
        let (db, a, b) = setup();
        db.add_file(a, 100, &new_file("a.png", 1024 * 1024)).unwrap();
        db.add_file(a, 100, &new_file("b.png", 512 * 1024)).unwrap();
        db.add_file(b, 200, &new_file("c.png", 7)).unwrap();

        let stats = db.user_storage_stats(100).unwrap();
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.total_size, 1024 * 1024 + 512 * 1024);
        assert_eq!(stats.total_size_mb, 1.5);

        let empty = db.user_storage_stats(300).unwrap();
        assert_eq!(empty.file_count, 0);
        assert_eq!(empty.total_size, 0);
    }

    #[test]
    fn fs_cleanup_ignores_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, b"data").unwrap();

        let path = path.to_string_lossy().to_string();
        FsBlobCleanup.remove_blob(&path).unwrap();
        FsBlobCleanup.remove_blob(&path).unwrap();
    }
}
