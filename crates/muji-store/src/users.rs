//! CRUD operations for [`User`] and [`Profile`] records.

use chrono::Utc;
use muji_shared::constants::DEFAULT_LOCALE;
use rusqlite::{params, OptionalExtension};

use crate::database::{decode_enum, decode_ts, encode_ts, not_found, Database};
use crate::error::{Result, StoreError};
use crate::models::{Profile, User, UserAttrs, UserId};

const USER_COLUMNS: &str = "id, external_id, username, first_name, last_name, locale, \
                            is_premium, kind, created_at, last_login";

impl Database {
    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Create the user on first sight, otherwise refresh its display
    /// attributes and `last_login`.
    ///
    /// A new user gets its profile row in the same transaction.
    pub fn upsert_user(&mut self, external_id: i64, attrs: &UserAttrs) -> Result<User> {
        if external_id <= 0 {
            return Err(StoreError::InvalidIdentity(external_id));
        }

        let now = encode_ts(&Utc::now());
        let locale = attrs.locale.as_deref().unwrap_or(DEFAULT_LOCALE);

        let tx = self.conn_mut().transaction()?;
        let existing: Option<UserId> = tx
            .query_row(
                "SELECT id FROM users WHERE external_id = ?1",
                params![external_id],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE users
                     SET username = ?1, first_name = ?2, last_name = ?3, locale = ?4,
                         is_premium = ?5, last_login = ?6
                     WHERE id = ?7",
                    params![
                        attrs.username,
                        attrs.first_name,
                        attrs.last_name,
                        locale,
                        attrs.is_premium,
                        now,
                        id,
                    ],
                )?;
                tracing::debug!(user_id = id, external_id, "user logged in");
            }
            None => {
                tx.execute(
                    "INSERT INTO users (external_id, username, first_name, last_name, locale,
                                        is_premium, kind, created_at, last_login)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                    params![
                        external_id,
                        attrs.username,
                        attrs.first_name,
                        attrs.last_name,
                        locale,
                        attrs.is_premium,
                        attrs.kind.as_str(),
                        now,
                    ],
                )?;
                let id = tx.last_insert_rowid();
                tx.execute(
                    "INSERT INTO profiles (user_id, created_at, updated_at) VALUES (?1, ?2, ?2)",
                    params![id, now],
                )?;
                tracing::info!(user_id = id, external_id, kind = %attrs.kind, "new user created");
            }
        }
        tx.commit()?;

        self.get_user_by_external_id(external_id)?
            .ok_or(StoreError::NotFound)
    }

    pub fn get_user_by_external_id(&self, external_id: i64) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE external_id = ?1"),
                params![external_id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                row_to_user,
            )
            .map_err(not_found)
    }

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    /// Fetch the profile of `user_id`, creating an empty one if the user
    /// predates profile creation.
    pub fn get_profile(&self, user_id: UserId) -> Result<Profile> {
        // Fails with NotFound before the insert could trip the foreign key.
        self.get_user(user_id)?;

        let now = encode_ts(&Utc::now());
        self.conn().execute(
            "INSERT OR IGNORE INTO profiles (user_id, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![user_id, now],
        )?;

        let profile = self.conn().query_row(
            "SELECT id, user_id, avatar, bio, created_at, updated_at
             FROM profiles WHERE user_id = ?1",
            params![user_id],
            row_to_profile,
        )?;
        Ok(profile)
    }

    /// Update avatar and/or bio. `None` leaves a field unchanged.
    pub fn update_profile(
        &self,
        user_id: UserId,
        avatar: Option<&str>,
        bio: Option<&str>,
    ) -> Result<Profile> {
        self.get_profile(user_id)?;

        self.conn().execute(
            "UPDATE profiles
             SET avatar = COALESCE(?1, avatar), bio = COALESCE(?2, bio), updated_at = ?3
             WHERE user_id = ?4",
            params![avatar, bio, encode_ts(&Utc::now()), user_id],
        )?;

        self.get_profile(user_id)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        external_id: row.get(1)?,
        username: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        locale: row.get(5)?,
        is_premium: row.get(6)?,
        kind: decode_enum(row, 7)?,
        created_at: decode_ts(row, 8)?,
        last_login: decode_ts(row, 9)?,
    })
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        user_id: row.get(1)?,
        avatar: row.get(2)?,
        bio: row.get(3)?,
        created_at: decode_ts(row, 4)?,
        updated_at: decode_ts(row, 5)?,
    })
}
