//! Promocodes and their redeemer lists.
//!
//! Codes are normalized to trimmed upper-case on every write and lookup, so
//! `welcome15` and `WELCOME15` are the same code.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::database::{decode_json, decode_ts, encode_ts, not_found, Database};
use crate::error::{Result, StoreError};
use crate::models::{Promocode, PromocodeId};

const PROMOCODE_COLUMNS: &str = "id, code, discount, is_active, redeemers, created_at";

fn normalize(code: &str) -> String {
    code.trim().to_uppercase()
}

impl Database {
    pub fn create_promocode(&mut self, code: &str, discount: u32) -> Result<Promocode> {
        let code = normalize(code);
        if code.is_empty() {
            return Err(StoreError::Validation("promocode is required".into()));
        }
        if !(1..=100).contains(&discount) {
            return Err(StoreError::Validation(format!(
                "discount must be between 1 and 100, got {discount}"
            )));
        }

        let tx = self.conn_mut().transaction()?;
        let exists: Option<PromocodeId> = tx
            .query_row(
                "SELECT id FROM promocodes WHERE code = ?1",
                params![code],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::DuplicateCode(code));
        }

        tx.execute(
            "INSERT INTO promocodes (code, discount, is_active, redeemers, created_at)
             VALUES (?1, ?2, 1, '[]', ?3)",
            params![code, discount, encode_ts(&Utc::now())],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        tracing::info!(promocode_id = id, code = %code, discount, "promocode created");
        self.get_promocode(id)
    }

    pub fn get_promocode(&self, id: PromocodeId) -> Result<Promocode> {
        self.conn()
            .query_row(
                &format!("SELECT {PROMOCODE_COLUMNS} FROM promocodes WHERE id = ?1"),
                params![id],
                row_to_promocode,
            )
            .map_err(not_found)
    }

    /// Look a code up regardless of the case it was typed in.
    pub fn find_promocode(&self, code: &str) -> Result<Option<Promocode>> {
        let promo = self
            .conn()
            .query_row(
                &format!("SELECT {PROMOCODE_COLUMNS} FROM promocodes WHERE code = ?1"),
                params![normalize(code)],
                row_to_promocode,
            )
            .optional()?;
        Ok(promo)
    }

    pub fn list_promocodes(&self) -> Result<Vec<Promocode>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {PROMOCODE_COLUMNS} FROM promocodes ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map([], row_to_promocode)?;

        let mut promos = Vec::new();
        for row in rows {
            promos.push(row?);
        }
        Ok(promos)
    }

    /// Flip `is_active`; returns the new state, `None` if no such code.
    pub fn toggle_promocode(&self, id: PromocodeId) -> Result<Option<bool>> {
        let changed = self.conn().execute(
            "UPDATE promocodes SET is_active = 1 - is_active WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let active = self.get_promocode(id)?.is_active;
        tracing::debug!(promocode_id = id, active, "promocode toggled");
        Ok(Some(active))
    }

    pub fn delete_promocode(&self, id: PromocodeId) -> Result<bool> {
        let changed = self
            .conn()
            .execute("DELETE FROM promocodes WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Record that `external_id` used the code.
    ///
    /// Missing and inactive codes are both [`StoreError::NotFound`]; a second
    /// redemption by the same identity is [`StoreError::AlreadyRedeemed`].
    pub fn redeem_promocode(&mut self, code: &str, external_id: i64) -> Result<Promocode> {
        if external_id <= 0 {
            return Err(StoreError::InvalidIdentity(external_id));
        }
        let code = normalize(code);

        let tx = self.conn_mut().transaction()?;
        let promo = tx
            .query_row(
                &format!(
                    "SELECT {PROMOCODE_COLUMNS} FROM promocodes WHERE code = ?1 AND is_active = 1"
                ),
                params![code],
                row_to_promocode,
            )
            .map_err(not_found)?;

        if promo.redeemers.contains(&external_id) {
            return Err(StoreError::AlreadyRedeemed);
        }

        let mut redeemers = promo.redeemers;
        redeemers.push(external_id);
        tx.execute(
            "UPDATE promocodes SET redeemers = ?1 WHERE id = ?2",
            params![serde_json::to_string(&redeemers)?, promo.id],
        )?;
        tx.commit()?;

        tracing::info!(promocode_id = promo.id, external_id, "promocode redeemed");
        self.get_promocode(promo.id)
    }
}

fn row_to_promocode(row: &rusqlite::Row<'_>) -> rusqlite::Result<Promocode> {
    Ok(Promocode {
        id: row.get(0)?,
        code: row.get(1)?,
        discount: row.get(2)?,
        is_active: row.get(3)?,
        redeemers: decode_json(row, 4)?,
        created_at: decode_ts(row, 5)?,
    })
}
