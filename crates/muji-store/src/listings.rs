//! Catalog listings and their cascade delete.

use chrono::Utc;
use rusqlite::params;

use crate::database::{decode_json, decode_ts, encode_ts, not_found, Database};
use crate::error::{Result, StoreError};
use crate::models::{Listing, ListingId, NewListing};

const LISTING_COLUMNS: &str = "id, name, age, gender, nationality, city, travel_cities, \
                               description, height, weight, chest, photos, visible, created_at";

impl Database {
    /// Insert a listing with id `max(id) + 1`, or `1` on an empty table.
    ///
    /// The id is computed inside the inserting transaction so two writers
    /// cannot pick the same value.
    pub fn create_listing(&mut self, listing: &NewListing) -> Result<Listing> {
        let name = listing.name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("listing name is required".into()));
        }
        if listing.photos.is_empty() {
            return Err(StoreError::Validation(
                "a listing needs at least one photo".into(),
            ));
        }

        let travel_cities = serde_json::to_string(&listing.travel_cities)?;
        let photos = serde_json::to_string(&listing.photos)?;
        let now = encode_ts(&Utc::now());

        let tx = self.conn_mut().transaction()?;
        let id: ListingId =
            tx.query_row("SELECT COALESCE(MAX(id), 0) + 1 FROM listings", [], |row| {
                row.get(0)
            })?;
        tx.execute(
            "INSERT INTO listings (id, name, age, gender, nationality, city, travel_cities,
                                   description, height, weight, chest, photos, visible,
                                   created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 1, ?13)",
            params![
                id,
                name,
                listing.age,
                listing.gender,
                listing.nationality,
                listing.city,
                travel_cities,
                listing.description,
                listing.height,
                listing.weight,
                listing.chest,
                photos,
                now,
            ],
        )?;
        tx.commit()?;

        tracing::info!(listing_id = id, name, photos = listing.photos.len(), "listing created");
        self.get_listing(id)
    }

    pub fn get_listing(&self, id: ListingId) -> Result<Listing> {
        self.conn()
            .query_row(
                &format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = ?1"),
                params![id],
                row_to_listing,
            )
            .map_err(not_found)
    }

    /// Every listing, hidden ones included, ordered by id.
    pub fn list_listings(&self) -> Result<Vec<Listing>> {
        self.query_listings(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings ORDER BY id ASC"
        ))
    }

    /// Listings shown in the public catalog.
    pub fn list_visible_listings(&self) -> Result<Vec<Listing>> {
        self.query_listings(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE visible = 1 ORDER BY id ASC"
        ))
    }

    fn query_listings(&self, sql: &str) -> Result<Vec<Listing>> {
        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map([], row_to_listing)?;

        let mut listings = Vec::new();
        for row in rows {
            listings.push(row?);
        }
        Ok(listings)
    }

    /// Returns `false` when the listing does not exist.
    pub fn set_listing_visible(&self, id: ListingId, visible: bool) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE listings SET visible = ?1 WHERE id = ?2",
            params![visible, id],
        )?;
        if changed > 0 {
            tracing::debug!(listing_id = id, visible, "listing visibility changed");
        }
        Ok(changed > 0)
    }

    /// Rename a listing. Chats keep the name they were opened with.
    pub fn rename_listing(&self, id: ListingId, name: &str) -> Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("listing name is required".into()));
        }
        let changed = self.conn().execute(
            "UPDATE listings SET name = ?1 WHERE id = ?2",
            params![name, id],
        )?;
        Ok(changed > 0)
    }

    /// Delete a listing together with its chats, their messages, its
    /// comments and its orders.
    ///
    /// All rows go in one transaction; on any error nothing is removed.
    pub fn delete_listing(&mut self, id: ListingId) -> Result<bool> {
        let tx = self.conn_mut().transaction()?;

        let messages = tx.execute(
            "DELETE FROM messages
             WHERE chat_id IN (SELECT id FROM chats WHERE listing_id = ?1)",
            params![id],
        )?;
        let chats = tx.execute("DELETE FROM chats WHERE listing_id = ?1", params![id])?;
        let comments = tx.execute("DELETE FROM comments WHERE listing_id = ?1", params![id])?;
        let orders = tx.execute("DELETE FROM orders WHERE listing_id = ?1", params![id])?;
        let listings = tx.execute("DELETE FROM listings WHERE id = ?1", params![id])?;

        tx.commit()?;

        if listings > 0 {
            tracing::info!(
                listing_id = id,
                chats,
                messages,
                comments,
                orders,
                "listing deleted"
            );
        }
        Ok(listings > 0)
    }
}

fn row_to_listing(row: &rusqlite::Row<'_>) -> rusqlite::Result<Listing> {
    Ok(Listing {
        id: row.get(0)?,
        name: row.get(1)?,
        age: row.get(2)?,
        gender: row.get(3)?,
        nationality: row.get(4)?,
        city: row.get(5)?,
        travel_cities: decode_json(row, 6)?,
        description: row.get(7)?,
        height: row.get(8)?,
        weight: row.get(9)?,
        chest: row.get(10)?,
        photos: decode_json(row, 11)?,
        visible: row.get(12)?,
        created_at: decode_ts(row, 13)?,
    })
}
