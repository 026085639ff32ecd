//! Orders and the unpaid-order reaper.

use chrono::{DateTime, Utc};
use muji_shared::constants::DEFAULT_CURRENCY;
use muji_shared::OrderStatus;
use rusqlite::{params, Connection, OptionalExtension};

use crate::chats::open_chat;
use crate::database::{decode_enum, decode_opt_ts, decode_ts, encode_ts, not_found, Database};
use crate::error::{Result, StoreError};
use crate::messages::insert_message;
use crate::models::{ListingId, NewMessage, NewOrder, Order, OrderId, OrderUpdate};

const ORDER_COLUMNS: &str = "id, order_number, listing_id, owner_external_id, amount, \
                             bonus_amount, total_amount, method, currency, status, created_at, \
                             expires_at";

fn check_amounts(amount: f64, bonus_amount: f64) -> Result<()> {
    if !amount.is_finite() || amount < 0.0 || !bonus_amount.is_finite() || bonus_amount < 0.0 {
        return Err(StoreError::Validation(
            "amounts must be non-negative numbers".into(),
        ));
    }
    Ok(())
}

fn check_method(method: &str) -> Result<&str> {
    let method = method.trim();
    if method.is_empty() {
        return Err(StoreError::Validation("payment method is required".into()));
    }
    Ok(method)
}

/// Apply a status change on `conn` and return the previous status.
fn transition(conn: &Connection, id: OrderId, next: OrderStatus) -> Result<OrderStatus> {
    let current: OrderStatus = conn
        .query_row(
            "SELECT status FROM orders WHERE id = ?1",
            params![id],
            |row| decode_enum(row, 0),
        )
        .map_err(not_found)?;

    if !current.can_transition_to(next) {
        return Err(StoreError::InvalidTransition {
            from: current,
            to: next,
        });
    }

    conn.execute(
        "UPDATE orders SET status = ?1 WHERE id = ?2",
        params![next.as_str(), id],
    )?;
    Ok(current)
}

impl Database {
    /// Create an `unpaid` order for an existing listing.
    pub fn create_order(&self, order: &NewOrder) -> Result<Order> {
        if let Some(owner) = order.owner_external_id.filter(|id| *id <= 0) {
            return Err(StoreError::InvalidIdentity(owner));
        }
        check_amounts(order.amount, order.bonus_amount)?;
        let method = check_method(&order.method)?;
        self.get_listing(order.listing_id)?;

        let currency = order.currency.as_deref().unwrap_or(DEFAULT_CURRENCY);
        self.conn().execute(
            "INSERT INTO orders (order_number, listing_id, owner_external_id, amount,
                                 bonus_amount, total_amount, method, currency, status,
                                 created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                order.order_number,
                order.listing_id,
                order.owner_external_id,
                order.amount,
                order.bonus_amount,
                order.total_amount(),
                method,
                currency,
                OrderStatus::Unpaid.as_str(),
                encode_ts(&Utc::now()),
                order.expires_at.as_ref().map(encode_ts),
            ],
        )?;
        let id = self.conn().last_insert_rowid();

        tracing::info!(
            order_id = id,
            order_number = %order.order_number,
            listing_id = order.listing_id,
            total = order.total_amount(),
            "order created"
        );
        self.get_order(id)
    }

    pub fn get_order(&self, id: OrderId) -> Result<Order> {
        select_order(self.conn(), id)
    }

    /// Most recent order of `owner` for a listing in the given status.
    pub fn find_order(
        &self,
        listing_id: ListingId,
        status: OrderStatus,
        owner: Option<i64>,
    ) -> Result<Option<Order>> {
        let order = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {ORDER_COLUMNS} FROM orders
                     WHERE listing_id = ?1 AND status = ?2 AND owner_external_id IS ?3
                     ORDER BY id DESC LIMIT 1"
                ),
                params![listing_id, status.as_str(), owner],
                row_to_order,
            )
            .optional()?;
        Ok(order)
    }

    /// Orders newest first. `None` filters are not applied.
    pub fn list_orders(
        &self,
        owner: Option<i64>,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE (?1 IS NULL OR owner_external_id = ?1)
               AND (?2 IS NULL OR status = ?2)
             ORDER BY id DESC"
        ))?;
        let rows = stmt.query_map(params![owner, status.map(|s| s.as_str())], row_to_order)?;

        let mut orders = Vec::new();
        for row in rows {
            orders.push(row?);
        }
        Ok(orders)
    }

    /// Edit an unpaid order. Returns `false` when the order does not exist.
    pub fn update_order(&self, id: OrderId, update: &OrderUpdate) -> Result<bool> {
        check_amounts(update.amount, update.bonus_amount)?;
        let method = check_method(&update.method)?;

        let status: Option<OrderStatus> = self
            .conn()
            .query_row(
                "SELECT status FROM orders WHERE id = ?1",
                params![id],
                |row| decode_enum(row, 0),
            )
            .optional()?;
        match status {
            None => return Ok(false),
            Some(OrderStatus::Unpaid) => {}
            Some(other) => {
                return Err(StoreError::Validation(format!(
                    "a {other} order can no longer be edited"
                )))
            }
        }

        let changed = self.conn().execute(
            "UPDATE orders
             SET amount = ?1, bonus_amount = ?2, total_amount = ?3, method = ?4,
                 currency = ?5, expires_at = ?6
             WHERE id = ?7 AND status = 'unpaid'",
            params![
                update.amount,
                update.bonus_amount,
                update.amount + update.bonus_amount,
                method,
                update.currency,
                update.expires_at.as_ref().map(encode_ts),
                id,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Move an order to `next`, enforcing the order state machine.
    pub fn set_order_status(&mut self, id: OrderId, next: OrderStatus) -> Result<Order> {
        let tx = self.conn_mut().transaction()?;
        let current = transition(&tx, id, next)?;
        tx.commit()?;

        tracing::info!(order_id = id, from = %current, to = %next, "order status changed");
        self.get_order(id)
    }

    /// Mark an order paid and post a system message built by `note` into
    /// the buyer's chat, in one transaction.
    pub fn pay_order(
        &mut self,
        id: OrderId,
        note: impl FnOnce(&Order) -> String,
    ) -> Result<Order> {
        let tx = self.conn_mut().transaction()?;
        transition(&tx, id, OrderStatus::Paid)?;
        let order = select_order(&tx, id)?;

        let chat = open_chat(&tx, order.listing_id, order.owner_external_id)?;
        insert_message(&tx, chat.id, &NewMessage::system(note(&order)))?;
        tx.commit()?;

        tracing::info!(order_id = id, chat_id = chat.id, "order paid");
        Ok(order)
    }

    pub fn delete_order(&self, id: OrderId) -> Result<bool> {
        let changed = self
            .conn()
            .execute("DELETE FROM orders WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Delete every unpaid order whose expiry lies before `cutoff`.
    ///
    /// Paid and cancelled orders are never touched.
    pub fn reap_expired_orders(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        let tx = self.conn_mut().transaction()?;
        let reaped = tx.execute(
            "DELETE FROM orders
             WHERE status = 'unpaid' AND expires_at IS NOT NULL AND expires_at < ?1",
            params![encode_ts(&cutoff)],
        )?;
        tx.commit()?;

        if reaped > 0 {
            tracing::info!(reaped, cutoff = %cutoff, "expired orders reaped");
        }
        Ok(reaped)
    }
}

fn select_order(conn: &Connection, id: OrderId) -> Result<Order> {
    conn.query_row(
        &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
        params![id],
        row_to_order,
    )
    .map_err(not_found)
}

fn row_to_order(row: &rusqlite::Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        order_number: row.get(1)?,
        listing_id: row.get(2)?,
        owner_external_id: row.get(3)?,
        amount: row.get(4)?,
        bonus_amount: row.get(5)?,
        total_amount: row.get(6)?,
        method: row.get(7)?,
        currency: row.get(8)?,
        status: decode_enum(row, 9)?,
        created_at: decode_ts(row, 10)?,
        expires_at: decode_opt_ts(row, 11)?,
    })
}
