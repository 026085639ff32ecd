//! v002 -- Orders, promocodes and the settings document.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    order_number      TEXT NOT NULL,
    listing_id        INTEGER NOT NULL,
    owner_external_id INTEGER,
    amount            REAL NOT NULL,
    bonus_amount      REAL NOT NULL DEFAULT 0,
    total_amount      REAL NOT NULL,
    method            TEXT NOT NULL,           -- payment network tag
    currency          TEXT NOT NULL DEFAULT 'USD',
    status            TEXT NOT NULL DEFAULT 'unpaid',
    created_at        TEXT NOT NULL,
    expires_at        TEXT,

    FOREIGN KEY (listing_id) REFERENCES listings(id)
);

CREATE INDEX IF NOT EXISTS idx_orders_owner ON orders(owner_external_id);
CREATE INDEX IF NOT EXISTS idx_orders_status_expiry ON orders(status, expires_at);

CREATE TABLE IF NOT EXISTS promocodes (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    code       TEXT NOT NULL UNIQUE,           -- upper-case
    discount   INTEGER NOT NULL,               -- percent
    is_active  INTEGER NOT NULL DEFAULT 1,
    redeemers  TEXT NOT NULL DEFAULT '[]',     -- JSON array of external ids
    created_at TEXT NOT NULL
);

-- Singleton settings document, one row per section.
CREATE TABLE IF NOT EXISTS settings (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL                        -- JSON
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
