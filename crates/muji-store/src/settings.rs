//! The settings document: banner, wallet addresses and VIP catalogs.
//!
//! Each section is one JSON row in the `settings` table. A section that was
//! never written reads back as its default.

use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::database::Database;
use crate::error::Result;
use crate::models::{
    default_vip_catalogs, default_wallets, Banner, Settings, VipCatalogs, WalletAddresses,
};

const BANNER_KEY: &str = "banner";
const WALLETS_KEY: &str = "crypto_wallets";
const VIP_CATALOGS_KEY: &str = "vip_catalogs";

impl Database {
    pub fn settings(&self) -> Result<Settings> {
        Ok(Settings {
            banner: self.read_section(BANNER_KEY)?.unwrap_or_default(),
            crypto_wallets: self
                .read_section(WALLETS_KEY)?
                .unwrap_or_else(default_wallets),
            vip_catalogs: self
                .read_section(VIP_CATALOGS_KEY)?
                .unwrap_or_else(default_vip_catalogs),
        })
    }

    pub fn set_banner(&self, banner: &Banner) -> Result<()> {
        self.write_section(BANNER_KEY, banner)
    }

    pub fn set_wallets(&self, wallets: &WalletAddresses) -> Result<()> {
        self.write_section(WALLETS_KEY, wallets)
    }

    pub fn set_vip_catalogs(&self, catalogs: &VipCatalogs) -> Result<()> {
        self.write_section(VIP_CATALOGS_KEY, catalogs)
    }

    fn read_section<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn write_section<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.conn().execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, raw],
        )?;
        tracing::info!(section = key, "settings updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        let db = Database::open_in_memory().unwrap();
        let settings = db.settings().unwrap();

        assert_eq!(settings.banner, Banner::default());
        assert!(settings.crypto_wallets.contains_key("trc20"));
        assert_eq!(settings.vip_catalogs.len(), 3);
    }

    #[test]
    fn sections_are_replaced_independently() {
        let db = Database::open_in_memory().unwrap();

        let banner = Banner {
            text: "Summer sale".into(),
            link: String::new(),
            link_text: String::new(),
            visible: false,
        };
        db.set_banner(&banner).unwrap();

        let mut wallets = WalletAddresses::new();
        wallets.insert("trc20".into(), "TNEW".into());
        db.set_wallets(&wallets).unwrap();
        db.set_wallets(&wallets).unwrap();

        let settings = db.settings().unwrap();
        assert_eq!(settings.banner, banner);
        assert_eq!(settings.crypto_wallets, wallets);
        assert_eq!(settings.vip_catalogs, default_vip_catalogs());
    }

    #[test]
    fn vip_catalogs_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let mut catalogs = default_vip_catalogs();
        if let Some(vip) = catalogs.get_mut("vip") {
            vip.price = 150.0;
            vip.visible = false;
        }
        db.set_vip_catalogs(&catalogs).unwrap();
        assert_eq!(db.settings().unwrap().vip_catalogs, catalogs);
    }
}
