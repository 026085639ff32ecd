//! Telegram Mini App init-data verification.
//!
//! The client forwards the raw `initData` query string it received from
//! Telegram. Its authenticity is checked by recomputing
//! `HMAC-SHA256(secret, data_check_string)` where
//!
//! - `secret = HMAC-SHA256(key = "WebAppData", msg = bot_token)`
//! - `data_check_string` is every decoded `key=value` pair except `hash`,
//!   sorted by key and joined with `\n`.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::constants::WEB_APP_DATA_KEY;
use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// User object embedded in the init data `user` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
    #[serde(default)]
    pub is_premium: bool,
}

/// Init data whose signature has been checked.
#[derive(Debug, Clone)]
pub struct VerifiedInitData {
    pub user: TelegramUser,
    pub auth_date: Option<DateTime<Utc>>,
    pub fields: BTreeMap<String, String>,
}

impl VerifiedInitData {
    /// `false` when `auth_date` is missing or older than `max_age`.
    pub fn is_fresh(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        match self.auth_date {
            Some(issued) => now - issued <= max_age,
            None => false,
        }
    }
}

fn mac_for(key: &[u8]) -> Result<HmacSha256, AuthError> {
    HmacSha256::new_from_slice(key).map_err(|e| AuthError::Malformed(e.to_string()))
}

fn secret_key(bot_token: &str) -> Result<Vec<u8>, AuthError> {
    let mut mac = mac_for(WEB_APP_DATA_KEY.as_bytes())?;
    mac.update(bot_token.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Build the canonical string that the signature covers.
pub fn data_check_string(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .filter(|(key, _)| key.as_str() != "hash")
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode a url-encoded init data string into its fields.
pub fn parse_init_data(init_data: &str) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(init_data.trim().as_bytes())
        .into_owned()
        .collect()
}

/// Verify `init_data` against the bot token and extract the user.
pub fn verify_init_data(init_data: &str, bot_token: &str) -> Result<VerifiedInitData, AuthError> {
    let fields = parse_init_data(init_data);

    let presented = fields.get("hash").ok_or(AuthError::MissingHash)?;
    let presented = hex::decode(presented).map_err(|_| AuthError::InvalidSignature)?;

    let mut mac = mac_for(&secret_key(bot_token)?)?;
    mac.update(data_check_string(&fields).as_bytes());
    // verify_slice compares in constant time
    mac.verify_slice(&presented)
        .map_err(|_| AuthError::InvalidSignature)?;

    let user_json = fields.get("user").ok_or(AuthError::MissingUser)?;
    let user: TelegramUser =
        serde_json::from_str(user_json).map_err(|e| AuthError::Malformed(e.to_string()))?;

    let auth_date = match fields.get("auth_date") {
        Some(raw) => {
            let secs: i64 = raw
                .parse()
                .map_err(|_| AuthError::Malformed(format!("invalid auth_date: {raw}")))?;
            DateTime::from_timestamp(secs, 0)
        }
        None => None,
    };

    Ok(VerifiedInitData {
        user,
        auth_date,
        fields,
    })
}

/// Produce a signed init data string for the given fields.
///
/// Mirrors what Telegram hands to a Mini App; used by tests and local
/// tooling that need to impersonate a client.
pub fn sign_init_data(fields: &[(&str, &str)], bot_token: &str) -> Result<String, AuthError> {
    let map: BTreeMap<String, String> = fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let mut mac = mac_for(&secret_key(bot_token)?)?;
    mac.update(data_check_string(&map).as_bytes());
    let hash = hex::encode(mac.finalize().into_bytes());

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in &map {
        serializer.append_pair(key, value);
    }
    serializer.append_pair("hash", &hash);
    Ok(serializer.finish())
}
