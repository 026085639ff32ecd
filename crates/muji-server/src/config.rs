//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use muji_shared::constants::{DEFAULT_HTTP_PORT, MAX_UPLOAD_SIZE};

const DEFAULT_ADMIN_USERNAME: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// Upper bound for session and order lifetimes (ten years).
const MAX_TTL_SECS: u64 = 10 * 365 * 86_400;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8002`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./app_database.db`
    pub database_path: PathBuf,

    /// Directory uploaded files are written to and served from.
    /// Env: `UPLOAD_DIR`
    /// Default: `./uploads`
    pub upload_dir: PathBuf,

    /// Maximum size of one uploaded file in bytes.
    /// Env: `MAX_UPLOAD_SIZE`
    pub max_upload_size: usize,

    /// Env: `ADMIN_USERNAME`, `ADMIN_PASSWORD`
    pub admin_username: String,
    pub admin_password: String,

    /// Bot token used to verify Telegram init data. Telegram-authenticated
    /// routes answer 401 while unset.
    /// Env: `TELEGRAM_BOT_TOKEN`
    pub telegram_bot_token: Option<String>,

    /// Maximum age of `auth_date` in seconds, `0` disables the check.
    /// Env: `TELEGRAM_AUTH_MAX_AGE_SECS`
    pub telegram_auth_max_age_secs: u64,

    /// Admin session lifetime.
    /// Env: `SESSION_TTL_SECS`
    /// Default: `86400`
    pub session_ttl_secs: u64,

    /// How long a new order stays payable before the reaper may delete it.
    /// Env: `ORDER_TTL_SECS`
    /// Default: `1800`
    pub order_ttl_secs: u64,

    /// Period of the background order reaper, `0` disables it.
    /// Env: `ORDER_REAP_INTERVAL_SECS`
    /// Default: `300`
    pub order_reap_interval_secs: u64,

    /// Mark the session cookie `Secure`.
    /// Env: `SECURE_COOKIES` (true/false)
    /// Default: `false`
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./app_database.db"),
            upload_dir: PathBuf::from("./uploads"),
            max_upload_size: MAX_UPLOAD_SIZE,
            admin_username: DEFAULT_ADMIN_USERNAME.to_string(),
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
            telegram_bot_token: None,
            telegram_auth_max_age_secs: 0,
            session_ttl_secs: 86_400,
            order_ttl_secs: 1_800,
            order_reap_interval_secs: 300,
            secure_cookies: false,
        }
    }
}

// Secrets are kept out of `{:?}` so the config can be logged at startup.
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("upload_dir", &self.upload_dir)
            .field("max_upload_size", &self.max_upload_size)
            .field("admin_username", &self.admin_username)
            .field("telegram_bot_token", &self.telegram_bot_token.as_ref().map(|_| "<set>"))
            .field("telegram_auth_max_age_secs", &self.telegram_auth_max_age_secs)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("order_ttl_secs", &self.order_ttl_secs)
            .field("order_reap_interval_secs", &self.order_reap_interval_secs)
            .field("secure_cookies", &self.secure_cookies)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        parse_into(&lookup, "HTTP_ADDR", &mut config.http_addr);

        if let Some(path) = lookup("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(dir);
        }
        parse_into(&lookup, "MAX_UPLOAD_SIZE", &mut config.max_upload_size);

        if let Some(user) = lookup("ADMIN_USERNAME").filter(|v| !v.is_empty()) {
            config.admin_username = user;
        }
        if let Some(password) = lookup("ADMIN_PASSWORD").filter(|v| !v.is_empty()) {
            config.admin_password = password;
        }

        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN").filter(|v| !v.trim().is_empty()) {
            config.telegram_bot_token = Some(token.trim().to_string());
        }
        parse_into(
            &lookup,
            "TELEGRAM_AUTH_MAX_AGE_SECS",
            &mut config.telegram_auth_max_age_secs,
        );
        parse_ttl(&lookup, "SESSION_TTL_SECS", &mut config.session_ttl_secs);
        parse_ttl(&lookup, "ORDER_TTL_SECS", &mut config.order_ttl_secs);
        parse_into(
            &lookup,
            "ORDER_REAP_INTERVAL_SECS",
            &mut config.order_reap_interval_secs,
        );

        if let Some(val) = lookup("SECURE_COOKIES") {
            config.secure_cookies = val == "true" || val == "1";
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// Whether the admin credential pair is still the built-in placeholder.
    pub fn uses_default_credentials(&self) -> bool {
        self.admin_username == DEFAULT_ADMIN_USERNAME
            && self.admin_password == DEFAULT_ADMIN_PASSWORD
    }
}

fn parse_into<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "Invalid value, using default"),
    }
}

fn parse_ttl(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut u64) {
    let default = *slot;
    parse_into(lookup, key, slot);
    if *slot > MAX_TTL_SECS {
        tracing::warn!(key, value = *slot, max = MAX_TTL_SECS, "TTL too large, using default");
        *slot = default;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> ServerConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8002).into());
        assert_eq!(config.max_upload_size, 50 * 1024 * 1024);
        assert!(config.telegram_bot_token.is_none());
        assert!(config.uses_default_credentials());
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("UPLOAD_DIR", "/srv/uploads"),
            ("ADMIN_PASSWORD", "s3cret"),
            ("TELEGRAM_BOT_TOKEN", " 1:abc "),
            ("ORDER_REAP_INTERVAL_SECS", "0"),
            ("SECURE_COOKIES", "true"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.upload_dir, PathBuf::from("/srv/uploads"));
        assert_eq!(config.telegram_bot_token.as_deref(), Some("1:abc"));
        assert_eq!(config.order_reap_interval_secs, 0);
        assert!(config.secure_cookies);
        assert!(!config.uses_default_credentials());
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = from_pairs(&[("HTTP_ADDR", "not-an-addr"), ("SESSION_TTL_SECS", "-1")]);
        assert_eq!(config.http_addr, ServerConfig::default().http_addr);
        assert_eq!(config.session_ttl_secs, 86_400);
    }

    #[test]
    fn test_oversized_ttls_keep_defaults() {
        let huge = u64::MAX.to_string();
        let config = from_pairs(&[("SESSION_TTL_SECS", &huge), ("ORDER_TTL_SECS", &huge)]);
        assert_eq!(config.session_ttl_secs, 86_400);
        assert_eq!(config.order_ttl_secs, 1_800);

        let config = from_pairs(&[("ORDER_TTL_SECS", "315360000")]);
        assert_eq!(config.order_ttl_secs, MAX_TTL_SECS);
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = from_pairs(&[("TELEGRAM_BOT_TOKEN", "1:topsecret")]);
        let printed = format!("{config:?}");
        assert!(!printed.contains("topsecret"));
        assert!(!printed.contains("admin123"));
    }
}
