/// Application name
pub const APP_NAME: &str = "Muji";

/// Author name stored on comments submitted without one
pub const ANONYMOUS_AUTHOR: &str = "Anonymous User";

/// Locale assigned to users whose client did not report one
pub const DEFAULT_LOCALE: &str = "en";

/// Currency assigned to orders created without one
pub const DEFAULT_CURRENCY: &str = "USD";

/// Cookie carrying the admin session token
pub const ADMIN_SESSION_COOKIE: &str = "admin_session";

/// Request header carrying raw Telegram Mini App init data
pub const TELEGRAM_INIT_DATA_HEADER: &str = "x-telegram-init-data";

/// HMAC key used to derive the init-data secret from the bot token
pub const WEB_APP_DATA_KEY: &str = "WebAppData";

/// URL prefix under which uploaded files are served
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8002;

/// Maximum upload size in bytes (50 MiB)
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;
