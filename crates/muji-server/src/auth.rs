//! Identity guard: admin credential sessions and Telegram init-data
//! verification.

use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use muji_shared::constants::{ADMIN_SESSION_COOKIE, TELEGRAM_INIT_DATA_HEADER};
use muji_shared::telegram::{verify_init_data, TelegramUser};
use muji_shared::{AuthError, IdentityKind};
use muji_store::{User, UserAttrs};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::error::ServerError;

// ---------------------------------------------------------------------------
// Admin credentials and cookies
// ---------------------------------------------------------------------------

fn ct_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    a.len() == b.len() && a.ct_eq(b).unwrap_u8() == 1
}

/// Compare submitted credentials against the configured pair.
///
/// Both halves are always compared so a wrong username costs as much as a
/// wrong password.
pub fn check_admin_credentials(config: &ServerConfig, username: &str, password: &str) -> bool {
    let user_ok = ct_eq(username, &config.admin_username);
    let pass_ok = ct_eq(password, &config.admin_password);
    user_ok & pass_ok
}

pub fn session_cookie(token: &str, config: &ServerConfig) -> String {
    let mut cookie = format!(
        "{ADMIN_SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        config.session_ttl_secs
    );
    if config.secure_cookies {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_session_cookie(config: &ServerConfig) -> String {
    let mut cookie = format!("{ADMIN_SESSION_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0");
    if config.secure_cookies {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Value of the admin session cookie, if the request carries one.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == ADMIN_SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Middleware guarding the admin routes.
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ServerError> {
    let Some(token) = session_token(req.headers()) else {
        debug!(path = %req.uri().path(), "Admin request without session cookie");
        return Err(ServerError::Unauthorized);
    };

    if state.sessions.validate(&token).await.is_none() {
        warn!(path = %req.uri().path(), "Admin request with unknown session");
        return Err(ServerError::Unauthorized);
    }

    Ok(next.run(req).await)
}

// ---------------------------------------------------------------------------
// Telegram
// ---------------------------------------------------------------------------

/// Checks init data against the configured bot token.
#[derive(Clone)]
pub struct TelegramVerifier {
    bot_token: Option<String>,
    max_age: Option<Duration>,
}

impl TelegramVerifier {
    pub fn new(bot_token: Option<String>, max_age_secs: u64) -> Self {
        let max_age = i64::try_from(max_age_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .and_then(Duration::try_seconds);
        Self { bot_token, max_age }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.telegram_bot_token.clone(),
            config.telegram_auth_max_age_secs,
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.bot_token.is_some()
    }

    /// Verify the signature (and freshness, when configured) and return the
    /// embedded user.
    pub fn verify(&self, init_data: &str) -> Result<TelegramUser, ServerError> {
        let Some(bot_token) = self.bot_token.as_deref() else {
            return Err(ServerError::TelegramDisabled);
        };

        let verified = verify_init_data(init_data, bot_token).map_err(|e| {
            debug!(error = %e, "Telegram init data rejected");
            e
        })?;

        if let Some(max_age) = self.max_age {
            if !verified.is_fresh(max_age, Utc::now()) {
                debug!(user = verified.user.id, "Telegram init data expired");
                return Err(AuthError::Expired.into());
            }
        }

        Ok(verified.user)
    }
}

pub fn user_attrs(user: &TelegramUser) -> UserAttrs {
    UserAttrs {
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        locale: user.language_code.clone(),
        is_premium: user.is_premium,
        kind: IdentityKind::Telegram,
    }
}

/// Verify raw init data and create or refresh the matching user.
///
/// The signature check always happens before the store is touched.
pub async fn authenticate_telegram(state: &AppState, init_data: &str) -> Result<User, ServerError> {
    let tg_user = state.telegram.verify(init_data)?;
    let user = state
        .db
        .lock()
        .await
        .upsert_user(tg_user.id, &user_attrs(&tg_user))?;
    Ok(user)
}

/// A request made on behalf of a verified Telegram user.
pub struct TelegramIdentity(pub User);

impl TelegramIdentity {
    /// The ownership key for this user's files, chats and orders.
    pub fn external_id(&self) -> i64 {
        self.0.external_id
    }
}

#[async_trait::async_trait]
impl FromRequestParts<AppState> for TelegramIdentity {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let init_data = parts
            .headers
            .get(TELEGRAM_INIT_DATA_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.trim().is_empty())
            .ok_or(ServerError::Unauthorized)?;

        authenticate_telegram(state, init_data)
            .await
            .map(TelegramIdentity)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use muji_shared::telegram::sign_init_data;

    use super::*;

    const BOT_TOKEN: &str = "42:TEST";

    fn payload(auth_date: i64) -> String {
        let auth_date = auth_date.to_string();
        sign_init_data(
            &[
                ("auth_date", auth_date.as_str()),
                ("user", r#"{"id":7,"first_name":"Ann","language_code":"de"}"#),
            ],
            BOT_TOKEN,
        )
        .unwrap()
    }

    #[test]
    fn test_credentials() {
        let config = ServerConfig::default();
        assert!(check_admin_credentials(&config, "admin", "admin123"));
        assert!(!check_admin_credentials(&config, "admin", "admin124"));
        assert!(!check_admin_credentials(&config, "root", "admin123"));
        assert!(!check_admin_credentials(&config, "", ""));
    }

    #[test]
    fn test_cookie_round_trip() {
        let mut config = ServerConfig::default();
        config.secure_cookies = true;
        let cookie = session_cookie("abc123", &config);
        assert!(cookie.starts_with("admin_session=abc123;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.ends_with("; Secure"));

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; admin_session=abc123"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));

        headers.insert(header::COOKIE, HeaderValue::from_static("admin_session="));
        assert!(session_token(&headers).is_none());
    }

    #[test]
    fn test_verifier_disabled_without_token() {
        let verifier = TelegramVerifier::new(None, 0);
        assert!(!verifier.is_enabled());
        assert!(matches!(
            verifier.verify(&payload(Utc::now().timestamp())),
            Err(ServerError::TelegramDisabled)
        ));
    }

    #[test]
    fn test_verifier_checks_signature_and_age() {
        let verifier = TelegramVerifier::new(Some(BOT_TOKEN.into()), 3600);
        let user = verifier.verify(&payload(Utc::now().timestamp())).unwrap();
        assert_eq!(user.id, 7);
        assert_eq!(user_attrs(&user).locale.as_deref(), Some("de"));

        assert!(matches!(
            verifier.verify(&payload(Utc::now().timestamp() - 7200)),
            Err(ServerError::TelegramAuth(AuthError::Expired))
        ));

        let other = TelegramVerifier::new(Some("43:OTHER".into()), 0);
        assert!(matches!(
            other.verify(&payload(Utc::now().timestamp())),
            Err(ServerError::TelegramAuth(AuthError::InvalidSignature))
        ));
    }

    #[test]
    fn test_age_check_disabled_by_zero() {
        let verifier = TelegramVerifier::new(Some(BOT_TOKEN.into()), 0);
        assert!(verifier.verify(&payload(1_000_000_000)).is_ok());
    }
}
