//! Sign-in endpoints: admin credential login and Telegram sign-in.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{info, warn};

use super::{ack, AppState};
use crate::auth::{
    authenticate_telegram, check_admin_credentials, clear_session_cookie, session_cookie,
    session_token,
};
use crate::error::ServerError;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/session", get(current_session))
        .route("/api/auth/telegram", post(telegram_sign_in))
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ServerError> {
    if !check_admin_credentials(&state.config, &req.username, &req.password) {
        warn!(username = %req.username, "Rejected admin login");
        return Err(ServerError::Unauthorized);
    }

    let token = state.sessions.create(&req.username).await;
    info!(username = %req.username, "Admin logged in");

    Ok((
        AppendHeaders([(header::SET_COOKIE, session_cookie(&token, &state.config))]),
        ack("logged_in"),
    ))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = session_token(&headers) {
        state.sessions.revoke(&token).await;
    }
    (
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie(&state.config))]),
        ack("logged_out"),
    )
}

async fn current_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    let session = match session_token(&headers) {
        Some(token) => state.sessions.validate(&token).await,
        None => None,
    };

    match session {
        Some(session) => Json(serde_json::json!({
            "authenticated": true,
            "username": session.subject,
            "expires_at": session.expires_at,
        })),
        None => Json(serde_json::json!({ "authenticated": false })),
    }
}

#[derive(Deserialize)]
struct TelegramSignIn {
    init_data: String,
}

async fn telegram_sign_in(
    State(state): State<AppState>,
    Json(req): Json<TelegramSignIn>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let user = authenticate_telegram(&state, &req.init_data).await?;
    let profile = state.db.lock().await.get_profile(user.id)?;

    Ok(Json(serde_json::json!({
        "status": "authenticated",
        "user": user,
        "profile": profile,
    })))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::super::tests::{get, init_data_for, json_request, TestApp};
    use super::*;

    #[tokio::test]
    async fn test_login_sets_cookie_and_logout_revokes() {
        let app = TestApp::new().await;
        let router = super::super::build_router(app.state.clone());

        let resp = tower::ServiceExt::oneshot(
            router,
            json_request(
                "POST",
                "/api/login",
                serde_json::json!({ "username": "admin", "password": "admin123" }),
            ),
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = resp
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        let pair = cookie.split(';').next().unwrap().to_string();
        assert!(pair.starts_with("admin_session="));

        let mut req = get("/api/session");
        req.headers_mut().insert(header::COOKIE, pair.parse().unwrap());
        let (status, body) = app.send(req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["authenticated"], true);
        assert_eq!(body["username"], "admin");

        let mut req = json_request("POST", "/api/logout", serde_json::json!({}));
        req.headers_mut().insert(header::COOKIE, pair.parse().unwrap());
        let (status, _) = app.send(req).await;
        assert_eq!(status, StatusCode::OK);

        let mut req = get("/api/stats");
        req.headers_mut().insert(header::COOKIE, pair.parse().unwrap());
        let (status, _) = app.send(req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let app = TestApp::new().await;
        let (status, body) = app
            .send(json_request(
                "POST",
                "/api/login",
                serde_json::json!({ "username": "admin", "password": "nope" }),
            ))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_telegram_sign_in_creates_user() {
        let app = TestApp::new().await;
        let (status, body) = app
            .send(json_request(
                "POST",
                "/api/auth/telegram",
                serde_json::json!({ "init_data": init_data_for(321) }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["external_id"], 321);
        assert_eq!(body["user"]["first_name"], "User321");
        assert!(app
            .state
            .db
            .lock()
            .await
            .get_user_by_external_id(321)
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_tampered_init_data_never_reaches_store() {
        let app = TestApp::new().await;
        let tampered = init_data_for(321).replace("User321", "Mallory");
        let (status, _) = app
            .send(json_request(
                "POST",
                "/api/auth/telegram",
                serde_json::json!({ "init_data": tampered }),
            ))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(app.state.db.lock().await.stats().unwrap().users_count, 0);
    }
}
