use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use muji_shared::AuthError;
use muji_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Not found")]
    NotFound,

    #[error("Upload too large: {size} bytes (max {max})")]
    UploadTooLarge { size: usize, max: usize },

    #[error("Upload storage error: {0}")]
    UploadStorage(String),

    #[error("Not authenticated")]
    Unauthorized,

    #[error("Telegram authentication failed: {0}")]
    TelegramAuth(#[from] AuthError),

    #[error("Telegram authentication is not configured")]
    TelegramDisabled,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound | StoreError::OwnershipMismatch => ServerError::NotFound,
            StoreError::InvalidIdentity(_) | StoreError::Validation(_) => {
                ServerError::BadRequest(e.to_string())
            }
            StoreError::DuplicateCode(_)
            | StoreError::AlreadyRedeemed
            | StoreError::InvalidTransition { .. } => ServerError::Conflict(e.to_string()),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::UploadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, self.to_string())
            }
            ServerError::UploadStorage(detail) => {
                tracing::error!(error = %detail, "upload storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Upload storage error".to_string())
            }
            ServerError::Unauthorized
            | ServerError::TelegramAuth(_)
            | ServerError::TelegramDisabled => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ServerError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
