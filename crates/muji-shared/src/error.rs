use thiserror::Error;

/// Reasons a delegated (Telegram) identity payload is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Init data carries no hash field")]
    MissingHash,

    #[error("Invalid init data signature")]
    InvalidSignature,

    #[error("Init data carries no user field")]
    MissingUser,

    #[error("Malformed init data: {0}")]
    Malformed(String),

    #[error("Init data has expired")]
    Expired,
}
