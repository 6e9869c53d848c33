//! Error types shared by the store, the session manager and the HTTP layer.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("BSON error: {0}")]
    Bson(#[from] bson::ser::Error),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("No wallet provider found, install one from {install_url}")]
    ProviderAbsent { install_url: String },

    #[error("Wallet connection rejected: {0}")]
    ConnectionRejected(String),

    #[error("A wallet connection is already in progress")]
    AlreadyConnecting,

    #[error("Wallet disconnect failed: {0}")]
    DisconnectFailed(String),

    #[error("Session manager unavailable")]
    Unavailable,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Wallet session required")]
    Unauthorized,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Session(SessionError::ProviderAbsent { .. }) => StatusCode::NOT_FOUND,
            ApiError::Session(SessionError::ConnectionRejected(_))
            | ApiError::Session(SessionError::AlreadyConnecting) => StatusCode::CONFLICT,
            ApiError::Session(SessionError::DisconnectFailed(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Session(SessionError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = json!({ "error": self.to_string() });
        if let ApiError::Session(SessionError::ProviderAbsent { install_url }) = self {
            body["installUrl"] = json!(install_url);
        }
        HttpResponse::build(self.status_code()).json(body)
    }
}
