use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

use crate::core::tts::{TTSError, TTSErrorCode};

/// Errors returned by the HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Tts(#[from] TTSError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::Tts(TTSError::invalid_request(message))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Tts(error) => {
                StatusCode::from_u16(error.status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The `{ error: { code, message, details? } }` payload.
    pub fn body(&self) -> Value {
        match self {
            Self::Tts(error) => {
                let mut inner = json!({
                    "code": error.code.as_str(),
                    "message": error.message,
                });
                if let Some(details) = &error.details {
                    inner["details"] = details.clone();
                }
                json!({ "error": inner })
            }
            Self::Internal(message) => json!({
                "error": {
                    "code": "InternalError",
                    "message": message,
                }
            }),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Internal(error.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            Self::Tts(error) if error.code == TTSErrorCode::InvalidRequest => {
                tracing::debug!(error = %error, "Rejected request");
            }
            _ => tracing::warn!(status = status.as_u16(), error = %self, "Request failed"),
        }
        (status, Json(self.body())).into_response()
    }
}
