use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

/// Authentication failures raised by the auth middleware.
///
/// Every variant is answered with `403 Forbidden` and the standard error
/// payload; the reason is only logged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::FORBIDDEN
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "Rejected unauthenticated request");
        let body = json!({
            "error": {
                "code": "Forbidden",
                "message": self.to_string(),
            }
        });
        (self.status_code(), Json(body)).into_response()
    }
}
