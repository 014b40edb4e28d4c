//! API error responses.
//!
//! Every client-visible failure goes through [`ApiError`], which renders
//! the agreed wire shape:
//!
//! ```json
//! {"error":{"status":403,"details":{"message":"..."}}}
//! ```
//!
//! The message surface is deliberately terse: a client learns only that
//! integrity failed / is required / input was missing, never which check
//! fired.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!(status = %self.status, error = %self.message, "request rejected");
        let body = serde_json::json!({
            "error": {
                "status": self.status.as_u16(),
                "details": { "message": self.message }
            }
        });
        (self.status, Json(body)).into_response()
    }
}
