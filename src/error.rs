use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::auth::password::PasswordError;
use crate::mail::DeliveryError;

/// Every error a handler can return. Server-side failures are logged here and
/// reach the client only as a generic message.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    RateLimited(String),
    /// The mail provider refused the message or could not be reached.
    Delivery(DeliveryError),
    Database(sqlx::Error),
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Delivery(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> Value {
        match self {
            AppError::Database(_) | AppError::Internal(_) => {
                tracing::error!("{self}");
                json!({ "error": "Internal server error" })
            }
            AppError::Delivery(err) => {
                tracing::warn!("{self}");
                let mut body = json!({ "error": err.to_string() });
                // Provider diagnostics help an operator fix SMTP or API settings.
                if let DeliveryError::Transport(t) = err {
                    body["details"] = json!({
                        "kind": t.kind,
                        "code": t.code,
                        "command": t.command,
                        "response": t.response,
                    });
                }
                body
            }
            _ => json!({ "error": self.to_string() }),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::NotFound(msg)
            | AppError::RateLimited(msg) => f.write_str(msg),
            AppError::Delivery(err) => write!(f, "Mail delivery failed: {err}"),
            AppError::Database(err) => write!(f, "Database error: {err}"),
            AppError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<DeliveryError> for AppError {
    fn from(err: DeliveryError) -> Self {
        AppError::Delivery(err)
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        AppError::Internal(err.to_string())
    }
}
