use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::auth::extractor::AuthUser;
use crate::error::AppError;
use crate::mail::transport::send_with_timeout;
use crate::mail::DeliveryError;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct TestEmailRequest {
    #[serde(default)]
    pub to: Option<String>,
}

/// Check that the configured provider is reachable with our credentials.
pub async fn verify(
    _auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.transport.verify().await.map_err(DeliveryError::from)?;

    Ok(Json(json!({
        "success": true,
        "transport": state.transport.name(),
        "from": state.config.mail.from,
    })))
}

/// Send a test message straight through the transport, outside the queue and
/// the send budget.
pub async fn send_test(
    auth: AuthUser,
    State(state): State<SharedState>,
    Json(req): Json<TestEmailRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let to = req
        .to
        .as_deref()
        .map(str::trim)
        .filter(|to| !to.is_empty())
        .ok_or_else(|| AppError::BadRequest("Email address (to) is required".to_string()))?;

    let email = state
        .notifier
        .test_email(to, state.transport.name(), state.clock.now())
        .map_err(DeliveryError::Render)?;

    let delivery = send_with_timeout(
        state.transport.as_ref(),
        &email,
        state.config.mail.transport_timeout,
    )
    .await
    .map_err(DeliveryError::from)?;

    tracing::info!("Test email sent to {to} by {}", auth.email);

    Ok(Json(json!({
        "success": true,
        "message": format!("Test email sent to {to}"),
        "message_id": delivery.message_id,
    })))
}
