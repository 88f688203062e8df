use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::auth::extractor::AuthUser;
use crate::db;
use crate::error::AppError;
use crate::mail::queue::QueueStats;
use crate::models::FollowUpJob;
use crate::state::SharedState;

/// In-process notification queue: depth, drain state and send budget.
pub async fn queue_stats(
    _auth: AuthUser,
    State(state): State<SharedState>,
) -> Json<QueueStats> {
    Json(state.queue.stats())
}

/// Persisted follow-ups grouped by status.
pub async fn stats(
    _auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let counts = db::follow_ups::status_counts(&state.pool).await?;
    Ok(Json(json!({
        "stats": counts,
        "processing": state.processor.is_processing(),
    })))
}

pub async fn pending(
    _auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<Json<Vec<FollowUpJob>>, AppError> {
    let jobs = state
        .scheduler
        .due_jobs(state.config.mail.batch_limit)
        .await?;
    Ok(Json(jobs))
}

/// Run one follow-up batch now.
pub async fn process(
    auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<Json<serde_json::Value>, AppError> {
    tracing::info!("Manual follow-up batch triggered by {}", auth.email);

    match state.processor.run_batch().await? {
        Some(summary) => Ok(Json(json!(summary))),
        None => Ok(Json(json!({ "skipped": true }))),
    }
}
