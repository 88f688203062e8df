use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::extractor::AuthUser;
use crate::db;
use crate::error::AppError;
use crate::intake::pipeline;
use crate::intake::validate::LeadForm;
use crate::models::{FollowUpJob, Lead, LeadStatus};
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Deserialize)]
pub struct UpdateStatus {
    pub status: LeadStatus,
}

/// Public lead form endpoint.
pub async fn create(
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(form): Json<LeadForm>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let lead = pipeline::run(&state, &headers, addr.ip(), form).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": lead.id,
            "discount_percentage": lead.discount_percentage,
        })),
    ))
}

pub async fn list(
    _auth: AuthUser,
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * per_page;

    let leads = db::leads::list(&state.pool, per_page, offset).await?;
    let total = db::leads::count(&state.pool).await?;

    Ok(Json(json!({
        "leads": leads,
        "total": total,
        "page": page,
        "per_page": per_page,
        "total_pages": (total + per_page - 1) / per_page,
    })))
}

pub async fn get(
    _auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Lead>, AppError> {
    let lead = db::leads::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Lead not found".to_string()))?;
    Ok(Json(lead))
}

pub async fn update_status(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatus>,
) -> Result<Json<Lead>, AppError> {
    let lead = db::leads::update_status(&state.pool, id, req.status)
        .await?
        .ok_or_else(|| AppError::NotFound("Lead not found".to_string()))?;

    tracing::info!(
        "Lead {} set to {} by {}",
        lead.id,
        req.status.as_str(),
        auth.email
    );
    Ok(Json(lead))
}

pub async fn delete(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    db::leads::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Lead not found".to_string()))?;

    let cancelled = state.mailer.on_lead_deleted(id).await?;

    if !db::leads::delete(&state.pool, id).await? {
        return Err(AppError::NotFound("Lead not found".to_string()));
    }

    tracing::info!("Lead {id} deleted by {}", auth.email);
    Ok(Json(json!({ "deleted": true, "cancelled_follow_ups": cancelled })))
}

pub async fn cancel_follow_ups(
    _auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    db::leads::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Lead not found".to_string()))?;

    let cancelled = state.scheduler.cancel_for_lead(id).await?;
    Ok(Json(json!({ "cancelled": cancelled })))
}

pub async fn follow_ups(
    _auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<FollowUpJob>>, AppError> {
    db::leads::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Lead not found".to_string()))?;

    let jobs = db::follow_ups::list_for_lead(&state.pool, id).await?;
    Ok(Json(jobs))
}
