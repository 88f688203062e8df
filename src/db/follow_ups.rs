use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{FollowUpJob, FollowUpStatusCount};

pub struct NewFollowUp<'a> {
    pub lead_id: Uuid,
    pub email_type: &'a str,
    pub template_name: &'a str,
    pub subject: &'a str,
    pub recipient_email: &'a str,
    pub recipient_name: &'a str,
    pub scheduled_at: DateTime<Utc>,
    pub max_retries: i32,
    pub metadata: &'a serde_json::Value,
}

pub async fn insert<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    job: &NewFollowUp<'_>,
) -> Result<FollowUpJob, sqlx::Error> {
    sqlx::query_as::<_, FollowUpJob>(
        "INSERT INTO follow_up_jobs (lead_id, email_type, template_name, subject,
             recipient_email, recipient_name, scheduled_at, max_retries, metadata)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING *",
    )
    .bind(job.lead_id)
    .bind(job.email_type)
    .bind(job.template_name)
    .bind(job.subject)
    .bind(job.recipient_email)
    .bind(job.recipient_name)
    .bind(job.scheduled_at)
    .bind(job.max_retries)
    .bind(job.metadata)
    .fetch_one(executor)
    .await
}

/// Pending jobs due at `now` that still have attempts left, oldest-due first.
pub async fn due(
    pool: &PgPool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<FollowUpJob>, sqlx::Error> {
    sqlx::query_as::<_, FollowUpJob>(
        "SELECT * FROM follow_up_jobs
         WHERE status = 'pending'
           AND scheduled_at <= $1
           AND retry_count < max_retries
         ORDER BY scheduled_at ASC
         LIMIT $2",
    )
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<FollowUpJob>, sqlx::Error> {
    sqlx::query_as::<_, FollowUpJob>("SELECT * FROM follow_up_jobs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_for_lead(pool: &PgPool, lead_id: Uuid) -> Result<Vec<FollowUpJob>, sqlx::Error> {
    sqlx::query_as::<_, FollowUpJob>(
        "SELECT * FROM follow_up_jobs WHERE lead_id = $1 ORDER BY scheduled_at ASC",
    )
    .bind(lead_id)
    .fetch_all(pool)
    .await
}

/// Re-read a job right before sending it. Returns None when the job was
/// cancelled, sent or exhausted after the batch selected it.
pub async fn claim(
    pool: &PgPool,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<FollowUpJob>, sqlx::Error> {
    sqlx::query_as::<_, FollowUpJob>(
        "UPDATE follow_up_jobs SET updated_at = $2
         WHERE id = $1 AND status = 'pending' AND retry_count < max_retries
         RETURNING *",
    )
    .bind(id)
    .bind(now)
    .fetch_optional(pool)
    .await
}

/// Returns false when the job was no longer pending (cancelled mid-send).
pub async fn mark_sent(pool: &PgPool, id: Uuid, now: DateTime<Utc>) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE follow_up_jobs
         SET status = 'sent', sent_at = $2, error_message = NULL, updated_at = $2
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Count a failed attempt. The job turns `failed` once its attempts reach
/// `max_retries`, otherwise it stays `pending` for the next poll.
/// Jobs cancelled in the meantime are left alone (returns None).
pub async fn mark_failed(
    pool: &PgPool,
    id: Uuid,
    error: &str,
    now: DateTime<Utc>,
) -> Result<Option<FollowUpJob>, sqlx::Error> {
    sqlx::query_as::<_, FollowUpJob>(
        "UPDATE follow_up_jobs
         SET status = CASE WHEN retry_count + 1 >= max_retries THEN 'failed' ELSE 'pending' END,
             retry_count = retry_count + 1,
             error_message = $2,
             updated_at = $3
         WHERE id = $1 AND status = 'pending'
         RETURNING *",
    )
    .bind(id)
    .bind(error)
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub async fn cancel_for_lead(
    pool: &PgPool,
    lead_id: Uuid,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE follow_up_jobs SET status = 'cancelled', updated_at = $2
         WHERE lead_id = $1 AND status = 'pending'",
    )
    .bind(lead_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn status_counts(pool: &PgPool) -> Result<Vec<FollowUpStatusCount>, sqlx::Error> {
    sqlx::query_as::<_, FollowUpStatusCount>(
        "SELECT status,
                COUNT(*) AS count,
                MIN(scheduled_at) AS earliest_scheduled,
                MAX(scheduled_at) AS latest_scheduled
         FROM follow_up_jobs
         GROUP BY status
         ORDER BY status",
    )
    .fetch_all(pool)
    .await
}
