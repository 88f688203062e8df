use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Lead, LeadStatus};

pub struct NewLead<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub whatsapp_country_code: &'a str,
    pub whatsapp_number: &'a str,
    pub tattoo_description: &'a str,
    pub reference_images: &'a serde_json::Value,
    pub discount_percentage: i32,
    pub utm_source: Option<&'a str>,
    pub utm_medium: Option<&'a str>,
    pub utm_campaign: Option<&'a str>,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

pub async fn create(pool: &PgPool, lead: &NewLead<'_>) -> Result<Lead, sqlx::Error> {
    sqlx::query_as::<_, Lead>(
        "INSERT INTO leads (name, email, whatsapp_country_code, whatsapp_number,
             tattoo_description, reference_images, discount_percentage,
             utm_source, utm_medium, utm_campaign, ip_address, user_agent)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         RETURNING *",
    )
    .bind(lead.name)
    .bind(lead.email)
    .bind(lead.whatsapp_country_code)
    .bind(lead.whatsapp_number)
    .bind(lead.tattoo_description)
    .bind(lead.reference_images)
    .bind(lead.discount_percentage)
    .bind(lead.utm_source)
    .bind(lead.utm_medium)
    .bind(lead.utm_campaign)
    .bind(lead.ip_address)
    .bind(lead.user_agent)
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Lead>, sqlx::Error> {
    sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<Lead>, sqlx::Error> {
    sqlx::query_as::<_, Lead>(
        "SELECT * FROM leads ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM leads")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

pub async fn update_status(
    pool: &PgPool,
    id: Uuid,
    status: LeadStatus,
) -> Result<Option<Lead>, sqlx::Error> {
    sqlx::query_as::<_, Lead>(
        "UPDATE leads SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(status.as_str())
    .fetch_optional(pool)
    .await
}

/// Delete a lead. Its follow-up jobs go with it (ON DELETE CASCADE).
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM leads WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
