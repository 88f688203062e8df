use axum::http::HeaderMap;
use std::net::IpAddr;

use crate::db;
use crate::db::leads::NewLead;
use crate::error::AppError;
use crate::models::{Lead, LeadSnapshot};
use crate::state::SharedState;

use super::metadata;
use super::validate::{self, LeadForm};

/// Discount every new lead is offered.
pub const LEAD_DISCOUNT: i32 = 30;

/// Accept a lead form: rate limit, validate, store, then hand the lead to the mailer.
/// Mail failures never reach the caller.
pub async fn run(
    state: &SharedState,
    headers: &HeaderMap,
    peer_addr: IpAddr,
    form: LeadForm,
) -> Result<Lead, AppError> {
    let client = metadata::extract(headers, peer_addr, &state.config.trusted_proxies);

    if let Err(retry_after) = state.intake_limiter.check(client.ip) {
        return Err(AppError::RateLimited(format!(
            "Too many submissions. Retry after {retry_after}s"
        )));
    }

    let valid = validate::validate(form).map_err(AppError::BadRequest)?;

    let reference_images = serde_json::json!(valid.reference_images);
    let ip = client.ip.to_string();

    let lead = db::leads::create(
        &state.pool,
        &NewLead {
            name: &valid.name,
            email: &valid.email,
            whatsapp_country_code: &valid.whatsapp_country_code,
            whatsapp_number: &valid.whatsapp_number,
            tattoo_description: &valid.tattoo_description,
            reference_images: &reference_images,
            discount_percentage: LEAD_DISCOUNT,
            utm_source: valid.utm_source.as_deref(),
            utm_medium: valid.utm_medium.as_deref(),
            utm_campaign: valid.utm_campaign.as_deref(),
            ip_address: Some(&ip),
            user_agent: client.user_agent.as_deref(),
        },
    )
    .await?;

    tracing::info!("New lead {} from {}", lead.id, ip);

    state.mailer.on_lead_created(LeadSnapshot::from(&lead));

    Ok(lead)
}
