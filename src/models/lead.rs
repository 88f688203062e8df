use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub whatsapp_country_code: String,
    pub whatsapp_number: String,
    pub tattoo_description: String,
    pub reference_images: serde_json::Value,
    pub discount_percentage: i32,
    pub status: String,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Converted,
    Rejected,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Converted => "converted",
            LeadStatus::Rejected => "rejected",
        }
    }
}

/// The lead data a mail needs at send time, detached from the `leads` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSnapshot {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub whatsapp_country_code: String,
    pub whatsapp_number: String,
    pub description: String,
    pub reference_images: Vec<String>,
    pub discount_percentage: i32,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Lead> for LeadSnapshot {
    fn from(lead: &Lead) -> Self {
        let reference_images = lead
            .reference_images
            .as_array()
            .map(|urls| {
                urls.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: lead.id,
            name: lead.name.clone(),
            email: lead.email.clone(),
            whatsapp_country_code: lead.whatsapp_country_code.clone(),
            whatsapp_number: lead.whatsapp_number.clone(),
            description: lead.tattoo_description.clone(),
            reference_images,
            discount_percentage: lead.discount_percentage,
            utm_source: lead.utm_source.clone(),
            utm_medium: lead.utm_medium.clone(),
            utm_campaign: lead.utm_campaign.clone(),
            created_at: lead.created_at,
        }
    }
}

impl LeadSnapshot {
    /// `wa.me` link for the lead's WhatsApp number.
    pub fn whatsapp_link(&self) -> String {
        format!(
            "https://wa.me/{}{}",
            self.whatsapp_country_code.trim_start_matches('+'),
            self.whatsapp_number
        )
    }
}
