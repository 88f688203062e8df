use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid"));

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{10,15}$").expect("phone regex is valid"));

pub const DEFAULT_COUNTRY_CODE: &str = "+49";
pub const MIN_DESCRIPTION_LEN: usize = 10;

/// Lead form body as posted by the landing page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub whatsapp_country_code: Option<String>,
    #[serde(default)]
    pub whatsapp_number: String,
    pub tattoo_description: Option<String>,
    #[serde(default)]
    pub reference_images: Vec<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
}

/// A form that passed validation, trimmed and with defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidLead {
    pub name: String,
    pub email: String,
    pub whatsapp_country_code: String,
    pub whatsapp_number: String,
    pub tattoo_description: String,
    pub reference_images: Vec<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn validate(form: LeadForm) -> Result<ValidLead, String> {
    let name = form.name.trim().to_string();
    let email = form.email.trim().to_string();
    let whatsapp_number = form.whatsapp_number.trim().to_string();

    if name.is_empty() || email.is_empty() || whatsapp_number.is_empty() {
        return Err("Alle Pflichtfelder müssen ausgefüllt werden".to_string());
    }

    if !EMAIL_RE.is_match(&email) {
        return Err("Ungültige E-Mail-Adresse".to_string());
    }

    if !PHONE_RE.is_match(&whatsapp_number) {
        return Err("Ungültige WhatsApp-Nummer".to_string());
    }

    let tattoo_description = non_empty(form.tattoo_description).unwrap_or_default();
    if !tattoo_description.is_empty() && tattoo_description.chars().count() < MIN_DESCRIPTION_LEN {
        return Err(format!(
            "Tattoo-Beschreibung muss mindestens {MIN_DESCRIPTION_LEN} Zeichen lang sein"
        ));
    }

    Ok(ValidLead {
        name,
        email,
        whatsapp_country_code: non_empty(form.whatsapp_country_code)
            .unwrap_or_else(|| DEFAULT_COUNTRY_CODE.to_string()),
        whatsapp_number,
        tattoo_description,
        reference_images: form.reference_images,
        utm_source: non_empty(form.utm_source),
        utm_medium: non_empty(form.utm_medium),
        utm_campaign: non_empty(form.utm_campaign),
    })
}
