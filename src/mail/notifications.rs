use askama::Template;
use serde::{Deserialize, Serialize};

use super::transport::OutgoingEmail;
use crate::models::LeadSnapshot;

/// The two mails sent right after a lead comes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailKind {
    UserConfirmation,
    AdminNotification,
}

impl EmailKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailKind::UserConfirmation => "user_confirmation",
            EmailKind::AdminNotification => "admin_notification",
        }
    }
}

impl std::fmt::Display for EmailKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Template)]
#[template(path = "notifications/admin_notification.html")]
struct AdminNotificationTemplate<'a> {
    lead: &'a LeadSnapshot,
    whatsapp_link: String,
    submitted_at: String,
    campaign: Option<String>,
    lead_url: String,
}

#[derive(Template)]
#[template(path = "notifications/user_confirmation.html")]
struct UserConfirmationTemplate<'a> {
    lead: &'a LeadSnapshot,
}

#[derive(Template)]
#[template(path = "notifications/test_email.html")]
struct TestEmailTemplate<'a> {
    transport: &'a str,
    sent_at: String,
}

/// Builds the immediate notification mails from a lead snapshot.
#[derive(Debug, Clone)]
pub struct Notifier {
    pub from: String,
    pub admin_recipient: String,
    pub base_url: String,
}

impl Notifier {
    pub fn build(&self, kind: EmailKind, lead: &LeadSnapshot) -> Result<OutgoingEmail, String> {
        match kind {
            EmailKind::AdminNotification => {
                let html = AdminNotificationTemplate {
                    lead,
                    whatsapp_link: lead.whatsapp_link(),
                    submitted_at: lead.created_at.format("%d.%m.%Y %H:%M UTC").to_string(),
                    campaign: campaign_line(lead),
                    lead_url: format!(
                        "{}/admin/leads/{}",
                        self.base_url.trim_end_matches('/'),
                        lead.id
                    ),
                }
                .render()
                .map_err(|e| format!("Failed to render admin notification: {e}"))?;

                Ok(OutgoingEmail::html(
                    &self.admin_recipient,
                    &self.from,
                    &format!("Neue Anfrage: {}", lead.name),
                    html,
                ))
            }
            EmailKind::UserConfirmation => {
                let html = UserConfirmationTemplate { lead }
                    .render()
                    .map_err(|e| format!("Failed to render user confirmation: {e}"))?;

                Ok(OutgoingEmail::html(
                    &lead.email,
                    &self.from,
                    "Anfrage Bestätigung",
                    html,
                ))
            }
        }
    }
}

impl Notifier {
    /// A short message an operator sends to check the provider end to end.
    pub fn test_email(
        &self,
        to: &str,
        transport: &str,
        sent_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<OutgoingEmail, String> {
        let html = TestEmailTemplate {
            transport,
            sent_at: sent_at.format("%d.%m.%Y %H:%M:%S UTC").to_string(),
        }
        .render()
        .map_err(|e| format!("Failed to render test email: {e}"))?;

        Ok(OutgoingEmail::html(to, &self.from, "Test-E-Mail", html))
    }
}

fn campaign_line(lead: &LeadSnapshot) -> Option<String> {
    let source = lead.utm_source.as_deref()?;
    let mut line = format!("Quelle: {source}");
    if let Some(medium) = &lead.utm_medium {
        line.push_str(&format!(" | Medium: {medium}"));
    }
    if let Some(campaign) = &lead.utm_campaign {
        line.push_str(&format!(" | Kampagne: {campaign}"));
    }
    Some(line)
}
