use async_trait::async_trait;
use base64::Engine;
use serde_json::json;

use super::transport::{Delivery, DeliveryTransport, OutgoingEmail, TransportError, TransportErrorKind};
use crate::config::SendGridConfig;

/// SendGrid v3 `mail/send` over HTTPS.
pub struct SendGridTransport {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
}

impl SendGridTransport {
    pub fn new(config: &SendGridConfig) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| format!("Failed to build SendGrid client: {e}"))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_url: config.api_url.clone(),
        })
    }
}

fn payload(email: &OutgoingEmail) -> serde_json::Value {
    let mut body = json!({
        "personalizations": [{ "to": [{ "email": &email.to }] }],
        "from": { "email": &email.from },
        "subject": &email.subject,
        "content": [{ "type": "text/html", "value": &email.html }],
    });

    if !email.attachments.is_empty() {
        body["attachments"] = email
            .attachments
            .iter()
            .map(|a| {
                json!({
                    "content": base64::engine::general_purpose::STANDARD.encode(&a.content),
                    "filename": &a.filename,
                    "type": &a.content_type,
                    "disposition": "attachment",
                })
            })
            .collect();
    }

    body
}

#[async_trait]
impl DeliveryTransport for SendGridTransport {
    fn name(&self) -> &str {
        "sendgrid"
    }

    /// Ask the API which scopes the key has; a 2xx means the key is live.
    async fn verify(&self) -> Result<(), TransportError> {
        let url = format!("{}/scopes", self.api_url.trim_end_matches("/mail/send"));
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| {
                TransportError::new(
                    TransportErrorKind::Connection,
                    format!("SendGrid unreachable: {e}"),
                )
                .with_command("GET scopes")
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(
            TransportError::new(
                TransportErrorKind::Rejected,
                format!("SendGrid refused the API key with status {status}"),
            )
            .with_code(status.as_u16().to_string())
            .with_command("GET scopes")
            .with_response(body.chars().take(1024).collect::<String>()),
        )
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<Delivery, TransportError> {
        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload(email))
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    TransportErrorKind::Timeout
                } else {
                    TransportErrorKind::Connection
                };
                TransportError::new(kind, format!("SendGrid request failed: {e}"))
                    .with_command("POST mail/send")
            })?;

        let status = resp.status();
        let message_id = resp
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        if status.is_success() {
            return Ok(Delivery {
                message_id,
                accepted: vec![email.to.clone()],
                rejected: Vec::new(),
            });
        }

        let body = resp
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(1024)
            .collect::<String>();

        Err(
            TransportError::new(
                TransportErrorKind::Rejected,
                format!("SendGrid rejected message with status {status}"),
            )
            .with_code(status.as_u16().to_string())
            .with_command("POST mail/send")
            .with_response(body),
        )
    }
}
