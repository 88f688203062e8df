use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::transport::{Delivery, DeliveryTransport, OutgoingEmail, TransportError, TransportErrorKind};
use crate::config::SmtpConfig;

pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self, String> {
        let creds = Credentials::new(config.user.clone(), config.pass.clone());

        let transport = if config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| format!("SMTP relay error: {e}"))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| format!("SMTP starttls error: {e}"))?
        }
        .port(config.port)
        .credentials(creds)
        .build();

        Ok(Self { transport })
    }
}

fn build_message(email: &OutgoingEmail) -> Result<Message, TransportError> {
    let builder = Message::builder()
        .from(email.from.parse().map_err(|e| {
            TransportError::new(TransportErrorKind::Build, format!("Invalid from address: {e}"))
        })?)
        .to(email.to.parse().map_err(|e| {
            TransportError::new(TransportErrorKind::Build, format!("Invalid to address: {e}"))
        })?)
        .subject(email.subject.clone());

    let message = if email.attachments.is_empty() {
        builder
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone())
    } else {
        let mut parts = MultiPart::mixed().singlepart(SinglePart::html(email.html.clone()));
        for attachment in &email.attachments {
            let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                TransportError::new(
                    TransportErrorKind::Build,
                    format!("Invalid attachment content type: {e}"),
                )
            })?;
            parts = parts.singlepart(
                MimeAttachment::new(attachment.filename.clone())
                    .body(attachment.content.clone(), content_type),
            );
        }
        builder.multipart(parts)
    };

    message.map_err(|e| {
        TransportError::new(TransportErrorKind::Build, format!("Failed to build email: {e}"))
    })
}

#[async_trait]
impl DeliveryTransport for SmtpTransport {
    fn name(&self) -> &str {
        "smtp"
    }

    /// Open a connection and authenticate without sending anything.
    async fn verify(&self) -> Result<(), TransportError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(TransportError::new(
                TransportErrorKind::Connection,
                "SMTP server did not accept the connection check",
            )
            .with_command("NOOP")),
            Err(e) => {
                let mut err = TransportError::new(
                    TransportErrorKind::Connection,
                    format!("SMTP connection check failed: {e}"),
                )
                .with_command("CONN");
                if let Some(code) = e.status() {
                    err = err.with_code(code.to_string());
                }
                Err(err)
            }
        }
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<Delivery, TransportError> {
        let message = build_message(email)?;
        let message_id = message
            .headers()
            .get_raw("Message-ID")
            .map(|id| id.to_string());

        match self.transport.send(message).await {
            Ok(response) => {
                tracing::debug!(
                    "SMTP accepted message for {} ({})",
                    email.to,
                    response.code()
                );
                Ok(Delivery {
                    message_id,
                    accepted: vec![email.to.clone()],
                    rejected: Vec::new(),
                })
            }
            Err(e) => {
                let kind = if e.is_timeout() {
                    TransportErrorKind::Timeout
                } else if e.is_permanent() || e.is_transient() {
                    TransportErrorKind::Rejected
                } else {
                    TransportErrorKind::Connection
                };
                let mut err = TransportError::new(kind, format!("Failed to send email: {e}"));
                if let Some(code) = e.status() {
                    err = err.with_code(code.to_string());
                }
                Err(err)
            }
        }
    }
}
