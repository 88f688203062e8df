pub mod followup;
pub mod notifications;
pub mod orchestrator;
pub mod queue;
pub mod sendgrid;
pub mod smtp;
pub mod template;
pub mod transport;

use std::sync::Arc;

use crate::config::Config;
use template::TemplateError;
use transport::{DeliveryTransport, LogTransport, TransportError};

/// Why a single send attempt did not go out.
#[derive(Debug)]
pub enum DeliveryError {
    Template(TemplateError),
    Render(String),
    Transport(TransportError),
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryError::Template(e) => write!(f, "{e}"),
            DeliveryError::Render(msg) => write!(f, "{msg}"),
            DeliveryError::Transport(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DeliveryError {}

impl From<TemplateError> for DeliveryError {
    fn from(err: TemplateError) -> Self {
        DeliveryError::Template(err)
    }
}

impl From<TransportError> for DeliveryError {
    fn from(err: TransportError) -> Self {
        DeliveryError::Transport(err)
    }
}

/// Pick the configured provider: SendGrid, then SMTP, then the logging fallback.
pub fn build_transport(config: &Config) -> Arc<dyn DeliveryTransport> {
    if let Some(sendgrid) = &config.sendgrid {
        match sendgrid::SendGridTransport::new(sendgrid) {
            Ok(transport) => {
                tracing::info!("Mail transport: SendGrid");
                return Arc::new(transport);
            }
            Err(e) => tracing::warn!("SendGrid not available: {e}"),
        }
    }

    if let Some(smtp) = &config.smtp {
        match smtp::SmtpTransport::new(smtp) {
            Ok(transport) => {
                tracing::info!("Mail transport: SMTP ({}:{})", smtp.host, smtp.port);
                return Arc::new(transport);
            }
            Err(e) => tracing::warn!("SMTP not available: {e}"),
        }
    }

    tracing::warn!("No mail provider configured, outgoing mail will only be logged");
    Arc::new(LogTransport)
}
