use async_trait::async_trait;
use serde::Serialize;

/// A fully rendered message ready for hand-off to a provider.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<Attachment>,
}

impl OutgoingEmail {
    pub fn html(to: &str, from: &str, subject: &str, html: String) -> Self {
        Self {
            to: to.to_string(),
            from: from.to_string(),
            subject: subject.to_string(),
            html,
            attachments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// What the provider reported back for a dispatched message.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Delivery {
    pub message_id: Option<String>,
    pub accepted: Vec<String>,
    pub rejected: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// The message could not be built (bad address, bad header).
    Build,
    /// Connecting to or talking with the provider failed.
    Connection,
    /// The provider answered and refused the message.
    Rejected,
    /// The call did not finish within the configured timeout.
    Timeout,
}

/// Provider failure with whatever diagnostics the provider gave us.
#[derive(Debug, Clone, Serialize)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    pub code: Option<String>,
    pub command: Option<String>,
    pub response: Option<String>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            command: None,
            response: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(code) = &self.code {
            write!(f, " (code {code})")?;
        }
        if let Some(response) = &self.response {
            write!(f, ": {response}")?;
        }
        Ok(())
    }
}

impl std::error::Error for TransportError {}

/// The outbound mail provider. Every sender in the pipeline talks to this
/// trait, never to a concrete client.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, email: &OutgoingEmail) -> Result<Delivery, TransportError>;

    /// Check that the provider is reachable and accepts our credentials
    /// without sending anything.
    async fn verify(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Accepts everything and only logs it. Used when no provider is configured.
pub struct LogTransport;

#[async_trait]
impl DeliveryTransport for LogTransport {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<Delivery, TransportError> {
        tracing::info!(
            "[log transport] to={} from={} subject={:?} ({} bytes html)",
            email.to,
            email.from,
            email.subject,
            email.html.len()
        );
        Ok(Delivery {
            message_id: None,
            accepted: vec![email.to.clone()],
            rejected: Vec::new(),
        })
    }
}

/// Send with a hard deadline; a timeout counts as an ordinary failed attempt.
pub async fn send_with_timeout(
    transport: &dyn DeliveryTransport,
    email: &OutgoingEmail,
    timeout: std::time::Duration,
) -> Result<Delivery, TransportError> {
    match tokio::time::timeout(timeout, transport.send(email)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::new(
            TransportErrorKind::Timeout,
            format!(
                "{} transport timed out after {}s",
                transport.name(),
                timeout.as_secs()
            ),
        )),
    }
}
