//! SMTP transport implementation

use async_trait::async_trait;
use clap::Parser;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::messaging::{
    errors::{ConfigError, TransportError},
    Message, Transport,
};

/// SMTP configuration
#[derive(Clone, Debug, Parser)]
pub struct SmtpConfig {
    /// The SMTP host
    #[clap(long = "smtp-host", env = "SMTP_HOST")]
    pub host: Option<String>,

    /// The SMTP port
    #[clap(long = "smtp-port", env = "SMTP_PORT", default_value_t = 587)]
    pub port: u16,

    /// The SMTP username; credentials are only sent when this is set
    #[clap(long = "smtp-user", env = "SMTP_USER", default_value = "")]
    pub username: String,

    /// The SMTP password
    #[clap(long = "smtp-password", env = "SMTP_PASSWORD", default_value = "")]
    pub password: String,

    /// Upgrade the connection with STARTTLS
    #[clap(long = "smtp-use-tls", env = "SMTP_USE_TLS", default_value_t = true, action = clap::ArgAction::Set)]
    pub use_tls: bool,

    /// Verify the TLS certificate
    #[clap(long = "smtp-verify-tls", env = "SMTP_VERIFY_TLS", default_value_t = true, action = clap::ArgAction::Set)]
    pub verify_tls: bool,
}

/// SMTP mailer
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    host: String,
    config: SmtpConfig,
}

impl SmtpMailer {
    /// Create a new SMTP mailer
    ///
    /// # Errors
    /// [`ConfigError::MissingSetting`] if no host is configured, or
    /// [`ConfigError::InvalidSetting`] if the port is zero.
    pub fn new(config: SmtpConfig) -> Result<Self, ConfigError> {
        let host = config
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(ConfigError::MissingSetting("smtp_host"))?
            .to_string();

        if config.port == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "smtp_port",
                reason: "port must be non-zero".to_string(),
            });
        }

        Ok(Self { host, config })
    }

    /// Build a transport for a single delivery. Its connection is closed when
    /// it is dropped.
    fn mailer(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, TransportError> {
        let tls = if self.config.use_tls {
            Tls::Required(
                TlsParameters::builder(self.host.clone())
                    .dangerous_accept_invalid_certs(!self.config.verify_tls)
                    .build()?,
            )
        } else {
            Tls::None
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host)
            .port(self.config.port)
            .tls(tls);

        if !self.config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ));
        }

        Ok(builder.build())
    }
}

/// Converts a [`Message`] into a lettre message.
///
/// Every recipient is a direct `To` recipient. The body is the plain text
/// alone when there is no HTML, the HTML alone when there is no text, and a
/// `multipart/alternative` of both otherwise.
pub fn to_lettre_message(message: &Message) -> Result<lettre::Message, TransportError> {
    let mut builder = lettre::Message::builder()
        .from(message.from.as_str().parse::<Mailbox>()?)
        .subject(message.subject.clone());

    for recipient in &message.recipients {
        builder = builder.to(recipient.as_str().parse::<Mailbox>()?);
    }

    let text = || -> Result<SinglePart, TransportError> {
        Ok(SinglePart::builder()
            .header(content_type(&message.text_content_type)?)
            .body(message.text_body.clone()))
    };
    let html = || -> Result<SinglePart, TransportError> {
        Ok(SinglePart::builder()
            .header(content_type(&message.html_content_type)?)
            .body(message.html_body.clone()))
    };

    let email = if !message.is_html() {
        builder.singlepart(text()?)?
    } else if message.text_body.is_empty() {
        builder.singlepart(html()?)?
    } else {
        builder.multipart(MultiPart::alternative().singlepart(text()?).singlepart(html()?))?
    };

    Ok(email)
}

fn content_type(raw: &str) -> Result<ContentType, TransportError> {
    ContentType::parse(raw)
        .map_err(|e| TransportError::InvalidMessage(format!("content type {raw:?}: {e}")))
}

#[async_trait]
impl Transport for SmtpMailer {
    async fn deliver(
        &self,
        message: &Message,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        let email = to_lettre_message(message)?;

        if cancel.is_cancelled() {
            debug!(subject = %message.subject, "delivery cancelled before send");
            return Ok(());
        }

        let mailer = self.mailer()?;
        mailer.send(email).await?;

        debug!(
            host = %self.host,
            recipients = message.recipients.len(),
            "message sent over SMTP"
        );

        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}
