//! HTTP mail API transport.
//!
//! Speaks the SendGrid v3 `mail/send` JSON shape: one personalization holding
//! every recipient, and the text and HTML bodies attached directly as content
//! entries.

use async_trait::async_trait;
use clap::Parser;
use reqwest::{Client, Url};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::messaging::{
    errors::{ConfigError, TransportError},
    Message, Transport,
};

/// Default endpoint for the mail API
pub const DEFAULT_API_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Mail API configuration
#[derive(Clone, Debug, Parser)]
pub struct ApiConfig {
    /// The API key, sent as a bearer token
    #[clap(long = "api-key", env = "MAIL_API_KEY")]
    pub api_key: Option<String>,

    /// The send endpoint
    #[clap(long = "api-url", env = "MAIL_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

/// Request body for a single send
#[derive(Debug, Serialize, PartialEq, Eq)]
struct MailRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
}

impl<'a> From<&'a Message> for MailRequest<'a> {
    fn from(message: &'a Message) -> Self {
        let mut content = Vec::with_capacity(2);

        if !message.text_body.is_empty() || !message.is_html() {
            content.push(Content {
                content_type: &message.text_content_type,
                value: &message.text_body,
            });
        }

        if message.is_html() {
            content.push(Content {
                content_type: &message.html_content_type,
                value: &message.html_body,
            });
        }

        Self {
            personalizations: vec![Personalization {
                to: message
                    .recipients
                    .iter()
                    .map(|r| Address { email: r.as_str() })
                    .collect(),
            }],
            from: Address {
                email: message.from.as_str(),
            },
            subject: &message.subject,
            content,
        }
    }
}

/// Mailer posting messages to an HTTP mail API
#[derive(Debug, Clone)]
pub struct ApiMailer {
    client: Client,
    api_key: String,
    url: Url,
}

impl ApiMailer {
    /// Create a new API mailer
    ///
    /// # Errors
    /// [`ConfigError::MissingSetting`] without an API key, or
    /// [`ConfigError::InvalidSetting`] if the URL does not parse.
    pub fn new(config: ApiConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingSetting("api_key"))?;

        let url = Url::parse(&config.api_url).map_err(|e| ConfigError::InvalidSetting {
            name: "api_url",
            reason: e.to_string(),
        })?;

        // No idle connections are kept between sends.
        let client = Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| ConfigError::InvalidSetting {
                name: "api_client",
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            api_key,
            url,
        })
    }
}

#[async_trait]
impl Transport for ApiMailer {
    async fn deliver(
        &self,
        message: &Message,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        let request = MailRequest::from(message);

        if cancel.is_cancelled() {
            debug!(subject = %message.subject, "delivery cancelled before send");
            return Ok(());
        }

        let response = self
            .client
            .post(self.url.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(
            status = status.as_u16(),
            recipients = message.recipients.len(),
            "message accepted by mail API"
        );

        Ok(())
    }

    fn name(&self) -> &'static str {
        "api"
    }
}
