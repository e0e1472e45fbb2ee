//! Transport selection

use std::{fmt, str::FromStr, sync::Arc};

use tracing::info;

use crate::domain::messaging::{errors::ConfigError, Transport};

use super::config::MessagingConfig;

pub mod api;
pub mod smtp;

pub use api::{ApiConfig, ApiMailer};
pub use smtp::{SmtpConfig, SmtpMailer};

/// Supported transport kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Direct SMTP relay
    Smtp,

    /// HTTPS mail API authenticated with an API key
    Api,
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smtp" => Ok(Self::Smtp),
            "api" | "sendgrid" => Ok(Self::Api),
            _ => Err(ConfigError::UnknownTransport(s.to_string())),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Smtp => write!(f, "smtp"),
            Self::Api => write!(f, "api"),
        }
    }
}

/// Construct the transport named by `config`.
///
/// Called once at startup; every configuration problem surfaces here rather
/// than on the first delivery.
///
/// # Errors
/// - [`ConfigError::UnknownTransport`] for an unsupported kind
/// - [`ConfigError::MissingSetting`] / [`ConfigError::InvalidSetting`] if the
///   selected transport is not fully configured
pub fn select_transport(config: &MessagingConfig) -> Result<Arc<dyn Transport>, ConfigError> {
    let kind: TransportKind = config.transport.parse()?;

    info!(transport = %kind, "selected transport");

    Ok(match kind {
        TransportKind::Smtp => Arc::new(SmtpMailer::new(config.smtp.clone())?),
        TransportKind::Api => Arc::new(ApiMailer::new(config.api.clone())?),
    })
}
