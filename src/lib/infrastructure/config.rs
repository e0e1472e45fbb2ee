//! Messaging configuration

use std::{collections::HashMap, path::PathBuf, time::Duration};

use clap::Parser;

use super::email::{ApiConfig, SmtpConfig};

/// Messaging configuration, read from command-line arguments or the environment
#[derive(Clone, Debug, Parser)]
pub struct MessagingConfig {
    /// The transport to deliver through: `smtp` or `api`
    #[clap(long = "transport", env = "MAIL_TRANSPORT", default_value = "smtp")]
    pub transport: String,

    /// SMTP settings
    #[clap(flatten)]
    pub smtp: SmtpConfig,

    /// Mail API settings
    #[clap(flatten)]
    pub api: ApiConfig,

    /// Default sender address
    #[clap(long = "from-address", env = "MAIL_FROM")]
    pub from_address: Option<String>,

    /// Seconds between queue drain passes
    #[clap(
        long = "queue-interval-secs",
        env = "MAIL_QUEUE_INTERVAL_SECS",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub queue_interval_secs: u64,

    /// Directory undelivered messages are spilled to on shutdown
    #[clap(long = "spool-dir", env = "MAIL_SPOOL_DIR", default_value = "data/messages")]
    pub spool_dir: PathBuf,

    /// Static template tokens as `KEY=VALUE`
    #[clap(
        long = "token",
        env = "MAIL_TOKENS",
        value_delimiter = ',',
        value_parser = parse_token
    )]
    pub tokens: Vec<(String, String)>,
}

impl MessagingConfig {
    /// Time between queue drain passes
    pub fn queue_interval(&self) -> Duration {
        Duration::from_secs(self.queue_interval_secs)
    }

    /// The static tokens as a map; later duplicates win
    pub fn token_map(&self) -> HashMap<String, String> {
        self.tokens.iter().cloned().collect()
    }
}

fn parse_token(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty token name in {raw:?}"));
    }

    Ok((key.to_string(), value.to_string()))
}
