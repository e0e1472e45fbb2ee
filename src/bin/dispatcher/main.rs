#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! Mail dispatcher host process

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use mail_dispatch::{
    domain::messaging::{
        templates::TemplateLoader, DispatchWorker, Message, MessageBuilder, MessageQueue,
        MessageSender, QueuedSender,
    },
    infrastructure::{config::MessagingConfig, email::select_transport, spool::FileSpool},
};
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line arguments / environment variables
#[derive(Debug, Parser)]
pub struct Args {
    /// The messaging configuration
    #[clap(flatten)]
    pub messaging: MessagingConfig,

    /// Queue one message to these `;`-separated recipients at startup
    #[clap(long)]
    pub to: Option<String>,

    /// Subject of the startup message
    #[clap(long, default_value = "")]
    pub subject: String,

    /// Plain text body of the startup message
    #[clap(long)]
    pub body: Option<String>,

    /// Template directory for the startup message
    #[clap(long, env = "MAIL_TEMPLATE_DIR")]
    pub template_dir: Option<PathBuf>,

    /// Template name for the startup message
    #[clap(long)]
    pub template: Option<String>,

    /// Template language, e.g. `en-US`
    #[clap(long)]
    pub language: Option<String>,
}

#[mutants::skip]
#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load environment: {}", e);

            return Err(e.into());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let transport = select_transport(&args.messaging)?;

    let startup = match &args.to {
        Some(to) => Some(startup_message(&args, to)?),
        None => None,
    };

    let queue = MessageQueue::new();
    let spool = Arc::new(FileSpool::new(&args.messaging.spool_dir));

    let mut worker = DispatchWorker::new(
        queue.clone(),
        transport,
        spool,
        args.messaging.queue_interval(),
    );

    worker.start().await?;

    if let Some(message) = startup {
        QueuedSender::new(queue.clone()).send_message(message).await;
    }

    shutdown_signal().await;

    if let Err(e) = worker.stop().await {
        warn!(error = %e, "shutdown spill failed");
    }

    info!("dispatcher exited");

    Ok(())
}

fn startup_message(args: &Args, to: &str) -> Result<Message> {
    let from = args
        .messaging
        .from_address
        .as_deref()
        .context("--from-address (MAIL_FROM) is required to send a message")?;

    let mut builder = MessageBuilder::new()
        .from(from)
        .to_list(to)
        .subject(&args.subject)
        .tokens(args.messaging.token_map());

    if let Some(body) = &args.body {
        builder = builder.text_body(body);
    }

    if let (Some(dir), Some(name)) = (&args.template_dir, &args.template) {
        let loader = TemplateLoader::new(dir)?;
        builder = builder.template(&loader, name, args.language.as_deref());
    }

    Ok(builder.build()?)
}

#[mutants::skip]
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    debug!("shutting down gracefully");
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    fn args(extra: &[&str]) -> TestResult<Args> {
        Ok(Args::try_parse_from(
            ["dispatcher"].into_iter().chain(extra.iter().copied()),
        )?)
    }

    #[test]
    fn test_startup_message_requires_sender() -> TestResult {
        let mut args = args(&["--to", "a@example.com"])?;
        args.messaging.from_address = None;

        assert!(startup_message(&args, "a@example.com").is_err());

        Ok(())
    }

    #[test]
    fn test_startup_message_rejects_missing_template_dir() -> TestResult {
        let mut args = args(&[
            "--to",
            "a@example.com",
            "--template-dir",
            "/definitely/not/a/template/dir",
            "--template",
            "welcome",
        ])?;
        args.messaging.from_address = Some("from@example.com".to_string());

        assert!(startup_message(&args, "a@example.com").is_err());

        Ok(())
    }

    #[test]
    fn test_startup_message_is_built_from_flags() -> TestResult {
        let mut args = args(&[
            "--to",
            "a@example.com;b@example.com",
            "--subject",
            "Hello",
            "--body",
            "Hi $NAME$",
            "--token",
            "NAME=there",
        ])?;
        args.messaging.from_address = Some("from@example.com".to_string());

        let message = startup_message(&args, "a@example.com;b@example.com")?;

        assert_eq!(message.recipients.len(), 2);
        assert_eq!(message.subject, "Hello");
        assert_eq!(message.text_body, "Hi there");

        Ok(())
    }
}
