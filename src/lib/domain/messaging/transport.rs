//! Transport module

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
use mockall::mock;

use super::{errors::TransportError, Message};

/// Delivers one message over a specific channel.
///
/// Implementations convert the [`Message`] into the channel's native request,
/// make a single delivery attempt and release any connection before returning.
/// They never retry and never split the recipient list.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Deliver a message
    ///
    /// # Arguments
    /// * `message` - The [`Message`] to deliver.
    /// * `cancel` - Checked once before the network call starts. If it is
    ///   already cancelled the send is skipped and `Ok(())` is returned; an
    ///   in-flight call is never interrupted.
    ///
    /// # Returns
    /// A [`Result`] which is [`Ok`] if the message was accepted, or an [`Err`]
    /// carrying the underlying [`TransportError`].
    async fn deliver(
        &self,
        message: &Message,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError>;

    /// Short name used in log output
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mock! {
    pub Transport {}

    #[async_trait]
    impl Transport for Transport {
        async fn deliver(&self, message: &Message, cancel: &CancellationToken) -> Result<(), TransportError>;
        fn name(&self) -> &'static str;
    }
}
