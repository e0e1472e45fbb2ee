//! Producer-facing sender

use async_trait::async_trait;
use tracing::debug;

use super::{Message, MessageQueue};

/// Places messages on the outbound path.
///
/// Sending is fire-and-forget: it never fails and never reports the delivery
/// outcome, which only shows up in the logs.
#[async_trait]
pub trait MessageSender: Clone + Send + Sync + 'static {
    /// Hand a message over for delivery
    ///
    /// # Arguments
    /// * `message` - The [`Message`] to send.
    async fn send_message(&self, message: Message);
}

/// [`MessageSender`] that enqueues onto a [`MessageQueue`].
///
/// A message whose recipients must not see each other is split into one
/// message per recipient here; transports never split.
#[derive(Debug, Clone)]
pub struct QueuedSender {
    queue: MessageQueue,
}

impl QueuedSender {
    /// Create a sender feeding `queue`
    pub fn new(queue: MessageQueue) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl MessageSender for QueuedSender {
    async fn send_message(&self, message: Message) {
        for message in message.split_recipients() {
            debug!(subject = %message.subject, recipients = message.recipients.len(), "queueing message");
            self.queue.enqueue(message);
        }
    }
}
