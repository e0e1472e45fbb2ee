//! Durable message store

use async_trait::async_trait;

#[cfg(test)]
use mockall::mock;

use super::{errors::SpoolError, MessageQueue};

/// Keeps undelivered messages across a stop/start cycle.
///
/// Only used at lifecycle boundaries: [`store_remaining`](Self::store_remaining)
/// when the worker stops, [`restore_all`](Self::restore_all) when it starts.
#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    /// Make sure the storage location exists. Safe to call repeatedly.
    ///
    /// # Returns
    /// [`Err`] if the location cannot be created or is unusable.
    async fn ensure_directory(&self) -> Result<(), SpoolError>;

    /// Drain `queue` into storage.
    ///
    /// A failure to persist one message is logged and that message is lost;
    /// the remaining messages are still processed.
    ///
    /// # Returns
    /// The number of messages persisted, or [`Err`] if storage is unavailable,
    /// in which case `queue` is left untouched.
    async fn store_remaining(&self, queue: &MessageQueue) -> Result<usize, SpoolError>;

    /// Move every stored message back onto `queue`.
    ///
    /// # Returns
    /// The number of messages restored, or [`Err`] if storage is unavailable.
    async fn restore_all(&self, queue: &MessageQueue) -> Result<usize, SpoolError>;
}

#[cfg(test)]
mock! {
    pub MessageStore {}

    #[async_trait]
    impl MessageStore for MessageStore {
        async fn ensure_directory(&self) -> Result<(), SpoolError>;
        async fn store_remaining(&self, queue: &MessageQueue) -> Result<usize, SpoolError>;
        async fn restore_all(&self, queue: &MessageQueue) -> Result<usize, SpoolError>;
    }
}
