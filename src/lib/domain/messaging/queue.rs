//! Dispatch queue

use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;

use super::Message;

/// Unbounded FIFO of messages waiting to be delivered.
///
/// Cloning yields another handle to the same queue; one instance is created at
/// startup and shared between producers and the
/// [`DispatchWorker`](super::DispatchWorker). Every operation takes the
/// internal lock for a single push or pop only.
#[derive(Debug, Clone, Default)]
pub struct MessageQueue {
    messages: Arc<Mutex<VecDeque<Message>>>,
}

impl MessageQueue {
    /// Create a new empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the tail of the queue
    pub fn enqueue(&self, message: Message) {
        self.messages.lock().push_back(message);
    }

    /// Remove and return the message at the head of the queue, if any
    pub fn try_dequeue(&self) -> Option<Message> {
        self.messages.lock().pop_front()
    }

    /// Number of messages currently queued
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}
