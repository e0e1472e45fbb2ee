//! Outbound messaging: messages, the dispatch queue and the background worker.

mod builder;
mod email_address;
mod message;
mod queue;
mod sender;
mod store;
mod transport;
mod user;
mod worker;

pub mod errors;
pub mod templates;

pub use builder::{MessageBuilder, MessageSettings};
pub use email_address::{EmailAddress, EmailAddressError};
pub use message::{Message, DEFAULT_HTML_CONTENT_TYPE, DEFAULT_TEXT_CONTENT_TYPE};
pub use queue::MessageQueue;
pub use sender::{MessageSender, QueuedSender};
pub use store::MessageStore;
pub use transport::Transport;
pub use user::MessageUser;
pub use worker::{DispatchWorker, DrainReport, WorkerState};

#[cfg(test)]
pub mod tests {
    pub use super::store::MockMessageStore;
    pub use super::transport::MockTransport;
}
