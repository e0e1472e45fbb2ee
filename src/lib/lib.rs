#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! Durable outbound mail dispatch.
//!
//! Producers place [`Message`](domain::messaging::Message)s on a
//! [`MessageQueue`](domain::messaging::MessageQueue); a
//! [`DispatchWorker`](domain::messaging::DispatchWorker) drains it on a fixed
//! interval through a pluggable [`Transport`](domain::messaging::Transport),
//! and spills whatever is left to disk when it stops.

pub mod domain;
pub mod infrastructure;
