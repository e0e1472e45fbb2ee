//! Infrastructure: configuration, transports and on-disk storage

pub mod config;
pub mod email;
pub mod spool;
