//! Database access layer
//!
//! SQLite via sqlx: schema initialization plus the queue persistence
//! gateway.

pub mod init;
pub mod queue;
