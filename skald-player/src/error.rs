//! Error types for skald-player
//!
//! Module-specific error types using thiserror for clear propagation.

use skald_common::model::SongId;
use thiserror::Error;

/// Main error type for the player service
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Queue precondition failures (e.g. first/last of an empty queue)
    #[error("Queue error: {0}")]
    Queue(String),

    /// Song id that does not resolve in the catalog
    #[error("Song not found: {0}")]
    SongNotFound(SongId),

    /// Artwork decode/encode errors (recovered locally, never fatal)
    #[error("Artwork error: {0}")]
    Artwork(String),
}

/// Convenience Result type using the player Error
pub type Result<T> = std::result::Result<T, Error>;
