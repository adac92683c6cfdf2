//! # Skald Player Library
//!
//! Local music playback service: queue sequencing, dual-decoder gapless
//! playback, audio-focus arbitration, metadata/artwork publishing and
//! playback-state persistence, with an HTTP/SSE control surface.
//!
//! All queue and player state lives on a single control task; decoder
//! and focus callbacks are marshaled onto it as events.

pub mod api;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod playback;
pub mod service;
pub mod state;

pub use error::{Error, Result};
pub use state::SharedState;
