//! Playback engine
//!
//! The Queue owns the authoritative play order and modes; the
//! SongPlayer orchestrates the two decoders, the session state machine
//! and persistence. Everything mutates on a single control task.

pub mod artwork;
pub mod decoder;
pub mod focus;
pub mod player;
pub mod queue;

pub use artwork::ArtworkCache;
pub use decoder::{Decoder, DecoderEvent, DecoderId, SinkDecoder};
pub use focus::{AudioFocus, FocusChange, NoopFocus};
pub use player::{Command, EngineEvent, PlayerHandle, SongPlayer};
pub use queue::Queue;
