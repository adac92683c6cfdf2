//! # Skald Common Library
//!
//! Shared code for the Skald music player:
//! - Song and queue data models
//! - Transport, repeat and shuffle mode enums
//! - Event types and the broadcast event bus

pub mod events;
pub mod model;

pub use events::{EventBus, PlayerEvent};
pub use model::{
    NowPlaying, PlayState, QueueItem, QueueRecord, RepeatMode, ShuffleMode, Song, SongId,
    DEFAULT_QUEUE_TITLE, SONG_ID_NONE,
};
