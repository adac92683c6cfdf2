//! Data models shared between the playback engine and its consumers

use serde::{Deserialize, Serialize};

/// Catalog song identifier.
pub type SongId = i64;

/// Sentinel used in the persisted record when no song is selected.
pub const SONG_ID_NONE: SongId = -1;

/// Label a queue falls back to when set with an empty title.
pub const DEFAULT_QUEUE_TITLE: &str = "All songs";

/// A catalog song. Immutable once loaded; owned by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: SongId,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_id: i64,
    pub duration_ms: i64,
    pub track_number: i64,
    /// Path of the media source on disk.
    pub path: String,
}

/// Transport state of the playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    /// Pre-initialization / released.
    #[default]
    None,
    Playing,
    Paused,
    Stopped,
}

impl PlayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayState::None => "none",
            PlayState::Playing => "playing",
            PlayState::Paused => "paused",
            PlayState::Stopped => "stopped",
        }
    }

    /// Parse a persisted value, defaulting unknowns to `None`.
    pub fn parse(value: &str) -> Self {
        match value {
            "playing" => PlayState::Playing,
            "paused" => PlayState::Paused,
            "stopped" => PlayState::Stopped,
            _ => PlayState::None,
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlayState::Playing)
    }
}

impl std::fmt::Display for PlayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repeat mode of the playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    None,
    One,
    All,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::None => "none",
            RepeatMode::One => "one",
            RepeatMode::All => "all",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "one" => RepeatMode::One,
            "all" => RepeatMode::All,
            _ => RepeatMode::None,
        }
    }

    /// Cycle order used by the repeat toggle: none -> all -> one -> none.
    pub fn cycled(&self) -> Self {
        match self {
            RepeatMode::None => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::None,
        }
    }
}

/// Shuffle mode of the playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShuffleMode {
    #[default]
    None,
    All,
}

impl ShuffleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShuffleMode::None => "none",
            ShuffleMode::All => "all",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "all" => ShuffleMode::All,
            _ => ShuffleMode::None,
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            ShuffleMode::None => ShuffleMode::All,
            ShuffleMode::All => ShuffleMode::None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ShuffleMode::All)
    }
}

/// Durable snapshot of the playback session, stored as a single row.
///
/// The ordered song-id list is stored separately, one row per queue slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord {
    /// Current song id, if any was selected when the snapshot was taken.
    pub current_id: Option<SongId>,
    pub seek_position_ms: i64,
    pub repeat_mode: RepeatMode,
    pub shuffle_mode: ShuffleMode,
    pub play_state: PlayState,
    pub title: String,
}

impl Default for QueueRecord {
    fn default() -> Self {
        Self {
            current_id: None,
            seek_position_ms: 0,
            repeat_mode: RepeatMode::None,
            shuffle_mode: ShuffleMode::None,
            play_state: PlayState::None,
            title: DEFAULT_QUEUE_TITLE.to_string(),
        }
    }
}

/// A materialized queue slot: position in the active order plus the
/// resolved song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub position: usize,
    pub song: Song,
}

/// Now-playing snapshot published to every state observer (notification,
/// head-unit relay, SSE clients).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub song_id: SongId,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_id: i64,
    pub duration_ms: i64,
    /// Cached artwork file, absent when no art could be decoded yet.
    pub art_path: Option<String>,
    pub position_ms: u64,
    pub playing: bool,
    pub shuffle_mode: ShuffleMode,
    pub repeat_mode: RepeatMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_play_state_round_trip() {
        for state in [
            PlayState::None,
            PlayState::Playing,
            PlayState::Paused,
            PlayState::Stopped,
        ] {
            assert_eq!(PlayState::parse(state.as_str()), state);
        }
        assert_eq!(PlayState::parse("garbage"), PlayState::None);
    }

    #[test]
    fn test_repeat_cycle() {
        assert_eq!(RepeatMode::None.cycled(), RepeatMode::All);
        assert_eq!(RepeatMode::All.cycled(), RepeatMode::One);
        assert_eq!(RepeatMode::One.cycled(), RepeatMode::None);
    }

    #[test]
    fn test_shuffle_toggle() {
        assert_eq!(ShuffleMode::None.toggled(), ShuffleMode::All);
        assert_eq!(ShuffleMode::All.toggled(), ShuffleMode::None);
    }

    #[test]
    fn test_queue_record_defaults() {
        let record = QueueRecord::default();
        assert_eq!(record.current_id, None);
        assert_eq!(record.play_state, PlayState::None);
        assert_eq!(record.title, DEFAULT_QUEUE_TITLE);
    }
}
