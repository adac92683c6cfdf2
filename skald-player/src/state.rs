//! Shared playback state
//!
//! Thread-safe snapshot of the published session state, plus the event
//! bus. Written only by the engine control task; read concurrently by
//! HTTP handlers and the SSE relay.

use skald_common::events::EventBus;
use skald_common::model::{
    NowPlaying, PlayState, QueueItem, RepeatMode, ShuffleMode, DEFAULT_QUEUE_TITLE,
};
use tokio::sync::RwLock;

/// Published transport snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportSnapshot {
    pub state: PlayState,
    pub position_ms: u64,
    pub shuffle_mode: ShuffleMode,
    pub repeat_mode: RepeatMode,
    pub queue_title: String,
}

impl Default for TransportSnapshot {
    fn default() -> Self {
        Self {
            state: PlayState::None,
            position_ms: 0,
            shuffle_mode: ShuffleMode::None,
            repeat_mode: RepeatMode::None,
            queue_title: DEFAULT_QUEUE_TITLE.to_string(),
        }
    }
}

/// Shared state accessible by all components.
pub struct SharedState {
    transport: RwLock<TransportSnapshot>,
    now_playing: RwLock<Option<NowPlaying>>,
    queue_items: RwLock<Vec<QueueItem>>,
    /// Event broadcaster for state observers.
    pub events: EventBus,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            transport: RwLock::new(TransportSnapshot::default()),
            now_playing: RwLock::new(None),
            queue_items: RwLock::new(Vec::new()),
            events: EventBus::new(100),
        }
    }

    pub async fn transport(&self) -> TransportSnapshot {
        self.transport.read().await.clone()
    }

    pub async fn set_transport(&self, snapshot: TransportSnapshot) {
        *self.transport.write().await = snapshot;
    }

    pub async fn now_playing(&self) -> Option<NowPlaying> {
        self.now_playing.read().await.clone()
    }

    pub async fn set_now_playing(&self, snapshot: Option<NowPlaying>) {
        *self.now_playing.write().await = snapshot;
    }

    pub async fn queue_items(&self) -> Vec<QueueItem> {
        self.queue_items.read().await.clone()
    }

    pub async fn set_queue_items(&self, items: Vec<QueueItem>) {
        *self.queue_items.write().await = items;
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
