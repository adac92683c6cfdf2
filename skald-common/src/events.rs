//! Event types and the broadcast event bus
//!
//! The engine publishes state through a single broadcast bus. Consumers
//! (SSE clients, the now-playing relay) subscribe; a subscription handle
//! doubles as the cancellation handle, so there is no observer
//! registration slot to clobber.

use crate::model::{NowPlaying, PlayState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events published by the playback engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Transport state changed (or was re-published with a new position).
    PlaybackStateChanged {
        state: PlayState,
        position_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Full now-playing snapshot for the notification / head-unit sink.
    NowPlaying {
        snapshot: NowPlaying,
        timestamp: DateTime<Utc>,
    },

    /// The active queue order or title changed (notification only;
    /// consumers re-fetch the materialized queue).
    QueueChanged { timestamp: DateTime<Utc> },
}

impl PlayerEvent {
    /// Event name used for SSE framing.
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::PlaybackStateChanged { .. } => "playback_state_changed",
            PlayerEvent::NowPlaying { .. } => "now_playing",
            PlayerEvent::QueueChanged { .. } => "queue_changed",
        }
    }
}

/// One-to-many event broadcaster over `tokio::sync::broadcast`.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Emit an event, failing when no subscriber is connected.
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case. Publishers must
    /// never block or fail on a missing consumer.
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(8);
        let event = PlayerEvent::QueueChanged {
            timestamp: Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());
        // Lossy emit must not fail.
        bus.emit_lossy(event);
    }

    #[tokio::test]
    async fn test_emit_with_subscriber() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit_lossy(PlayerEvent::PlaybackStateChanged {
            state: PlayState::Playing,
            position_ms: 1234,
            timestamp: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            PlayerEvent::PlaybackStateChanged {
                state, position_ms, ..
            } => {
                assert_eq!(state, PlayState::Playing);
                assert_eq!(position_ms, 1234);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_event_names() {
        let event = PlayerEvent::QueueChanged {
            timestamp: Utc::now(),
        };
        assert_eq!(event.name(), "queue_changed");
    }
}
