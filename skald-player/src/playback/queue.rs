//! Playback queue
//!
//! Owns the ordered song-id sequence, the shuffle projection, the
//! current-position tracking and all navigation/mutation operations.
//! The queue also owns the authoritative shuffle and repeat modes;
//! every navigation call reads them at call time.
//!
//! Not safe for concurrent mutation: all operations run on the engine
//! control task.

use crate::catalog::Catalog;
use crate::db;
use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use skald_common::events::{EventBus, PlayerEvent};
use skald_common::model::{
    QueueItem, RepeatMode, ShuffleMode, Song, SongId, DEFAULT_QUEUE_TITLE,
};
use sqlx::{Pool, Sqlite};
use tracing::debug;

/// Deterministic shuffle: a seeded random permutation of `order` with
/// `pinned` (when present in the order) moved to index 0, so resuming
/// shuffle never skips past the current track.
pub fn shuffle_order(order: &[SongId], seed: u64, pinned: Option<SongId>) -> Vec<SongId> {
    let mut shuffled = order.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);

    if let Some(pinned) = pinned {
        if let Some(index) = shuffled.iter().position(|&id| id == pinned) {
            let id = shuffled.remove(index);
            shuffled.insert(0, id);
        }
    }

    shuffled
}

pub struct Queue {
    ids: Vec<SongId>,
    /// Present only while shuffle is active; cleared when it turns off.
    shuffled_ids: Vec<SongId>,
    current_song_id: Option<SongId>,
    title: String,
    shuffle_mode: ShuffleMode,
    repeat_mode: RepeatMode,
    rng: StdRng,
    events: EventBus,
}

impl Queue {
    pub fn new(events: EventBus) -> Self {
        Self::with_seed(events, rand::thread_rng().gen())
    }

    /// Seeded constructor for deterministic shuffle in tests.
    pub fn with_seed(events: EventBus, seed: u64) -> Self {
        Self {
            ids: Vec::new(),
            shuffled_ids: Vec::new(),
            current_song_id: None,
            title: DEFAULT_QUEUE_TITLE.to_string(),
            shuffle_mode: ShuffleMode::None,
            repeat_mode: RepeatMode::None,
            rng: StdRng::seed_from_u64(seed),
            events,
        }
    }

    /// Replace the ordered sequence. Regenerates the shuffle projection
    /// when shuffle is active and notifies observers when the resulting
    /// active order is non-empty.
    pub fn set_ids(&mut self, new_ids: Vec<SongId>) {
        self.ids = new_ids;
        if self.shuffle_mode.is_active() {
            self.regenerate_shuffled();
        }
        self.notify_if_nonempty();
    }

    pub fn ids(&self) -> &[SongId] {
        &self.ids
    }

    /// The live order: shuffled while shuffle is active, base otherwise.
    pub fn active_ids(&self) -> &[SongId] {
        if self.shuffle_mode.is_active() {
            &self.shuffled_ids
        } else {
            &self.ids
        }
    }

    /// Empty titles coerce to the default label; observers are notified
    /// only on change.
    pub fn set_title(&mut self, new_title: &str) {
        let coerced = if new_title.is_empty() {
            DEFAULT_QUEUE_TITLE.to_string()
        } else {
            new_title.to_string()
        };
        if coerced != self.title {
            self.title = coerced;
            self.notify_if_nonempty();
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Toggling shuffle on regenerates the projection from scratch with
    /// the current id pinned first; toggling it off discards it.
    pub fn set_shuffle_mode(&mut self, mode: ShuffleMode) {
        self.shuffle_mode = mode;
        if mode.is_active() {
            self.regenerate_shuffled();
        } else {
            self.shuffled_ids.clear();
        }
        self.notify_if_nonempty();
    }

    pub fn shuffle_mode(&self) -> ShuffleMode {
        self.shuffle_mode
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn current_song_id(&self) -> Option<SongId> {
        self.current_song_id
    }

    pub fn set_current_song_id(&mut self, id: Option<SongId>) {
        self.current_song_id = id;
    }

    /// Position of the current id within the active order.
    pub fn current_song_index(&self) -> Option<usize> {
        let current = self.current_song_id?;
        self.active_ids().iter().position(|&id| id == current)
    }

    /// Id immediately before the current index, none at index 0 (or
    /// when no current id is set).
    pub fn previous_song_id(&self) -> Option<SongId> {
        let index = self.current_song_index()?;
        if index == 0 {
            return None;
        }
        Some(self.active_ids()[index - 1])
    }

    /// Next index in the active order. At the last index this wraps to
    /// 0 under repeat-all, otherwise there is no next. With no current
    /// id set, the first slot is next.
    pub fn next_song_index(&self) -> Option<usize> {
        let active = self.active_ids();
        let next = match self.current_song_index() {
            Some(index) => index + 1,
            None => 0,
        };
        if next < active.len() {
            Some(next)
        } else if self.repeat_mode == RepeatMode::All && !active.is_empty() {
            Some(0)
        } else {
            None
        }
    }

    pub fn next_song_id(&self) -> Option<SongId> {
        self.next_song_index().map(|index| self.active_ids()[index])
    }

    /// Reposition the element at `from` to `to` within the active
    /// order, preserving all other relative orderings.
    pub fn swap(&mut self, from: usize, to: usize) {
        let order = self.active_order_mut();
        if from >= order.len() || to >= order.len() {
            debug!("swap({}, {}) out of bounds, ignored", from, to);
            return;
        }
        let id = order.remove(from);
        order.insert(to, id);
        self.notify_if_nonempty();
    }

    /// Remove `id` from the active order and reinsert it immediately
    /// after the current index ("play next").
    pub fn move_to_next(&mut self, id: SongId) {
        let insert_at = self.current_song_index().map(|i| i + 1).unwrap_or(0);
        let order = self.active_order_mut();
        order.retain(|&other| other != id);
        let insert_at = insert_at.min(order.len());
        order.insert(insert_at, id);
        self.notify_if_nonempty();
    }

    /// Remove `id` from the base order and, when shuffle is active,
    /// from the shuffled order as well, keeping both consistent.
    /// Removing an id that is not queued is a no-op.
    pub fn remove(&mut self, id: SongId) {
        self.ids.retain(|&other| other != id);
        if self.shuffle_mode.is_active() {
            self.shuffled_ids.retain(|&other| other != id);
        }
        self.notify_if_nonempty();
    }

    pub fn first_id(&self) -> Result<SongId> {
        self.active_ids()
            .first()
            .copied()
            .ok_or_else(|| Error::Queue("first_id on empty queue".to_string()))
    }

    pub fn last_id(&self) -> Result<SongId> {
        self.active_ids()
            .last()
            .copied()
            .ok_or_else(|| Error::Queue("last_id on empty queue".to_string()))
    }

    /// Materialize the active order into resolved queue items. The
    /// catalog's bulk lookup is addressable by id, so the active order
    /// dictates the result order; ids the catalog cannot resolve are
    /// skipped.
    pub async fn as_queue_items(&self, catalog: &dyn Catalog) -> Result<Vec<QueueItem>> {
        let active = self.active_ids();
        let songs = catalog.songs_for_ids(active).await?;
        Ok(active
            .iter()
            .enumerate()
            .filter_map(|(position, id)| {
                songs.get(id).map(|song| QueueItem {
                    position,
                    song: song.clone(),
                })
            })
            .collect())
    }

    /// Resolve the current id to a full song. Fails when no current id
    /// is set or the catalog cannot resolve it.
    pub async fn current_song(&self, catalog: &dyn Catalog) -> Result<Song> {
        let id = self
            .current_song_id
            .ok_or_else(|| Error::Queue("no current song".to_string()))?;
        catalog.song(id).await
    }

    /// Hydrate the current id from the last persisted record when none
    /// is set.
    pub async fn ensure_current_id(&mut self, pool: &Pool<Sqlite>) -> Result<()> {
        if self.current_song_id.is_some() {
            return Ok(());
        }
        if let Some(record) = db::queue::get_queue_record(pool).await? {
            self.current_song_id = record.current_id;
        }
        Ok(())
    }

    /// Clear base order, shuffled order and current id.
    pub fn reset(&mut self) {
        self.ids.clear();
        self.shuffled_ids.clear();
        self.current_song_id = None;
    }

    fn active_order_mut(&mut self) -> &mut Vec<SongId> {
        if self.shuffle_mode.is_active() {
            &mut self.shuffled_ids
        } else {
            &mut self.ids
        }
    }

    fn regenerate_shuffled(&mut self) {
        let seed = self.rng.gen();
        self.shuffled_ids = shuffle_order(&self.ids, seed, self.current_song_id);
    }

    fn notify_if_nonempty(&self) {
        if !self.active_ids().is_empty() {
            self.events.emit_lossy(PlayerEvent::QueueChanged {
                timestamp: chrono::Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> Queue {
        Queue::with_seed(EventBus::new(8), 7)
    }

    #[test]
    fn test_shuffle_order_is_deterministic_and_pins_current() {
        let base = vec![1, 2, 3, 4, 5, 6, 7, 8];
        let a = shuffle_order(&base, 99, Some(5));
        let b = shuffle_order(&base, 99, Some(5));
        assert_eq!(a, b);
        assert_eq!(a[0], 5);

        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, base);
    }

    #[test]
    fn test_shuffle_on_includes_every_id_once_current_first() {
        let mut q = queue();
        q.set_ids(vec![10, 20, 30, 40, 50]);
        q.set_current_song_id(Some(30));
        q.set_shuffle_mode(ShuffleMode::All);

        let active = q.active_ids().to_vec();
        assert_eq!(active.len(), 5);
        assert_eq!(active[0], 30);
        let mut sorted = active.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_shuffle_off_clears_projection() {
        let mut q = queue();
        q.set_ids(vec![1, 2, 3]);
        q.set_shuffle_mode(ShuffleMode::All);
        assert_eq!(q.active_ids().len(), 3);

        q.set_shuffle_mode(ShuffleMode::None);
        assert_eq!(q.active_ids(), &[1, 2, 3]);
        assert!(q.shuffled_ids.is_empty());
    }

    #[test]
    fn test_set_ids_regenerates_while_shuffle_active() {
        let mut q = queue();
        q.set_ids(vec![1, 2, 3]);
        q.set_current_song_id(Some(2));
        q.set_shuffle_mode(ShuffleMode::All);

        q.set_ids(vec![4, 5, 6, 2]);
        let active = q.active_ids().to_vec();
        assert_eq!(active.len(), 4);
        assert_eq!(active[0], 2);
    }

    #[test]
    fn test_navigation_plain_order() {
        let mut q = queue();
        q.set_ids(vec![10, 20, 30]);
        q.set_current_song_id(Some(20));

        assert_eq!(q.current_song_index(), Some(1));
        assert_eq!(q.previous_song_id(), Some(10));
        assert_eq!(q.next_song_index(), Some(2));
        assert_eq!(q.next_song_id(), Some(30));
    }

    #[test]
    fn test_next_at_end_without_repeat_is_none() {
        let mut q = queue();
        q.set_ids(vec![10, 20, 30]);
        q.set_current_song_id(Some(30));

        assert_eq!(q.next_song_index(), None);
        assert_eq!(q.next_song_id(), None);

        q.set_repeat_mode(RepeatMode::One);
        assert_eq!(q.next_song_index(), None);
    }

    #[test]
    fn test_repeat_all_wraps_to_first() {
        let mut q = queue();
        q.set_ids(vec![1, 2, 3]);
        q.set_current_song_id(Some(3));
        q.set_repeat_mode(RepeatMode::All);

        assert_eq!(q.next_song_index(), Some(0));
        assert_eq!(q.next_song_id(), Some(1));
    }

    #[test]
    fn test_previous_at_start_is_none() {
        let mut q = queue();
        q.set_ids(vec![1, 2, 3]);
        q.set_current_song_id(Some(1));
        assert_eq!(q.previous_song_id(), None);
    }

    #[test]
    fn test_no_current_id_navigation() {
        let mut q = queue();
        q.set_ids(vec![5, 6]);
        assert_eq!(q.current_song_index(), None);
        assert_eq!(q.previous_song_id(), None);
        // With nothing selected the first slot is next.
        assert_eq!(q.next_song_id(), Some(5));
    }

    #[test]
    fn test_swap_is_a_reposition_and_invertible() {
        let mut q = queue();
        q.set_ids(vec![1, 2, 3, 4]);

        q.swap(0, 2);
        assert_eq!(q.active_ids(), &[2, 3, 1, 4]);

        q.swap(2, 0);
        assert_eq!(q.active_ids(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_swap_acts_on_shuffled_order_when_active() {
        let mut q = queue();
        q.set_ids(vec![1, 2, 3]);
        q.set_shuffle_mode(ShuffleMode::All);

        let before = q.active_ids().to_vec();
        q.swap(0, 2);
        let after = q.active_ids().to_vec();
        assert_eq!(after[2], before[0]);
        // The base order is untouched.
        assert_eq!(q.ids(), &[1, 2, 3]);
    }

    #[test]
    fn test_move_to_next_noop_when_already_next() {
        let mut q = queue();
        q.set_ids(vec![1, 5, 2, 3]);
        q.set_current_song_id(Some(1));

        q.move_to_next(5);
        assert_eq!(q.active_ids(), &[1, 5, 2, 3]);
    }

    #[test]
    fn test_move_to_next_pulls_id_forward() {
        let mut q = queue();
        q.set_ids(vec![1, 2, 3, 5]);
        q.set_current_song_id(Some(1));

        q.move_to_next(5);
        assert_eq!(q.active_ids(), &[1, 5, 2, 3]);
    }

    #[test]
    fn test_remove_updates_both_orders() {
        let mut q = queue();
        q.set_ids(vec![1, 2, 3]);
        q.set_shuffle_mode(ShuffleMode::All);

        q.remove(2);
        assert_eq!(q.ids(), &[1, 3]);
        assert_eq!(q.active_ids().len(), 2);
        assert!(!q.active_ids().contains(&2));
    }

    #[test]
    fn test_remove_absent_id_is_idempotent() {
        let mut q = queue();
        q.set_ids(vec![1, 2, 3]);

        q.remove(99);
        q.remove(99);
        assert_eq!(q.ids(), &[1, 2, 3]);
    }

    #[test]
    fn test_remove_then_last_id() {
        let mut q = queue();
        q.set_ids(vec![10, 20, 30]);
        q.set_current_song_id(Some(20));
        assert_eq!(q.next_song_id(), Some(30));

        q.remove(30);
        assert_eq!(q.last_id().unwrap(), 20);
        assert_eq!(q.next_song_id(), None);
    }

    #[test]
    fn test_first_last_error_on_empty() {
        let q = queue();
        assert!(matches!(q.first_id(), Err(Error::Queue(_))));
        assert!(matches!(q.last_id(), Err(Error::Queue(_))));
    }

    #[test]
    fn test_title_coercion_to_default() {
        let mut q = queue();
        q.set_title("Evening run");
        assert_eq!(q.title(), "Evening run");

        q.set_title("");
        assert_eq!(q.title(), DEFAULT_QUEUE_TITLE);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut q = queue();
        q.set_ids(vec![1, 2]);
        q.set_current_song_id(Some(1));
        q.set_shuffle_mode(ShuffleMode::All);

        q.reset();
        assert!(q.ids().is_empty());
        assert!(q.active_ids().is_empty());
        assert_eq!(q.current_song_id(), None);
    }

    #[tokio::test]
    async fn test_queue_changed_event_on_nonempty_set() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let mut q = Queue::with_seed(bus, 1);

        q.set_ids(vec![]);
        q.set_ids(vec![1, 2]);

        // Only the non-empty replacement notifies.
        match rx.try_recv().unwrap() {
            PlayerEvent::QueueChanged { .. } => {}
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }
}
