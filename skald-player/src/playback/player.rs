//! Playback engine
//!
//! The SongPlayer owns the queue, the two decoders and the session
//! state machine. Every input (commands, decoder callbacks, focus
//! changes) arrives as an `EngineEvent` on a single mpsc channel and is
//! handled sequentially on the control task, so no engine state needs
//! its own lock.
//!
//! Track completion is handled uniformly: completions carry the decoder
//! id they came from, and only the active decoder's completion advances
//! the session. A completion from the standby decoder is stale by
//! definition and is logged and dropped.

use std::mem;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::{Pool, Sqlite};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use skald_common::events::PlayerEvent;
use skald_common::model::{
    NowPlaying, PlayState, QueueRecord, RepeatMode, ShuffleMode, SongId,
};

use crate::catalog::Catalog;
use crate::db;
use crate::error::Result;
use crate::state::{SharedState, TransportSnapshot};

use super::artwork::ArtworkCache;
use super::decoder::{Decoder, DecoderEvent, DecoderId};
use super::focus::{AudioFocus, FocusChange};
use super::queue::Queue;

/// Control commands accepted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    TogglePlayPause,
    Next,
    Previous,
    Seek { position_ms: u64 },
    SetShuffleMode(ShuffleMode),
    ToggleShuffle,
    SetRepeatMode(RepeatMode),
    CycleRepeat,
    /// Start playback of `id`, optionally replacing the queue first.
    PlayFromId {
        id: SongId,
        ids: Option<Vec<SongId>>,
        title: Option<String>,
    },
    /// Replace the queue without changing playback.
    SetQueue {
        ids: Vec<SongId>,
        title: Option<String>,
    },
    /// Restart the current track from the beginning.
    RepeatSong,
    /// Advance, wrapping from the last track back to the first.
    RepeatQueue,
    /// Reposition `id` directly after the current track.
    PlayNext { id: SongId },
    SwapQueueSongs { from: usize, to: usize },
    RemoveFromQueue { id: SongId },
    Stop,
    /// Save the session and tear the engine down.
    Release,
}

/// Everything that can wake the control task.
#[derive(Debug)]
pub enum EngineEvent {
    Command(Command),
    Decoder { id: DecoderId, event: DecoderEvent },
    Focus(FocusChange),
}

/// Cheap cloneable handle for submitting commands and reading state.
#[derive(Clone)]
pub struct PlayerHandle {
    tx: UnboundedSender<EngineEvent>,
    state: Arc<SharedState>,
}

impl PlayerHandle {
    pub fn new(tx: UnboundedSender<EngineEvent>, state: Arc<SharedState>) -> Self {
        Self { tx, state }
    }

    /// Fire-and-forget command submission. A closed channel means the
    /// engine has shut down; the command is dropped with a warning.
    pub fn send(&self, command: Command) {
        if self.tx.send(EngineEvent::Command(command)).is_err() {
            warn!("Playback engine is not running, command dropped");
        }
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }
}

pub struct SongPlayer {
    queue: Queue,
    catalog: Arc<dyn Catalog>,
    db: Pool<Sqlite>,
    state: Arc<SharedState>,
    artwork: ArtworkCache,
    focus: Box<dyn AudioFocus>,
    /// Decoder the session is playing through.
    primary: Box<dyn Decoder>,
    /// Decoder pre-staging the predicted next track.
    standby: Box<dyn Decoder>,
    /// Track the standby decoder holds (or is preparing).
    standby_song_id: Option<SongId>,
    /// Whether the primary decoder has a source attached.
    initialized: bool,
    /// Set when playback was paused by a focus loss rather than the
    /// user; only then does a focus gain auto-resume.
    interrupted_by_focus_loss: bool,
    /// Single consumer for session saves; keeps writes ordered.
    saver: db::queue::SessionWriter,
    released: bool,
}

impl SongPlayer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Queue,
        catalog: Arc<dyn Catalog>,
        db: Pool<Sqlite>,
        state: Arc<SharedState>,
        artwork: ArtworkCache,
        focus: Box<dyn AudioFocus>,
        primary: Box<dyn Decoder>,
        standby: Box<dyn Decoder>,
    ) -> Self {
        let saver = db::queue::SessionWriter::spawn(db.clone());
        Self {
            queue,
            catalog,
            db,
            state,
            artwork,
            focus,
            primary,
            standby,
            standby_song_id: None,
            initialized: false,
            interrupted_by_focus_loss: false,
            saver,
            released: false,
        }
    }

    /// Control loop. Consumes events until `Release` is handled.
    pub async fn run(mut self, mut rx: UnboundedReceiver<EngineEvent>) {
        info!("Playback engine started");
        while let Some(event) = rx.recv().await {
            if let Err(e) = self.handle_event(event).await {
                error!("Engine error: {}", e);
            }
            if self.released {
                break;
            }
        }
        info!("Playback engine stopped");
    }

    pub async fn handle_event(&mut self, event: EngineEvent) -> Result<()> {
        match event {
            EngineEvent::Command(command) => self.handle_command(command).await,
            EngineEvent::Decoder { id, event } => self.handle_decoder(id, event).await,
            EngineEvent::Focus(change) => self.handle_focus(change).await,
        }
    }

    async fn handle_command(&mut self, command: Command) -> Result<()> {
        debug!("Command: {:?}", command);
        match command {
            Command::Play => self.play_song().await,
            Command::Pause => {
                self.interrupted_by_focus_loss = false;
                self.pause().await;
                Ok(())
            }
            Command::TogglePlayPause => {
                if self.primary.is_playing() {
                    self.interrupted_by_focus_loss = false;
                    self.pause().await;
                    Ok(())
                } else {
                    self.play_song().await
                }
            }
            Command::Next => self.next_song().await,
            Command::Previous => {
                match self.queue.previous_song_id() {
                    Some(id) => self.play_song_id(id).await,
                    None => {
                        debug!("No previous track");
                        Ok(())
                    }
                }
            }
            Command::Seek { position_ms } => {
                self.seek_to(position_ms).await;
                Ok(())
            }
            Command::SetShuffleMode(mode) => self.set_shuffle_mode(mode).await,
            Command::ToggleShuffle => {
                let mode = self.queue.shuffle_mode().toggled();
                self.set_shuffle_mode(mode).await
            }
            Command::SetRepeatMode(mode) => self.set_repeat_mode(mode).await,
            Command::CycleRepeat => {
                let mode = self.queue.repeat_mode().cycled();
                self.set_repeat_mode(mode).await
            }
            Command::PlayFromId { id, ids, title } => {
                match ids {
                    Some(ids) => self.queue.set_ids(ids),
                    // No context and no queue yet: play within the full
                    // catalog.
                    None if self.queue.ids().is_empty() => {
                        let all = self.catalog.all_song_ids().await?;
                        self.queue.set_ids(all);
                    }
                    None => {}
                }
                if let Some(title) = title {
                    self.queue.set_title(&title);
                }
                self.refresh_queue_items().await;
                self.play_song_id(id).await
            }
            Command::SetQueue { ids, title } => {
                self.queue.set_ids(ids);
                if let Some(title) = title {
                    self.queue.set_title(&title);
                }
                self.refresh_queue_items().await;
                Ok(())
            }
            Command::RepeatSong => self.repeat_song().await,
            Command::RepeatQueue => self.repeat_queue().await,
            Command::PlayNext { id } => {
                self.queue.move_to_next(id);
                self.refresh_queue_items().await;
                self.prime_standby().await;
                Ok(())
            }
            Command::SwapQueueSongs { from, to } => {
                self.queue.swap(from, to);
                self.refresh_queue_items().await;
                self.prime_standby().await;
                Ok(())
            }
            Command::RemoveFromQueue { id } => {
                self.queue.remove(id);
                self.refresh_queue_items().await;
                self.prime_standby().await;
                Ok(())
            }
            Command::Stop => {
                self.stop().await;
                Ok(())
            }
            Command::Release => self.release().await,
        }
    }

    async fn handle_decoder(&mut self, id: DecoderId, event: DecoderEvent) -> Result<()> {
        let from_primary = id == self.primary.id();
        match event {
            DecoderEvent::Prepared if from_primary => {
                // Position published before preparation started; the
                // restore path sets it to the persisted seek offset.
                let resume = self.state.transport().await.position_ms;
                self.play_song().await?;
                if resume > 0 {
                    self.primary.seek_to(Duration::from_millis(resume));
                    let state = self.state.transport().await.state;
                    self.publish_state(state, resume).await;
                }
                Ok(())
            }
            DecoderEvent::Prepared => {
                debug!("Standby decoder {} prepared", id);
                Ok(())
            }
            DecoderEvent::Completed if from_primary => self.on_track_completed().await,
            DecoderEvent::Completed => {
                debug!("Stale completion from decoder {}, ignored", id);
                Ok(())
            }
            DecoderEvent::Error(message) if from_primary => {
                warn!("Decoder {} failed: {}, skipping track", id, message);
                self.initialized = false;
                self.next_song().await
            }
            DecoderEvent::Error(message) => {
                warn!("Standby decoder {} failed: {}", id, message);
                self.standby_song_id = None;
                self.primary.set_gapless_successor(None);
                Ok(())
            }
        }
    }

    async fn handle_focus(&mut self, change: FocusChange) -> Result<()> {
        match change {
            FocusChange::Loss | FocusChange::TransientLoss => {
                if self.primary.is_playing() {
                    debug!("Audio focus lost while playing, pausing");
                    self.interrupted_by_focus_loss = true;
                    self.pause().await;
                }
                Ok(())
            }
            FocusChange::Gain => {
                if self.interrupted_by_focus_loss {
                    debug!("Audio focus regained, resuming");
                    self.interrupted_by_focus_loss = false;
                    self.play_song().await
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Start or resume playback of the current track.
    async fn play_song(&mut self) -> Result<()> {
        if !self.focus.request() {
            debug!("Audio focus denied, playing anyway");
        }
        self.queue.ensure_current_id(&self.db).await?;

        if self.initialized && self.primary.is_prepared() {
            let position = self.primary.position().as_millis() as u64;
            self.publish_state(PlayState::Playing, position).await;
            self.primary.play();
            self.prime_standby().await;
            return Ok(());
        }

        self.primary.reset();
        self.initialized = false;

        let song = match self.queue.current_song(self.catalog.as_ref()).await {
            Ok(song) => song,
            Err(e) => {
                warn!("Nothing to play: {}", e);
                return Ok(());
            }
        };

        if !self.primary.set_source(Path::new(&song.path)) {
            warn!("Source rejected for song {}: {}", song.id, song.path);
            return Ok(());
        }

        self.initialized = true;
        self.primary.prepare();
        self.prime_standby().await;
        Ok(())
    }

    async fn play_song_id(&mut self, id: SongId) -> Result<()> {
        match self.catalog.song(id).await {
            Ok(song) => self.play_song_with(song.id).await,
            Err(e) => {
                warn!("Cannot play song {}: {}", id, e);
                Ok(())
            }
        }
    }

    /// Switch the session to `id` and start it. When the standby
    /// decoder already holds that track prepared, the decoders swap
    /// roles and playback starts from the pre-decoded source.
    async fn play_song_with(&mut self, id: SongId) -> Result<()> {
        if self.queue.current_song_id() != Some(id) {
            if self.standby_song_id == Some(id) && self.standby.is_prepared() {
                debug!("Gapless hand-off to decoder {}", self.standby.id());
                mem::swap(&mut self.primary, &mut self.standby);
                self.primary.set_gapless_successor(None);
                self.standby.reset();
                self.standby_song_id = None;
                self.initialized = true;
            } else {
                self.standby.reset();
                self.standby_song_id = None;
                self.initialized = false;
            }
            self.publish_state(PlayState::Stopped, 0).await;
            self.queue.set_current_song_id(Some(id));
        }
        self.play_song().await
    }

    /// Unified end-of-track transition for the active decoder.
    async fn on_track_completed(&mut self) -> Result<()> {
        debug!("Track completed");
        if self.queue.repeat_mode() == RepeatMode::One {
            self.repeat_song().await
        } else {
            self.next_song().await
        }
    }

    /// Advance to the next track, or settle into paused at the end of
    /// the queue.
    async fn next_song(&mut self) -> Result<()> {
        match self.queue.next_song_id() {
            Some(id) => self.play_song_id(id).await,
            None => {
                debug!("End of queue");
                self.primary.pause();
                let position = self.primary.position().as_millis() as u64;
                self.publish_state(PlayState::Paused, position).await;
                Ok(())
            }
        }
    }

    /// Restart the current track from the beginning.
    async fn repeat_song(&mut self) -> Result<()> {
        self.publish_state(PlayState::Stopped, 0).await;
        if self.initialized && self.primary.is_prepared() {
            self.primary.seek_to(Duration::ZERO);
        } else {
            self.initialized = false;
        }
        self.play_song().await
    }

    /// Advance with an explicit wrap: from the last track back to the
    /// first regardless of the repeat mode.
    async fn repeat_queue(&mut self) -> Result<()> {
        match self.queue.last_id() {
            Ok(last) if self.queue.current_song_id() == Some(last) => {
                let first = self.queue.first_id()?;
                self.play_song_id(first).await
            }
            Ok(_) => self.next_song().await,
            Err(_) => {
                self.pause().await;
                Ok(())
            }
        }
    }

    async fn pause(&mut self) {
        if self.initialized && self.primary.is_playing() {
            self.primary.pause();
            let position = self.primary.position().as_millis() as u64;
            self.publish_state(PlayState::Paused, position).await;
        }
    }

    async fn seek_to(&mut self, position_ms: u64) {
        if !self.initialized {
            return;
        }
        self.primary.seek_to(Duration::from_millis(position_ms));
        let state = self.state.transport().await.state;
        self.publish_state(state, position_ms).await;
    }

    async fn stop(&mut self) {
        self.primary.stop();
        self.initialized = false;
        self.publish_state(PlayState::None, 0).await;
    }

    async fn set_shuffle_mode(&mut self, mode: ShuffleMode) -> Result<()> {
        self.queue.set_shuffle_mode(mode);
        self.refresh_queue_items().await;
        self.prime_standby().await;
        self.republish_transport().await;
        Ok(())
    }

    async fn set_repeat_mode(&mut self, mode: RepeatMode) -> Result<()> {
        self.queue.set_repeat_mode(mode);
        self.prime_standby().await;
        self.republish_transport().await;
        Ok(())
    }

    /// Pre-stage the predicted next track on the standby decoder. Under
    /// repeat-one the next track is the current one restarted, so
    /// nothing is staged.
    async fn prime_standby(&mut self) {
        if self.queue.repeat_mode() == RepeatMode::One {
            self.clear_standby();
            return;
        }
        let Some(next_id) = self.queue.next_song_id() else {
            self.clear_standby();
            return;
        };
        // Already staged (or staging) the right track.
        if self.standby_song_id == Some(next_id) {
            return;
        }

        self.standby.reset();
        self.standby_song_id = None;

        match self.catalog.song(next_id).await {
            Ok(song) => {
                if self.standby.set_source(Path::new(&song.path)) {
                    self.standby.prepare();
                    self.standby_song_id = Some(next_id);
                    self.primary.set_gapless_successor(Some(self.standby.id()));
                } else {
                    warn!("Standby source rejected for song {}", song.id);
                    self.primary.set_gapless_successor(None);
                }
            }
            Err(e) => {
                debug!("Cannot pre-stage next track {}: {}", next_id, e);
                self.primary.set_gapless_successor(None);
            }
        }
    }

    fn clear_standby(&mut self) {
        if self.standby_song_id.take().is_some() {
            self.standby.reset();
        }
        self.primary.set_gapless_successor(None);
    }

    /// Load the persisted session and publish it without starting
    /// playback.
    pub async fn restore(&mut self) -> Result<()> {
        let Some(record) = db::queue::get_queue_record(&self.db).await? else {
            debug!("No persisted session to restore");
            return Ok(());
        };
        let ids = db::queue::get_current_queue_songs(&self.db).await?;
        info!(
            "Restoring session: {} queued, current {:?}",
            ids.len(),
            record.current_id
        );

        // Modes go in before the list so the shuffle regeneration pins
        // the restored current track first.
        self.queue.set_current_song_id(record.current_id);
        self.queue.set_repeat_mode(record.repeat_mode);
        self.queue.set_shuffle_mode(record.shuffle_mode);
        self.queue.set_ids(ids);
        self.queue.set_title(&record.title);

        // A crash between the list write and the record write can leave
        // a current id the list no longer contains.
        if let Some(current) = self.queue.current_song_id() {
            if !self.queue.ids().contains(&current) {
                warn!("Persisted current id {} is not queued, clearing", current);
                self.queue.set_current_song_id(None);
            }
        }

        self.refresh_queue_items().await;
        self.publish_state(record.play_state, record.seek_position_ms as u64)
            .await;
        Ok(())
    }

    /// Save the session, wait for the write to land, then tear down
    /// both decoders and end the loop.
    async fn release(&mut self) -> Result<()> {
        info!("Releasing playback engine");
        let position = self.state.transport().await.position_ms;
        self.queue_save(PlayState::Stopped, position);
        self.saver.close().await;

        self.primary.reset();
        self.standby.reset();
        self.standby_song_id = None;
        self.initialized = false;
        self.queue.reset();
        self.focus.abandon();
        self.released = true;
        Ok(())
    }

    /// Publish a transport transition to every observer, then persist
    /// the session whenever playback has come to rest.
    async fn publish_state(&mut self, state: PlayState, position_ms: u64) {
        let snapshot = TransportSnapshot {
            state,
            position_ms,
            shuffle_mode: self.queue.shuffle_mode(),
            repeat_mode: self.queue.repeat_mode(),
            queue_title: self.queue.title().to_string(),
        };
        self.state.set_transport(snapshot).await;
        self.state.events.emit_lossy(PlayerEvent::PlaybackStateChanged {
            state,
            position_ms,
            timestamp: Utc::now(),
        });

        match self.queue.current_song(self.catalog.as_ref()).await {
            Ok(song) => {
                let art_path = self
                    .artwork
                    .lookup_or_schedule(&song)
                    .map(|p| p.to_string_lossy().into_owned());
                let now_playing = NowPlaying {
                    song_id: song.id,
                    title: song.title,
                    artist: song.artist,
                    album: song.album,
                    album_id: song.album_id,
                    duration_ms: song.duration_ms,
                    art_path,
                    position_ms,
                    playing: state.is_playing(),
                    shuffle_mode: self.queue.shuffle_mode(),
                    repeat_mode: self.queue.repeat_mode(),
                };
                self.state.set_now_playing(Some(now_playing.clone())).await;
                self.state.events.emit_lossy(PlayerEvent::NowPlaying {
                    snapshot: now_playing,
                    timestamp: Utc::now(),
                });
            }
            Err(_) => {
                self.state.set_now_playing(None).await;
            }
        }

        // Quiet states are save points. The pre-initialization state is
        // not: saving it would clobber a restorable session.
        if !state.is_playing() && state != PlayState::None {
            self.queue_save(state, position_ms);
        }
    }

    /// Re-publish the current transport state, picking up mode or title
    /// changes without a transition.
    async fn republish_transport(&mut self) {
        let transport = self.state.transport().await;
        self.publish_state(transport.state, transport.position_ms).await;
    }

    async fn refresh_queue_items(&self) {
        match self.queue.as_queue_items(self.catalog.as_ref()).await {
            Ok(items) => self.state.set_queue_items(items).await,
            Err(e) => warn!("Failed to materialize queue: {}", e),
        }
    }

    fn session_record(&self, state: PlayState, position_ms: u64) -> QueueRecord {
        QueueRecord {
            current_id: self.queue.current_song_id(),
            seek_position_ms: position_ms as i64,
            repeat_mode: self.queue.repeat_mode(),
            shuffle_mode: self.queue.shuffle_mode(),
            play_state: state,
            title: self.queue.title().to_string(),
        }
    }

    /// Hand the full session snapshot to the background writer. The
    /// snapshot is taken on the control task, so the write always
    /// reflects a fully-applied mutation, and the single writer keeps
    /// successive snapshots from landing out of order.
    fn queue_save(&self, state: PlayState, position_ms: u64) {
        let ids = self.queue.active_ids().to_vec();
        let record = self.session_record(state, position_ms);
        self.saver.submit(ids, record);
    }
}
