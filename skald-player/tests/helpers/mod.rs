//! Shared test harness for the playback engine
//!
//! Drives the engine deterministically: commands and decoder callbacks
//! are fed to `handle_event` directly, and the decoders are scripted
//! fakes that report preparation synchronously through the channel.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqlx::{Pool, Sqlite};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use skald_player::catalog::{Catalog, SqliteCatalog};
use skald_player::db;
use skald_player::playback::{
    ArtworkCache, AudioFocus, Command, Decoder, DecoderEvent, DecoderId, EngineEvent, Queue,
    SongPlayer,
};
use skald_player::state::SharedState;

#[derive(Debug, Default)]
pub struct FakeDecoderState {
    pub source: Option<PathBuf>,
    pub prepared: bool,
    pub playing: bool,
    pub position: Duration,
    pub successor: Option<DecoderId>,
    pub resets: usize,
    pub prepares: usize,
    /// When set, `set_source` turns every source down.
    pub reject_source: bool,
}

/// Scripted decoder. `prepare` flips to prepared immediately and posts
/// the callback into the engine channel, so tests control exactly when
/// it is observed by draining the channel.
pub struct FakeDecoder {
    id: DecoderId,
    tx: UnboundedSender<EngineEvent>,
    pub state: Arc<Mutex<FakeDecoderState>>,
}

impl FakeDecoder {
    pub fn new(id: DecoderId, tx: UnboundedSender<EngineEvent>) -> Self {
        Self {
            id,
            tx,
            state: Arc::new(Mutex::new(FakeDecoderState::default())),
        }
    }
}

impl Decoder for FakeDecoder {
    fn id(&self) -> DecoderId {
        self.id
    }

    fn reset(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.source = None;
        state.prepared = false;
        state.playing = false;
        state.position = Duration::ZERO;
        state.successor = None;
        state.resets += 1;
    }

    fn set_source(&mut self, path: &Path) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.reject_source {
            return false;
        }
        state.source = Some(path.to_path_buf());
        true
    }

    fn prepare(&mut self) {
        {
            let mut state = self.state.lock().unwrap();
            state.prepares += 1;
            state.prepared = true;
        }
        let _ = self.tx.send(EngineEvent::Decoder {
            id: self.id,
            event: DecoderEvent::Prepared,
        });
    }

    fn play(&mut self) {
        self.state.lock().unwrap().playing = true;
    }

    fn pause(&mut self) {
        self.state.lock().unwrap().playing = false;
    }

    fn stop(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.playing = false;
        state.prepared = false;
        state.position = Duration::ZERO;
    }

    fn seek_to(&mut self, position: Duration) {
        self.state.lock().unwrap().position = position;
    }

    fn position(&self) -> Duration {
        self.state.lock().unwrap().position
    }

    fn is_playing(&self) -> bool {
        self.state.lock().unwrap().playing
    }

    fn is_prepared(&self) -> bool {
        self.state.lock().unwrap().prepared
    }

    fn set_gapless_successor(&mut self, successor: Option<DecoderId>) {
        self.state.lock().unwrap().successor = successor;
    }
}

#[derive(Debug, Default)]
pub struct FocusLog {
    pub requests: usize,
    pub abandons: usize,
}

pub struct RecordingFocus {
    pub log: Arc<Mutex<FocusLog>>,
}

impl AudioFocus for RecordingFocus {
    fn request(&mut self) -> bool {
        self.log.lock().unwrap().requests += 1;
        true
    }

    fn abandon(&mut self) {
        self.log.lock().unwrap().abandons += 1;
    }
}

pub struct Harness {
    pub player: SongPlayer,
    pub rx: UnboundedReceiver<EngineEvent>,
    pub state: Arc<SharedState>,
    pub pool: Pool<Sqlite>,
    pub decoder_a: Arc<Mutex<FakeDecoderState>>,
    pub decoder_b: Arc<Mutex<FakeDecoderState>>,
    pub focus: Arc<Mutex<FocusLog>>,
    _art_dir: tempfile::TempDir,
}

impl Harness {
    /// Engine over an in-memory database seeded with `song_ids`, all
    /// fake decoders and a deterministic shuffle seed.
    pub async fn with_songs(song_ids: &[i64]) -> Self {
        let pool = db::init::open_memory_pool().await.unwrap();
        db::init::initialize_database(&pool).await.unwrap();
        seed_songs(&pool, song_ids).await;

        let state = Arc::new(SharedState::new());
        let catalog: Arc<dyn Catalog> = Arc::new(SqliteCatalog::new(pool.clone()));

        let (tx, rx) = mpsc::unbounded_channel();
        let primary = FakeDecoder::new(DecoderId::A, tx.clone());
        let standby = FakeDecoder::new(DecoderId::B, tx.clone());
        let decoder_a = primary.state.clone();
        let decoder_b = standby.state.clone();

        let focus_log = Arc::new(Mutex::new(FocusLog::default()));
        let focus = RecordingFocus {
            log: focus_log.clone(),
        };

        let art_dir = tempfile::tempdir().unwrap();
        let queue = Queue::with_seed(state.events.clone(), 42);

        let player = SongPlayer::new(
            queue,
            catalog,
            pool.clone(),
            state.clone(),
            ArtworkCache::new(art_dir.path()),
            Box::new(focus),
            Box::new(primary),
            Box::new(standby),
        );

        Self {
            player,
            rx,
            state,
            pool,
            decoder_a,
            decoder_b,
            focus: focus_log,
            _art_dir: art_dir,
        }
    }

    pub async fn send(&mut self, command: Command) {
        self.player
            .handle_event(EngineEvent::Command(command))
            .await
            .unwrap();
        self.drain().await;
    }

    /// Handle every event the decoders queued up (prepared callbacks
    /// and anything those trigger in turn).
    pub async fn drain(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.player.handle_event(event).await.unwrap();
        }
    }

    /// Simulate the track on `id` draining to its end, then deliver the
    /// completion.
    pub async fn complete(&mut self, id: DecoderId) {
        {
            let decoder = match id {
                DecoderId::A => &self.decoder_a,
                DecoderId::B => &self.decoder_b,
            };
            let mut state = decoder.lock().unwrap();
            state.playing = false;
            state.prepared = false;
        }
        self.player
            .handle_event(EngineEvent::Decoder {
                id,
                event: DecoderEvent::Completed,
            })
            .await
            .unwrap();
        self.drain().await;
    }

    /// Deliver a decoder failure for `id`, as a broken source or codec
    /// would report it.
    pub async fn fail(&mut self, id: DecoderId, message: &str) {
        {
            let decoder = match id {
                DecoderId::A => &self.decoder_a,
                DecoderId::B => &self.decoder_b,
            };
            let mut state = decoder.lock().unwrap();
            state.playing = false;
            state.prepared = false;
        }
        self.player
            .handle_event(EngineEvent::Decoder {
                id,
                event: DecoderEvent::Error(message.to_string()),
            })
            .await
            .unwrap();
        self.drain().await;
    }

    pub async fn focus_change(
        &mut self,
        change: skald_player::playback::FocusChange,
    ) {
        self.player
            .handle_event(EngineEvent::Focus(change))
            .await
            .unwrap();
        self.drain().await;
    }
}

pub fn song_path(id: i64) -> String {
    format!("/music/{}.flac", id)
}

pub async fn seed_songs(pool: &Pool<Sqlite>, ids: &[i64]) {
    for id in ids {
        sqlx::query(
            "INSERT INTO songs (id, title, artist, album, album_id, duration_ms, track_number, path)
             VALUES (?, ?, 'Artist', 'Album', ?, 180000, 1, ?)",
        )
        .bind(id)
        .bind(format!("Song {}", id))
        .bind(id % 3)
        .bind(song_path(*id))
        .execute(pool)
        .await
        .unwrap();
    }
}
