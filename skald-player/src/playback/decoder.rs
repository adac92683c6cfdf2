//! Decoder collaborator
//!
//! A single-track decoding/playback primitive. Preparation is
//! asynchronous: the decoder posts `Prepared` (or `Error`) into the
//! engine channel, and a drained sink posts `Completed`. The engine
//! never blocks on a decoder; a stuck prepare only delays that
//! decoder's readiness.
//!
//! `SinkDecoder` is the rodio-backed implementation: `prepare` decodes
//! the source into a paused sink off-thread, so the standby decoder can
//! pre-stage the predicted next track for a gapless hand-off (the
//! engine swaps to the already-decoded sink on completion).

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use rodio::mixer::Mixer;
use rodio::{OutputStreamBuilder, Sink};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use super::player::EngineEvent;

/// Identity of a decoder instance, carried on every event it emits so
/// the engine can tell the active decoder's completion from a stale one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderId {
    A,
    B,
}

impl fmt::Display for DecoderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecoderId::A => f.write_str("A"),
            DecoderId::B => f.write_str("B"),
        }
    }
}

/// Events a decoder posts into the engine channel.
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderEvent {
    /// Asynchronous preparation finished; the track can be played.
    Prepared,
    /// The track played to its end and the decoder drained.
    Completed,
    Error(String),
}

/// Narrow contract of the single-track playback primitive.
pub trait Decoder: Send + Sync {
    fn id(&self) -> DecoderId;

    /// Discard any loaded source and invalidate in-flight preparation.
    fn reset(&mut self);

    /// Attach a media source. Returns false when the source is rejected.
    fn set_source(&mut self, path: &Path) -> bool;

    /// Begin asynchronous preparation; completion arrives as an event.
    fn prepare(&mut self);

    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn seek_to(&mut self, position: Duration);

    fn position(&self) -> Duration;
    fn is_playing(&self) -> bool;
    fn is_prepared(&self) -> bool;

    /// Link another decoder as the gapless hand-off target, or unlink.
    fn set_gapless_successor(&mut self, successor: Option<DecoderId>);
}

/// Process-wide audio output. The stream must outlive every sink, so it
/// is leaked once and only its mixer handle is shared.
fn output_mixer() -> Option<&'static Mixer> {
    static MIXER: OnceLock<Option<&'static Mixer>> = OnceLock::new();
    *MIXER.get_or_init(|| match OutputStreamBuilder::open_default_stream() {
        Ok(stream) => {
            let stream = Box::leak(Box::new(stream));
            Some(stream.mixer())
        }
        Err(e) => {
            warn!("No audio output device available: {}", e);
            None
        }
    })
}

struct SinkState {
    sink: Option<Sink>,
    prepared: bool,
    successor: Option<DecoderId>,
    watcher_running: bool,
}

/// Rodio-backed decoder: one paused sink per prepared track.
pub struct SinkDecoder {
    id: DecoderId,
    events: UnboundedSender<EngineEvent>,
    source_path: Option<PathBuf>,
    state: Arc<Mutex<SinkState>>,
    /// Bumped on every reset; in-flight prepare/watcher threads from an
    /// older generation discard their results.
    generation: Arc<AtomicU64>,
}

impl SinkDecoder {
    pub fn new(id: DecoderId, events: UnboundedSender<EngineEvent>) -> Self {
        Self {
            id,
            events,
            source_path: None,
            state: Arc::new(Mutex::new(SinkState {
                sink: None,
                prepared: false,
                successor: None,
                watcher_running: false,
            })),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    fn emit(&self, event: DecoderEvent) {
        let _ = self.events.send(EngineEvent::Decoder {
            id: self.id,
            event,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SinkState> {
        // The guard only covers short sink operations; a poisoned lock
        // is still usable state.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Watch for the sink draining and report completion once.
    fn spawn_watcher(&self) {
        {
            let mut state = self.lock();
            if state.watcher_running {
                return;
            }
            state.watcher_running = true;
        }

        let id = self.id;
        let events = self.events.clone();
        let state = Arc::clone(&self.state);
        let generation = Arc::clone(&self.generation);
        let born = generation.load(Ordering::SeqCst);

        std::thread::spawn(move || {
            loop {
                std::thread::sleep(Duration::from_millis(200));
                if generation.load(Ordering::SeqCst) != born {
                    return;
                }
                let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
                match &guard.sink {
                    Some(sink) if sink.empty() => {
                        guard.prepared = false;
                        guard.watcher_running = false;
                        drop(guard);
                        let _ = events.send(EngineEvent::Decoder {
                            id,
                            event: DecoderEvent::Completed,
                        });
                        return;
                    }
                    Some(_) => {}
                    None => {
                        guard.watcher_running = false;
                        return;
                    }
                }
            }
        });
    }
}

impl Decoder for SinkDecoder {
    fn id(&self) -> DecoderId {
        self.id
    }

    fn reset(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.source_path = None;
        let mut state = self.lock();
        if let Some(sink) = state.sink.take() {
            sink.stop();
        }
        state.prepared = false;
        state.successor = None;
        state.watcher_running = false;
    }

    fn set_source(&mut self, path: &Path) -> bool {
        if !path.exists() {
            warn!("decoder {}: source {} does not exist", self.id, path.display());
            return false;
        }
        self.source_path = Some(path.to_path_buf());
        true
    }

    fn prepare(&mut self) {
        let Some(path) = self.source_path.clone() else {
            self.emit(DecoderEvent::Error("prepare without source".to_string()));
            return;
        };
        let Some(mixer) = output_mixer() else {
            self.emit(DecoderEvent::Error("no audio output".to_string()));
            return;
        };

        let id = self.id;
        let events = self.events.clone();
        let state = Arc::clone(&self.state);
        let generation = Arc::clone(&self.generation);
        let born = generation.load(Ordering::SeqCst);

        // Decoding the header is blocking work; keep it off the runtime.
        std::thread::spawn(move || {
            let result = File::open(&path)
                .map_err(|e| e.to_string())
                .and_then(|file| {
                    rodio::Decoder::new(BufReader::new(file)).map_err(|e| e.to_string())
                });

            let event = match result {
                Ok(source) => {
                    let sink = Sink::connect_new(mixer);
                    sink.pause();
                    sink.append(source);

                    let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
                    if generation.load(Ordering::SeqCst) != born {
                        // Reset raced the prepare; drop the stale sink.
                        sink.stop();
                        return;
                    }
                    if let Some(old) = guard.sink.replace(sink) {
                        old.stop();
                    }
                    guard.prepared = true;
                    DecoderEvent::Prepared
                }
                Err(e) => {
                    debug!("decoder {}: prepare failed for {}: {}", id, path.display(), e);
                    DecoderEvent::Error(e)
                }
            };

            let _ = events.send(EngineEvent::Decoder { id, event });
        });
    }

    fn play(&mut self) {
        {
            let state = self.lock();
            match &state.sink {
                Some(sink) => sink.play(),
                None => return,
            }
        }
        self.spawn_watcher();
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.lock().sink {
            sink.pause();
        }
    }

    fn stop(&mut self) {
        let mut state = self.lock();
        if let Some(sink) = state.sink.take() {
            sink.stop();
        }
        state.prepared = false;
    }

    fn seek_to(&mut self, position: Duration) {
        if let Some(sink) = &self.lock().sink {
            if let Err(e) = sink.try_seek(position) {
                warn!("decoder {}: seek to {:?} failed: {}", self.id, position, e);
            }
        }
    }

    fn position(&self) -> Duration {
        self.lock()
            .sink
            .as_ref()
            .map(|sink| sink.get_pos())
            .unwrap_or(Duration::ZERO)
    }

    fn is_playing(&self) -> bool {
        self.lock()
            .sink
            .as_ref()
            .map(|sink| !sink.is_paused() && !sink.empty())
            .unwrap_or(false)
    }

    fn is_prepared(&self) -> bool {
        self.lock().prepared
    }

    fn set_gapless_successor(&mut self, successor: Option<DecoderId>) {
        // The hand-off itself happens in the engine, which swaps to the
        // successor's pre-decoded sink on completion; the link is kept
        // so a reset can tell whether a hand-off was pending.
        self.lock().successor = successor;
    }
}
