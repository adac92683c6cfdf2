//! HTTP API
//!
//! REST endpoints for playback control plus an SSE stream of engine
//! events. Control handlers are fire-and-forget: they enqueue a command
//! on the engine channel and return immediately; the resulting state
//! shows up on the SSE stream and in the state endpoints.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{delete, get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use skald_common::model::{
    NowPlaying, QueueItem, RepeatMode, ShuffleMode, SongId,
};

use crate::playback::{Command, PlayerHandle};

/// Shared application context passed to all handlers.
#[derive(Clone)]
pub struct AppContext {
    pub handle: PlayerHandle,
}

pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(get_state))
        // Transport
        .route("/playback/state", get(get_state))
        .route("/playback/now", get(get_now_playing))
        .route("/playback/play", post(play))
        .route("/playback/pause", post(pause))
        .route("/playback/toggle", post(toggle))
        .route("/playback/stop", post(stop))
        .route("/playback/next", post(next))
        .route("/playback/previous", post(previous))
        .route("/playback/seek", post(seek))
        .route("/playback/repeat-song", post(repeat_song))
        .route("/playback/repeat-queue", post(repeat_queue))
        .route("/playback/play-from", post(play_from))
        // Modes
        .route("/playback/shuffle", post(set_shuffle))
        .route("/playback/shuffle/toggle", post(toggle_shuffle))
        .route("/playback/repeat", post(set_repeat))
        .route("/playback/repeat/cycle", post(cycle_repeat))
        // Queue
        .route("/playback/queue", get(get_queue))
        .route("/playback/queue", post(set_queue))
        .route("/playback/queue/play-next/:id", post(play_next))
        .route("/playback/queue/move", post(move_queue_song))
        .route("/playback/queue/:id", delete(remove_from_queue))
        // SSE event stream
        .route("/events", get(event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

impl StatusResponse {
    fn accepted() -> Json<Self> {
        Json(Self {
            status: "accepted".to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    state: String,
    position_ms: u64,
    shuffle_mode: ShuffleMode,
    repeat_mode: RepeatMode,
    queue_title: String,
}

#[derive(Debug, Serialize)]
pub struct NowPlayingResponse {
    now_playing: Option<NowPlaying>,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    position_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct ShuffleRequest {
    mode: ShuffleMode,
}

#[derive(Debug, Deserialize)]
pub struct RepeatRequest {
    mode: RepeatMode,
}

#[derive(Debug, Deserialize)]
pub struct PlayFromRequest {
    id: SongId,
    ids: Option<Vec<SongId>>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetQueueRequest {
    ids: Vec<SongId>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    from: usize,
    to: usize,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    title: String,
    items: Vec<QueueItem>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "playback".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /playback/state - Published transport snapshot
pub async fn get_state(State(ctx): State<AppContext>) -> Json<StateResponse> {
    let transport = ctx.handle.state().transport().await;
    Json(StateResponse {
        state: transport.state.to_string(),
        position_ms: transport.position_ms,
        shuffle_mode: transport.shuffle_mode,
        repeat_mode: transport.repeat_mode,
        queue_title: transport.queue_title,
    })
}

/// GET /playback/now - Current now-playing snapshot
pub async fn get_now_playing(State(ctx): State<AppContext>) -> Json<NowPlayingResponse> {
    Json(NowPlayingResponse {
        now_playing: ctx.handle.state().now_playing().await,
    })
}

/// POST /playback/play
pub async fn play(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.handle.send(Command::Play);
    StatusResponse::accepted()
}

/// POST /playback/pause
pub async fn pause(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.handle.send(Command::Pause);
    StatusResponse::accepted()
}

/// POST /playback/toggle
pub async fn toggle(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.handle.send(Command::TogglePlayPause);
    StatusResponse::accepted()
}

/// POST /playback/stop
pub async fn stop(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.handle.send(Command::Stop);
    StatusResponse::accepted()
}

/// POST /playback/next
pub async fn next(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.handle.send(Command::Next);
    StatusResponse::accepted()
}

/// POST /playback/previous
pub async fn previous(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.handle.send(Command::Previous);
    StatusResponse::accepted()
}

/// POST /playback/seek - Seek within the current track
pub async fn seek(
    State(ctx): State<AppContext>,
    Json(req): Json<SeekRequest>,
) -> Json<StatusResponse> {
    ctx.handle.send(Command::Seek {
        position_ms: req.position_ms,
    });
    StatusResponse::accepted()
}

/// POST /playback/repeat-song - Restart the current track
pub async fn repeat_song(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.handle.send(Command::RepeatSong);
    StatusResponse::accepted()
}

/// POST /playback/repeat-queue - Advance, wrapping at the end
pub async fn repeat_queue(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.handle.send(Command::RepeatQueue);
    StatusResponse::accepted()
}

/// POST /playback/play-from - Start a track, optionally with a new queue
pub async fn play_from(
    State(ctx): State<AppContext>,
    Json(req): Json<PlayFromRequest>,
) -> Json<StatusResponse> {
    ctx.handle.send(Command::PlayFromId {
        id: req.id,
        ids: req.ids,
        title: req.title,
    });
    StatusResponse::accepted()
}

/// POST /playback/shuffle - Set the shuffle mode
pub async fn set_shuffle(
    State(ctx): State<AppContext>,
    Json(req): Json<ShuffleRequest>,
) -> Json<StatusResponse> {
    ctx.handle.send(Command::SetShuffleMode(req.mode));
    StatusResponse::accepted()
}

/// POST /playback/shuffle/toggle
pub async fn toggle_shuffle(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.handle.send(Command::ToggleShuffle);
    StatusResponse::accepted()
}

/// POST /playback/repeat - Set the repeat mode
pub async fn set_repeat(
    State(ctx): State<AppContext>,
    Json(req): Json<RepeatRequest>,
) -> Json<StatusResponse> {
    ctx.handle.send(Command::SetRepeatMode(req.mode));
    StatusResponse::accepted()
}

/// POST /playback/repeat/cycle
pub async fn cycle_repeat(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.handle.send(Command::CycleRepeat);
    StatusResponse::accepted()
}

/// GET /playback/queue - Materialized active queue
pub async fn get_queue(State(ctx): State<AppContext>) -> Json<QueueResponse> {
    let state = ctx.handle.state();
    Json(QueueResponse {
        title: state.transport().await.queue_title,
        items: state.queue_items().await,
    })
}

/// POST /playback/queue - Replace the queue without changing playback
pub async fn set_queue(
    State(ctx): State<AppContext>,
    Json(req): Json<SetQueueRequest>,
) -> Json<StatusResponse> {
    ctx.handle.send(Command::SetQueue {
        ids: req.ids,
        title: req.title,
    });
    StatusResponse::accepted()
}

/// POST /playback/queue/play-next/:id - Move a track right after the
/// current one
pub async fn play_next(
    State(ctx): State<AppContext>,
    Path(id): Path<SongId>,
) -> Json<StatusResponse> {
    ctx.handle.send(Command::PlayNext { id });
    StatusResponse::accepted()
}

/// POST /playback/queue/move - Reposition a queue slot
pub async fn move_queue_song(
    State(ctx): State<AppContext>,
    Json(req): Json<MoveRequest>,
) -> Json<StatusResponse> {
    ctx.handle.send(Command::SwapQueueSongs {
        from: req.from,
        to: req.to,
    });
    StatusResponse::accepted()
}

/// DELETE /playback/queue/:id - Remove a track from the queue
pub async fn remove_from_queue(
    State(ctx): State<AppContext>,
    Path(id): Path<SongId>,
) -> Json<StatusResponse> {
    ctx.handle.send(Command::RemoveFromQueue { id });
    StatusResponse::accepted()
}

/// GET /events - SSE event stream
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("New SSE client connected");

    let rx = ctx.handle.state().events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => Some(Ok(Event::default().event(event.name()).data(json))),
                Err(e) => {
                    warn!("Failed to serialize event: {}", e);
                    None
                }
            },
            Err(e) => {
                // Lagged or closed receiver; skip and keep streaming.
                warn!("SSE stream error: {:?}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
