//! Service assembly
//!
//! Wires the database, catalog, decoders and engine together, restores
//! the persisted session and spawns the control task.

use std::sync::Arc;

use sqlx::{Pool, Sqlite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::catalog::{Catalog, SqliteCatalog};
use crate::config::Config;
use crate::db;
use crate::error::Result;
use crate::playback::{
    ArtworkCache, Command, DecoderId, NoopFocus, PlayerHandle, Queue, SinkDecoder, SongPlayer,
};
use crate::state::SharedState;

/// A running playback service.
pub struct Service {
    pub handle: PlayerHandle,
    pub db: Pool<Sqlite>,
    engine: JoinHandle<()>,
}

impl Service {
    /// Open the database, build the engine and start the control task.
    pub async fn start(config: &Config) -> Result<Self> {
        let pool = db::init::open_pool(&config.database_path).await?;
        db::init::initialize_database(&pool).await?;

        let state = Arc::new(SharedState::new());
        let catalog: Arc<dyn Catalog> = Arc::new(SqliteCatalog::new(pool.clone()));

        let (tx, rx) = mpsc::unbounded_channel();
        let primary = Box::new(SinkDecoder::new(DecoderId::A, tx.clone()));
        let standby = Box::new(SinkDecoder::new(DecoderId::B, tx.clone()));

        let queue = Queue::new(state.events.clone());
        let artwork = ArtworkCache::new(config.art_cache_dir.clone());

        let mut player = SongPlayer::new(
            queue,
            catalog,
            pool.clone(),
            state.clone(),
            artwork,
            Box::new(NoopFocus),
            primary,
            standby,
        );
        player.restore().await?;

        let engine = tokio::spawn(player.run(rx));
        info!("Playback service started");

        Ok(Self {
            handle: PlayerHandle::new(tx, state),
            db: pool,
            engine,
        })
    }

    /// Save the session, stop the engine and wait for it to finish.
    pub async fn shutdown(self) {
        self.handle.send(Command::Release);
        if let Err(e) = self.engine.await {
            tracing::warn!("Engine task ended abnormally: {}", e);
        }
        self.db.close().await;
        info!("Playback service stopped");
    }
}
