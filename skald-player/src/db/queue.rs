//! Queue persistence gateway
//!
//! Durable snapshot of the playback session: an ordered song-id list
//! (one row per queue slot, insertion order significant) and a
//! single-row queue record.
//!
//! The list write and the current-id write are two separate statements
//! issued in order from a single background writer. A crash between
//! them can leave a record whose current id is absent from the list;
//! the restore path tolerates that by falling back to "no current
//! song".

use crate::error::Result;
use skald_common::model::{
    PlayState, QueueRecord, RepeatMode, ShuffleMode, SongId, SONG_ID_NONE,
};
use sqlx::{Pool, Row, Sqlite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Ordered song-id list, lowest position first.
pub async fn get_current_queue_songs(pool: &Pool<Sqlite>) -> Result<Vec<SongId>> {
    let ids = sqlx::query_scalar::<_, SongId>(
        "SELECT song_id FROM queue_songs ORDER BY position ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Persisted queue record, or `None` when nothing was ever saved.
pub async fn get_queue_record(pool: &Pool<Sqlite>) -> Result<Option<QueueRecord>> {
    let row = sqlx::query(
        r#"
        SELECT current_id, seek_position_ms, repeat_mode, shuffle_mode, play_state, title
        FROM queue_record
        WHERE id = 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| {
        let current_id: SongId = row.get("current_id");
        QueueRecord {
            current_id: (current_id != SONG_ID_NONE).then_some(current_id),
            seek_position_ms: row.get("seek_position_ms"),
            repeat_mode: RepeatMode::parse(row.get("repeat_mode")),
            shuffle_mode: ShuffleMode::parse(row.get("shuffle_mode")),
            play_state: PlayState::parse(row.get("play_state")),
            title: row.get("title"),
        }
    }))
}

/// Replace the ordered song list. Positions are rewritten from zero in
/// the order given.
pub async fn replace_queue_songs(pool: &Pool<Sqlite>, ids: &[SongId]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM queue_songs").execute(&mut *tx).await?;

    for (position, id) in ids.iter().enumerate() {
        sqlx::query("INSERT INTO queue_songs (position, song_id) VALUES (?, ?)")
            .bind(position as i64)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    debug!("Replaced queue songs ({} entries)", ids.len());
    Ok(())
}

/// Update only the persisted current id.
pub async fn set_current_id(pool: &Pool<Sqlite>, id: Option<SongId>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO queue_record (id, current_id) VALUES (1, ?)
        ON CONFLICT(id) DO UPDATE SET current_id = excluded.current_id
        "#,
    )
    .bind(id.unwrap_or(SONG_ID_NONE))
    .execute(pool)
    .await?;
    Ok(())
}

/// Write the full queue record.
pub async fn upsert_queue_record(pool: &Pool<Sqlite>, record: &QueueRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO queue_record
            (id, current_id, seek_position_ms, repeat_mode, shuffle_mode, play_state, title)
        VALUES (1, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            current_id = excluded.current_id,
            seek_position_ms = excluded.seek_position_ms,
            repeat_mode = excluded.repeat_mode,
            shuffle_mode = excluded.shuffle_mode,
            play_state = excluded.play_state,
            title = excluded.title
        "#,
    )
    .bind(record.current_id.unwrap_or(SONG_ID_NONE))
    .bind(record.seek_position_ms)
    .bind(record.repeat_mode.as_str())
    .bind(record.shuffle_mode.as_str())
    .bind(record.play_state.as_str())
    .bind(&record.title)
    .execute(pool)
    .await?;
    Ok(())
}

/// Save the full playback snapshot: the ordered list (skipped when it
/// already matches what is stored), then the current id, then the
/// record. Issued from the background writer after the in-memory
/// mutation has fully applied.
pub async fn save_queue(
    pool: &Pool<Sqlite>,
    ids: &[SongId],
    record: &QueueRecord,
) -> Result<()> {
    let stored = get_current_queue_songs(pool).await?;
    if !ids.is_empty() && stored != ids {
        replace_queue_songs(pool, ids).await?;
    }
    set_current_id(pool, record.current_id).await?;
    upsert_queue_record(pool, record).await?;
    Ok(())
}

/// Background writer for session snapshots. All saves funnel through
/// one consumer task, so at most one `save_queue` is in flight and a
/// write never lands after a write for a newer snapshot. A backlog
/// collapses to the newest snapshot before writing.
pub struct SessionWriter {
    tx: Option<mpsc::UnboundedSender<(Vec<SongId>, QueueRecord)>>,
    worker: Option<JoinHandle<()>>,
}

impl SessionWriter {
    pub fn spawn(pool: Pool<Sqlite>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(Vec<SongId>, QueueRecord)>();
        let worker = tokio::spawn(async move {
            while let Some(mut snapshot) = rx.recv().await {
                // Only the newest snapshot matters.
                while let Ok(newer) = rx.try_recv() {
                    snapshot = newer;
                }
                let (ids, record) = snapshot;
                if let Err(e) = save_queue(&pool, &ids, &record).await {
                    warn!("Session save failed: {}", e);
                }
            }
        });
        Self {
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    /// Queue a snapshot for writing.
    pub fn submit(&self, ids: Vec<SongId>, record: QueueRecord) {
        match &self.tx {
            Some(tx) => {
                let _ = tx.send((ids, record));
            }
            None => warn!("Session writer closed, save dropped"),
        }
    }

    /// Close the intake and wait for every pending save to land.
    pub async fn close(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }
}
