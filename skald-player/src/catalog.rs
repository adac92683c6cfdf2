//! Catalog gateway
//!
//! Resolves song ids to full `Song` records. The bulk lookup returns a
//! map addressable by id, not an ordered list; callers that need order
//! re-sort against their own id sequence.

use crate::error::{Error, Result};
use async_trait::async_trait;
use skald_common::model::{Song, SongId};
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolve a single song id. Fails with `SongNotFound` when absent.
    async fn song(&self, id: SongId) -> Result<Song>;

    /// Bulk lookup; absent ids are simply missing from the result map.
    async fn songs_for_ids(&self, ids: &[SongId]) -> Result<HashMap<SongId, Song>>;

    /// All song ids in catalog order.
    async fn all_song_ids(&self) -> Result<Vec<SongId>>;
}

/// Catalog backed by the `songs` table.
#[derive(Clone)]
pub struct SqliteCatalog {
    pool: Pool<Sqlite>,
}

impl SqliteCatalog {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

fn song_from_row(row: &sqlx::sqlite::SqliteRow) -> Song {
    Song {
        id: row.get("id"),
        title: row.get("title"),
        artist: row.get("artist"),
        album: row.get("album"),
        album_id: row.get("album_id"),
        duration_ms: row.get("duration_ms"),
        track_number: row.get("track_number"),
        path: row.get("path"),
    }
}

const SONG_COLUMNS: &str =
    "id, title, artist, album, album_id, duration_ms, track_number, path";

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn song(&self, id: SongId) -> Result<Song> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM songs WHERE id = ?",
            SONG_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(song_from_row(&row)),
            None => Err(Error::SongNotFound(id)),
        }
    }

    async fn songs_for_ids(&self, ids: &[SongId]) -> Result<HashMap<SongId, Song>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM songs WHERE id IN ({})",
            SONG_COLUMNS, placeholders
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let song = song_from_row(row);
                (song.id, song)
            })
            .collect())
    }

    async fn all_song_ids(&self) -> Result<Vec<SongId>> {
        let ids = sqlx::query_scalar::<_, SongId>("SELECT id FROM songs ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn setup() -> SqliteCatalog {
        let pool = db::init::open_memory_pool().await.unwrap();
        db::init::initialize_database(&pool).await.unwrap();

        for (id, title) in [(10, "Alpha"), (20, "Beta"), (30, "Gamma")] {
            sqlx::query(
                "INSERT INTO songs (id, title, artist, album, album_id, duration_ms, track_number, path)
                 VALUES (?, ?, 'Artist', 'Album', 7, 180000, 1, ?)",
            )
            .bind(id)
            .bind(title)
            .bind(format!("/music/{}.flac", id))
            .execute(&pool)
            .await
            .unwrap();
        }

        SqliteCatalog::new(pool)
    }

    #[tokio::test]
    async fn test_song_lookup() {
        let catalog = setup().await;
        let song = catalog.song(20).await.unwrap();
        assert_eq!(song.title, "Beta");
        assert_eq!(song.album_id, 7);
    }

    #[tokio::test]
    async fn test_missing_song_is_not_found() {
        let catalog = setup().await;
        assert!(matches!(
            catalog.song(999).await,
            Err(Error::SongNotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_all_song_ids_in_catalog_order() {
        let catalog = setup().await;
        assert_eq!(catalog.all_song_ids().await.unwrap(), vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_bulk_lookup_addressable_by_id() {
        let catalog = setup().await;
        let songs = catalog.songs_for_ids(&[30, 10, 999]).await.unwrap();
        assert_eq!(songs.len(), 2);
        assert_eq!(songs[&30].title, "Gamma");
        assert_eq!(songs[&10].title, "Alpha");
        assert!(!songs.contains_key(&999));
    }
}
