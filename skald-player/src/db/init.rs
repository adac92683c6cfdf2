//! Database initialization
//!
//! Opens the connection pool and creates the required tables when they
//! do not exist yet: the catalog `songs` table, the ordered
//! `queue_songs` list and the single-row `queue_record` snapshot.

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Open the database pool, creating the file if missing.
pub async fn open_pool(path: &Path) -> Result<Pool<Sqlite>> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
        .map_err(sqlx::Error::from)?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Open an in-memory pool (tests).
pub async fn open_memory_pool() -> Result<Pool<Sqlite>> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}

/// Create all required tables.
pub async fn initialize_database(pool: &Pool<Sqlite>) -> Result<()> {
    info!("Initializing database structures");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS songs (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            artist TEXT NOT NULL,
            album TEXT NOT NULL,
            album_id INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL,
            track_number INTEGER NOT NULL DEFAULT 0,
            path TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queue_songs (
            position INTEGER PRIMARY KEY,
            song_id INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queue_record (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            current_id INTEGER NOT NULL DEFAULT -1,
            seek_position_ms INTEGER NOT NULL DEFAULT 0,
            repeat_mode TEXT NOT NULL DEFAULT 'none',
            shuffle_mode TEXT NOT NULL DEFAULT 'none',
            play_state TEXT NOT NULL DEFAULT 'none',
            title TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    info!("Database initialization complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_idempotent() {
        let pool = open_memory_pool().await.unwrap();
        initialize_database(&pool).await.unwrap();
        initialize_database(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        assert!(tables.contains(&"songs".to_string()));
        assert!(tables.contains(&"queue_songs".to_string()));
        assert!(tables.contains(&"queue_record".to_string()));
    }
}
