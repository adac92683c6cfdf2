//! Album artwork cache
//!
//! Cover art embedded in the media files, extracted once per album and
//! re-encoded as a JPEG under the cache directory. Extraction runs on a
//! blocking task; the lookup returns immediately with the cached path
//! or `None` while extraction is still pending, and the next state
//! publish picks the file up.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::codecs::jpeg::JpegEncoder;
use lofty::{PictureType, TaggedFileExt};
use tracing::{debug, warn};

use skald_common::model::Song;

use crate::error::{Error, Result};

const JPEG_QUALITY: u8 = 75;

#[derive(Clone)]
pub struct ArtworkCache {
    dir: PathBuf,
    /// Albums with an extraction in flight, keyed by album id.
    in_flight: Arc<Mutex<HashSet<i64>>>,
}

impl ArtworkCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Cache file location for an album, whether or not it exists yet.
    pub fn cached_path(&self, album_id: i64) -> PathBuf {
        self.dir.join(format!("{}.jpg", album_id))
    }

    /// Return the cached art path for the song's album, scheduling an
    /// extraction when it is not cached yet.
    pub fn lookup_or_schedule(&self, song: &Song) -> Option<PathBuf> {
        let cached = self.cached_path(song.album_id);
        if cached.exists() {
            return Some(cached);
        }

        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if !in_flight.insert(song.album_id) {
                return None;
            }
        }

        let cache = self.clone();
        let album_id = song.album_id;
        let source = PathBuf::from(&song.path);
        tokio::task::spawn_blocking(move || {
            match cache.extract_to_cache(&source, album_id) {
                Ok(true) => debug!("Cached artwork for album {}", album_id),
                Ok(false) => debug!("No embedded artwork in {}", source.display()),
                Err(e) => warn!("Artwork extraction failed for {}: {}", source.display(), e),
            }
            let mut in_flight = cache.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            in_flight.remove(&album_id);
        });

        None
    }

    /// Pull the embedded picture out of the media file and write it as
    /// a JPEG. Returns false when the file carries no artwork.
    fn extract_to_cache(&self, source: &Path, album_id: i64) -> Result<bool> {
        let tagged_file = lofty::read_from_path(source)
            .map_err(|e| Error::Artwork(e.to_string()))?;

        let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
            return Ok(false);
        };

        let pictures = tag.pictures();
        let Some(picture) = pictures
            .iter()
            .find(|p| matches!(p.pic_type(), PictureType::CoverFront))
            .or_else(|| pictures.first())
        else {
            return Ok(false);
        };

        let decoded = image::load_from_memory(picture.data())
            .map_err(|e| Error::Artwork(e.to_string()))?;

        std::fs::create_dir_all(&self.dir)?;
        let target = self.cached_path(album_id);
        let file = std::fs::File::create(&target)?;
        let encoder = JpegEncoder::new_with_quality(file, JPEG_QUALITY);
        decoded
            .write_with_encoder(encoder)
            .map_err(|e| Error::Artwork(e.to_string()))?;

        Ok(true)
    }
}
