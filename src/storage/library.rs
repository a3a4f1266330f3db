use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::core::filename;
use crate::error::{DownloadError, Result};
use crate::models::song::{DownloadedSong, SongInfo};
use crate::storage::paths::LibraryPaths;

const INDEX_FILE: &str = "library.json";

/// The persistence gateway: commits verified transfers into the songs
/// directory and keeps the queryable downloaded-songs index. The in-memory
/// index is authoritative; it is loaded once and rewritten atomically on
/// every mutation.
pub struct MusicLibrary {
    paths: Arc<dyn LibraryPaths>,
    index_path: PathBuf,
    index: Mutex<Vec<DownloadedSong>>,
}

impl MusicLibrary {
    pub fn open(paths: Arc<dyn LibraryPaths>) -> Result<Self> {
        std::fs::create_dir_all(paths.songs_dir())?;
        std::fs::create_dir_all(paths.covers_dir())?;
        std::fs::create_dir_all(paths.data_dir())?;

        let index_path = paths.data_dir().join(INDEX_FILE);
        let index = match std::fs::read_to_string(&index_path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("unreadable library index, starting empty: {}", e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        Ok(Self {
            paths,
            index_path,
            index: Mutex::new(index),
        })
    }

    /// Where an in-flight transfer for `file_name` writes.
    pub fn part_path(&self, file_name: &str) -> PathBuf {
        self.paths
            .songs_dir()
            .join(filename::part_file_name(file_name))
    }

    /// Moves a fully verified part file onto its final name, writes the
    /// companion cover when bytes are provided, and appends the record to
    /// the index. Re-downloads replace the previous entry for the id.
    pub async fn commit(
        &self,
        part_path: &Path,
        song: &SongInfo,
        cover: Option<&[u8]>,
        extension: &str,
    ) -> Result<DownloadedSong> {
        let file_name = filename::song_file_name(song, extension);
        let final_path = self.paths.songs_dir().join(&file_name);
        tokio::fs::rename(part_path, &final_path).await?;
        let file_size = tokio::fs::metadata(&final_path).await?.len();

        let cover_path = match cover {
            Some(bytes) if !bytes.is_empty() => {
                let path = self.paths.covers_dir().join(filename::cover_file_name(song.id));
                match tokio::fs::write(&path, bytes).await {
                    Ok(()) => Some(path),
                    Err(e) => {
                        tracing::warn!(song_id = song.id, "could not write cover: {}", e);
                        None
                    }
                }
            }
            _ => None,
        };

        let record = DownloadedSong {
            id: song.id,
            name: song.name.clone(),
            artist: song.artist.clone(),
            album: song.album.clone(),
            file_size,
            downloaded_at: Utc::now(),
            file_path: final_path,
            cover_path,
        };

        let mut index = self.index.lock().await;
        index.retain(|s| s.id != song.id);
        index.push(record.clone());
        self.save(&index).await?;

        tracing::info!(song_id = song.id, file_size, "committed download");
        Ok(record)
    }

    /// Deletes the audio and cover files (best-effort) and removes the
    /// index entry. A missing file is logged, never fatal; the entry is
    /// removed regardless.
    pub async fn remove(&self, song_id: u64) -> Result<()> {
        let mut index = self.index.lock().await;
        let pos = index
            .iter()
            .position(|s| s.id == song_id)
            .ok_or(DownloadError::NotFound { song_id })?;
        let entry = index.remove(pos);

        remove_file_logged(&entry.file_path).await;
        if let Some(cover) = &entry.cover_path {
            remove_file_logged(cover).await;
        }

        self.save(&index).await?;
        tracing::info!(song_id, "removed downloaded song");
        Ok(())
    }

    pub async fn list(&self) -> Vec<DownloadedSong> {
        self.index.lock().await.clone()
    }

    pub async fn local_path(&self, song_id: u64) -> Option<PathBuf> {
        self.index
            .lock()
            .await
            .iter()
            .find(|s| s.id == song_id)
            .map(|s| s.file_path.clone())
    }

    pub async fn contains(&self, song_id: u64) -> bool {
        self.index.lock().await.iter().any(|s| s.id == song_id)
    }

    async fn save(&self, index: &[DownloadedSong]) -> Result<()> {
        let json = serde_json::to_vec_pretty(index)?;
        let tmp = self.index_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.index_path).await?;
        Ok(())
    }
}

async fn remove_file_logged(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!("could not delete {}: {}", path.display(), e);
    }
}
