use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Song identity supplied by the caller when requesting a download.
/// `stream_url` is the resolved audio source; resolution itself happens
/// upstream in the platform API clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SongInfo {
    pub id: u64,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub stream_url: String,
    pub cover_url: Option<String>,
}

/// Persisted record of a committed download. Lives in the library index,
/// decoupled from the (removable) task entry that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadedSong {
    pub id: u64,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub file_size: u64,
    pub downloaded_at: DateTime<Utc>,
    pub file_path: PathBuf,
    pub cover_path: Option<PathBuf>,
}
