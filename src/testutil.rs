use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use crate::core::fetch::{MediaFetcher, MediaStream};
use crate::models::settings::DownloadSettings;
use crate::models::song::SongInfo;
use crate::storage::paths::LibraryPaths;

/// One scripted remote asset: deterministic bytes, configurable chunking,
/// optional per-chunk delay, optional mid-stream failure, optional lying
/// content length.
#[derive(Clone)]
pub struct FakeSource {
    pub data: Vec<u8>,
    pub chunk_size: usize,
    pub chunk_delay: Duration,
    pub advertised_total: Option<u64>,
    pub fail_after_chunks: Option<usize>,
}

impl FakeSource {
    pub fn of_len(len: usize) -> Self {
        Self {
            data: (0..len).map(|i| (i % 251) as u8).collect(),
            chunk_size: 64,
            chunk_delay: Duration::ZERO,
            advertised_total: None,
            fail_after_chunks: None,
        }
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn advertised_total(mut self, total: u64) -> Self {
        self.advertised_total = Some(total);
        self
    }

    pub fn fail_after_chunks(mut self, chunks: usize) -> Self {
        self.fail_after_chunks = Some(chunks);
        self
    }
}

pub struct FakeFetcher {
    sources: Mutex<HashMap<String, FakeSource>>,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sources: Mutex::new(HashMap::new()),
        })
    }

    pub fn insert(&self, url: &str, source: FakeSource) {
        self.sources.lock().unwrap().insert(url.to_string(), source);
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn open(&self, url: &str) -> anyhow::Result<MediaStream> {
        let source = self
            .sources
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("HTTP 404 Not Found fetching {}", url))?;

        let total_bytes = source.advertised_total.or(Some(source.data.len() as u64));
        let delay = source.chunk_delay;
        let fail_after = source.fail_after_chunks;
        let chunks: Vec<Bytes> = source
            .data
            .chunks(source.chunk_size)
            .map(Bytes::copy_from_slice)
            .collect();

        let bytes = futures::stream::iter(chunks.into_iter().enumerate())
            .then(move |(i, chunk)| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if fail_after.is_some_and(|n| i >= n) {
                    anyhow::bail!("connection reset by peer");
                }
                Ok(chunk)
            })
            .boxed();

        Ok(MediaStream { bytes, total_bytes })
    }
}

/// Library paths rooted in a throwaway directory. The tempdir must outlive
/// the service under test.
pub struct TempPaths {
    root: PathBuf,
}

impl TempPaths {
    pub fn new(dir: &tempfile::TempDir) -> Arc<Self> {
        Arc::new(Self {
            root: dir.path().to_path_buf(),
        })
    }
}

impl LibraryPaths for TempPaths {
    fn songs_dir(&self) -> PathBuf {
        self.root.join("songs")
    }

    fn covers_dir(&self) -> PathBuf {
        self.root.join("covers")
    }

    fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }
}

pub fn song(id: u64, name: &str) -> SongInfo {
    SongInfo {
        id,
        name: name.to_string(),
        artist: format!("Artist {}", id),
        album: "Album".to_string(),
        stream_url: format!("song://{}", id),
        cover_url: None,
    }
}

pub fn song_with_cover(id: u64, name: &str) -> SongInfo {
    SongInfo {
        cover_url: Some(format!("cover://{}", id)),
        ..song(id, name)
    }
}

/// Settings tuned for tests: unthrottled progress, short stall timeout.
pub fn fast_settings() -> DownloadSettings {
    DownloadSettings {
        progress_interval_ms: 0,
        stall_timeout_secs: 5,
        ..DownloadSettings::default()
    }
}
