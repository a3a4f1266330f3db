use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::core::fetch::{self, MediaFetcher};
use crate::core::filename;
use crate::core::progress::{self, ProgressThrottle, SpeedEstimator};
use crate::core::transfer::{self, TransferSample};
use crate::error::{DownloadError, Result};
use crate::models::settings::DownloadSettings;
use crate::models::song::SongInfo;
use crate::models::task::{DownloadProgress, DownloadStatus, DownloadTask};
use crate::storage::library::MusicLibrary;

/// Immutable task-list snapshot published on every observable change.
pub type TaskListSnapshot = Arc<Vec<DownloadTask>>;

struct TaskEntry {
    task: DownloadTask,
    cancel: CancellationToken,
}

struct RegistryInner {
    entries: Vec<TaskEntry>,
}

/// Handle returned from `start`/`resume`; resolves once the task reaches a
/// terminal state.
pub struct TaskHandle {
    pub song_id: u64,
    pub(crate) done: oneshot::Receiver<DownloadStatus>,
}

impl TaskHandle {
    pub async fn wait(self) -> DownloadStatus {
        // A dropped sender means the transfer task aborted without
        // reporting, which can only be a runtime teardown.
        self.done.await.unwrap_or(DownloadStatus::Failed)
    }
}

/// Owns the canonical ordered list of download tasks. All mutation goes
/// through command methods; observers only ever see whole snapshots.
pub struct TaskRegistry {
    fetcher: Arc<dyn MediaFetcher>,
    library: Arc<MusicLibrary>,
    settings: DownloadSettings,
    transfer_slots: Arc<Semaphore>,
    inner: Mutex<RegistryInner>,
    snapshot_tx: watch::Sender<TaskListSnapshot>,
}

impl TaskRegistry {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        library: Arc<MusicLibrary>,
        settings: DownloadSettings,
    ) -> Arc<Self> {
        let (snapshot_tx, _) = watch::channel(Arc::new(Vec::new()));
        let slots = settings.max_concurrent_transfers.max(1);
        Arc::new(Self {
            fetcher,
            library,
            settings,
            transfer_slots: Arc::new(Semaphore::new(slots)),
            inner: Mutex::new(RegistryInner {
                entries: Vec::new(),
            }),
            snapshot_tx,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskListSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub async fn tasks(&self) -> Vec<DownloadTask> {
        let inner = self.inner.lock().await;
        inner.entries.iter().map(|e| e.task.clone()).collect()
    }

    /// Creates a `Downloading` task for the song and spawns its transfer.
    /// A live task for the same id is rejected; a terminal one has its
    /// list slot reused so the UI ordering stays stable.
    pub async fn start(self: &Arc<Self>, song: SongInfo) -> Result<TaskHandle> {
        let cancel = CancellationToken::new();
        let file_name = filename::song_file_name(&song, &self.settings.audio_extension);
        {
            let mut inner = self.inner.lock().await;
            let fresh = DownloadTask {
                song: song.clone(),
                status: DownloadStatus::Downloading,
                progress: Some(initial_progress(&file_name)),
                error: None,
            };
            match inner.entries.iter_mut().find(|e| e.task.song.id == song.id) {
                Some(entry) => {
                    if entry.task.status == DownloadStatus::Downloading {
                        return Err(DownloadError::AlreadyInProgress { song_id: song.id });
                    }
                    entry.task = fresh;
                    entry.cancel = cancel.clone();
                }
                None => inner.entries.push(TaskEntry {
                    task: fresh,
                    cancel: cancel.clone(),
                }),
            }
            self.publish(&inner);
        }
        tracing::info!(song_id = song.id, "download started");
        Ok(self.spawn_transfer(song, cancel))
    }

    /// Re-issues a fresh transfer for a `Cancelled` task. The part file
    /// was discarded on cancellation, so this restarts from byte zero.
    pub async fn resume(self: &Arc<Self>, song_id: u64) -> Result<TaskHandle> {
        let cancel = CancellationToken::new();
        let song = {
            let mut inner = self.inner.lock().await;
            let entry = inner
                .entries
                .iter_mut()
                .find(|e| e.task.song.id == song_id)
                .ok_or(DownloadError::NotFound { song_id })?;
            if entry.task.status != DownloadStatus::Cancelled {
                return Err(DownloadError::InvalidState {
                    song_id,
                    status: entry.task.status,
                });
            }
            let file_name =
                filename::song_file_name(&entry.task.song, &self.settings.audio_extension);
            entry.task.status = DownloadStatus::Downloading;
            entry.task.progress = Some(initial_progress(&file_name));
            entry.task.error = None;
            entry.cancel = cancel.clone();
            let song = entry.task.song.clone();
            self.publish(&inner);
            song
        };
        tracing::info!(song_id, "download resumed");
        Ok(self.spawn_transfer(song, cancel))
    }

    /// Signals cooperative cancellation. The status flips to `Cancelled`
    /// only once the transfer observes the token. Idempotent: cancelling
    /// a terminal task is a no-op.
    pub async fn cancel(&self, song_id: u64) -> Result<()> {
        let inner = self.inner.lock().await;
        let entry = inner
            .entries
            .iter()
            .find(|e| e.task.song.id == song_id)
            .ok_or(DownloadError::NotFound { song_id })?;
        if entry.task.status == DownloadStatus::Downloading {
            entry.cancel.cancel();
            tracing::info!(song_id, "cancellation requested");
        }
        Ok(())
    }

    /// Removes a terminal task from the list. Live tasks must be
    /// cancelled first.
    pub async fn remove(&self, song_id: u64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let pos = inner
            .entries
            .iter()
            .position(|e| e.task.song.id == song_id)
            .ok_or(DownloadError::NotFound { song_id })?;
        let status = inner.entries[pos].task.status;
        if !status.is_terminal() {
            return Err(DownloadError::InvalidState { song_id, status });
        }
        inner.entries.remove(pos);
        self.publish(&inner);
        Ok(())
    }

    /// Drops every dismissible terminal task in one atomic update.
    /// `Failed` tasks stay until acknowledged via `remove`.
    pub async fn clear_completed(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.retain(|e| !e.task.status.is_dismissible());
        self.publish(&inner);
    }

    fn publish(&self, inner: &RegistryInner) {
        let snapshot: Vec<DownloadTask> = inner.entries.iter().map(|e| e.task.clone()).collect();
        let _ = self.snapshot_tx.send(Arc::new(snapshot));
    }

    fn spawn_transfer(self: &Arc<Self>, song: SongInfo, cancel: CancellationToken) -> TaskHandle {
        let (done_tx, done_rx) = oneshot::channel();
        let registry = Arc::clone(self);
        let song_id = song.id;
        tokio::spawn(async move {
            let status = registry.run_transfer(song, cancel).await;
            let _ = done_tx.send(status);
        });
        TaskHandle {
            song_id,
            done: done_rx,
        }
    }

    async fn run_transfer(
        self: Arc<Self>,
        song: SongInfo,
        cancel: CancellationToken,
    ) -> DownloadStatus {
        let _permit = tokio::select! {
            permit = self.transfer_slots.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => {
                    return self
                        .finish(song.id, Err(DownloadError::TransferFailed(
                            "registry shut down".into(),
                        )))
                        .await;
                }
            },
            _ = cancel.cancelled() => {
                return self.finish(song.id, Err(DownloadError::Cancelled)).await;
            }
        };

        let file_name = filename::song_file_name(&song, &self.settings.audio_extension);
        let part_path = self.library.part_path(&file_name);
        let (tx, mut rx) = mpsc::channel::<TransferSample>(32);

        let forwarder = {
            let registry = Arc::clone(&self);
            let file_name = file_name.clone();
            let song_id = song.id;
            tokio::spawn(async move {
                let mut throttle = ProgressThrottle::new(registry.settings.progress_interval_ms);
                let mut speed = SpeedEstimator::new();
                while let Some(sample) = rx.recv().await {
                    let rate = speed.sample(sample.bytes_read);
                    let percentage = progress::percentage(sample.bytes_read, sample.total_bytes);
                    if !throttle.should_emit(percentage) {
                        continue;
                    }
                    registry
                        .update_progress(song_id, sample, rate, &file_name)
                        .await;
                }
            })
        };

        let result = transfer::transfer_to_part(
            self.fetcher.as_ref(),
            &song.stream_url,
            &part_path,
            Duration::from_secs(self.settings.stall_timeout_secs),
            &tx,
            &cancel,
        )
        .await;
        drop(tx);
        // Drain the forwarder before the terminal transition so no
        // progress snapshot can follow the terminal one.
        let _ = forwarder.await;

        let result = match result {
            Ok(bytes) => {
                let cover = self.fetch_cover(&song).await;
                match self
                    .library
                    .commit(
                        &part_path,
                        &song,
                        cover.as_deref(),
                        &self.settings.audio_extension,
                    )
                    .await
                {
                    Ok(_) => Ok(bytes),
                    Err(e) => {
                        transfer::discard_part(&part_path).await;
                        Err(e)
                    }
                }
            }
            Err(e) => Err(e),
        };

        self.finish(song.id, result).await
    }

    /// Cover art is best-effort: a failed fetch degrades the record, it
    /// never fails the download.
    async fn fetch_cover(&self, song: &SongInfo) -> Option<Vec<u8>> {
        let url = song.cover_url.as_deref()?;
        match fetch::fetch_bytes(self.fetcher.as_ref(), url).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(song_id = song.id, "cover fetch failed: {}", e);
                None
            }
        }
    }

    async fn update_progress(
        &self,
        song_id: u64,
        sample: TransferSample,
        speed_bytes_per_sec: f64,
        file_name: &str,
    ) {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner
            .entries
            .iter_mut()
            .find(|e| e.task.song.id == song_id)
        else {
            return;
        };
        if entry.task.status != DownloadStatus::Downloading {
            return;
        }
        // bytes_read never regresses within one task lifetime.
        if let Some(current) = &entry.task.progress {
            if sample.bytes_read < current.bytes_read {
                return;
            }
        }
        entry.task.progress = Some(DownloadProgress {
            bytes_read: sample.bytes_read,
            total_bytes: sample.total_bytes,
            percentage: progress::percentage(sample.bytes_read, sample.total_bytes),
            speed_bytes_per_sec,
            file_name: file_name.to_string(),
        });
        self.publish(&inner);
    }

    async fn finish(&self, song_id: u64, result: Result<u64>) -> DownloadStatus {
        let status = match &result {
            Ok(_) => DownloadStatus::Completed,
            Err(DownloadError::Cancelled) => DownloadStatus::Cancelled,
            Err(_) => DownloadStatus::Failed,
        };
        match &result {
            Ok(bytes) => tracing::info!(song_id, bytes, "download completed"),
            Err(DownloadError::Cancelled) => tracing::info!(song_id, "download cancelled"),
            Err(e) => tracing::error!(song_id, "download failed: {}", e),
        }

        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner
            .entries
            .iter_mut()
            .find(|e| e.task.song.id == song_id)
        {
            entry.task.status = status;
            entry.task.progress = None;
            entry.task.error = match &result {
                Err(e) if !matches!(e, DownloadError::Cancelled) => Some(e.to_string()),
                _ => None,
            };
            self.publish(&inner);
        }
        status
    }
}

fn initial_progress(file_name: &str) -> DownloadProgress {
    DownloadProgress {
        bytes_read: 0,
        total_bytes: None,
        percentage: 0.0,
        speed_bytes_per_sec: 0.0,
        file_name: file_name.to_string(),
    }
}
