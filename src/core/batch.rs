use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::core::registry::TaskRegistry;
use crate::error::{DownloadError, Result};
use crate::models::song::SongInfo;
use crate::models::task::{BatchDownloadProgress, DownloadStatus};

/// Sequences a list of songs as one logical batch: strictly one transfer
/// at a time, aggregated progress on a watch channel, whole-batch
/// cancellation through the registry's cooperative path.
///
/// A song that fails is skipped and the batch continues; the failed task
/// stays visible in the registry. Cancellation stops the in-flight song
/// and never starts the remaining ones.
pub struct BatchCoordinator {
    registry: Arc<TaskRegistry>,
    progress_tx: watch::Sender<Option<BatchDownloadProgress>>,
    active: Mutex<Option<CancellationToken>>,
}

impl BatchCoordinator {
    pub fn new(registry: Arc<TaskRegistry>) -> Arc<Self> {
        let (progress_tx, _) = watch::channel(None);
        Arc::new(Self {
            registry,
            progress_tx,
            active: Mutex::new(None),
        })
    }

    /// `None` while no batch is active.
    pub fn subscribe(&self) -> watch::Receiver<Option<BatchDownloadProgress>> {
        self.progress_tx.subscribe()
    }

    pub async fn start(self: &Arc<Self>, songs: Vec<SongInfo>) -> Result<()> {
        if songs.is_empty() {
            return Ok(());
        }
        let cancel = CancellationToken::new();
        {
            let mut active = self.active.lock().await;
            if active.is_some() {
                return Err(DownloadError::BatchInProgress);
            }
            *active = Some(cancel.clone());
        }
        tracing::info!(songs = songs.len(), "batch download started");
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.run(songs, cancel).await;
        });
        Ok(())
    }

    /// Idempotent; a no-op when no batch is active.
    pub async fn cancel(&self) {
        let active = self.active.lock().await;
        if let Some(token) = active.as_ref() {
            token.cancel();
            tracing::info!("batch cancellation requested");
        }
    }

    async fn run(self: Arc<Self>, songs: Vec<SongInfo>, cancel: CancellationToken) {
        let total = songs.len();
        let mut completed = 0usize;

        for song in songs {
            if cancel.is_cancelled() {
                break;
            }

            let song_id = song.id;
            let current_song = song.name.clone();
            self.publish(total, completed, &current_song, 0.0);

            let handle = match self.registry.start(song).await {
                Ok(handle) => handle,
                Err(DownloadError::AlreadyInProgress { .. }) => {
                    tracing::warn!(song_id, "song already downloading, batch skips it");
                    continue;
                }
                Err(e) => {
                    tracing::error!(song_id, "batch could not start song: {}", e);
                    continue;
                }
            };

            let mut tasks_rx = self.registry.subscribe();
            let mut wait = std::pin::pin!(handle.wait());
            let status = loop {
                tokio::select! {
                    status = &mut wait => break status,
                    _ = cancel.cancelled() => {
                        let _ = self.registry.cancel(song_id).await;
                        break wait.await;
                    }
                    changed = tasks_rx.changed() => {
                        if changed.is_err() {
                            break wait.await;
                        }
                        let fraction = {
                            let snapshot = tasks_rx.borrow_and_update();
                            snapshot
                                .iter()
                                .find(|t| t.song.id == song_id)
                                .and_then(|t| t.progress.as_ref())
                                .map(|p| p.percentage / 100.0)
                                .unwrap_or(0.0)
                        };
                        self.publish(total, completed, &current_song, fraction);
                    }
                }
            };

            match status {
                DownloadStatus::Completed => {
                    completed += 1;
                    self.publish(total, completed, &current_song, 0.0);
                }
                DownloadStatus::Cancelled if cancel.is_cancelled() => break,
                DownloadStatus::Cancelled => {
                    // cancelled individually, not through the batch
                    tracing::info!(song_id, "batch continues past cancelled song");
                }
                DownloadStatus::Failed => {
                    tracing::warn!(song_id, "batch continues past failed song");
                }
                DownloadStatus::Downloading => unreachable!("wait() resolves terminal"),
            }
        }

        *self.active.lock().await = None;
        let _ = self.progress_tx.send(None);
        tracing::info!(completed, total, "batch finished");
    }

    fn publish(&self, total: usize, completed: usize, current_song: &str, fraction: f64) {
        let percentage =
            (((completed as f64 + fraction) / total as f64) * 100.0).clamp(0.0, 100.0);
        let _ = self.progress_tx.send(Some(BatchDownloadProgress {
            total_songs: total,
            completed_songs: completed,
            current_song: current_song.to_string(),
            percentage,
        }));
    }
}
