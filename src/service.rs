use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;

use crate::core::batch::BatchCoordinator;
use crate::core::fetch::MediaFetcher;
use crate::core::registry::{TaskHandle, TaskListSnapshot, TaskRegistry};
use crate::error::Result;
use crate::models::settings::DownloadSettings;
use crate::models::song::{DownloadedSong, SongInfo};
use crate::models::task::{BatchDownloadProgress, DownloadTask};
use crate::storage::library::MusicLibrary;
use crate::storage::paths::LibraryPaths;

/// The one object a client embeds. Wires the fetcher, the library, the
/// task registry and the batch coordinator together and exposes the whole
/// command/query surface. Construct it once and share the `Arc`.
pub struct DownloadService {
    registry: Arc<TaskRegistry>,
    batch: Arc<BatchCoordinator>,
    library: Arc<MusicLibrary>,
}

impl DownloadService {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        paths: Arc<dyn LibraryPaths>,
        settings: DownloadSettings,
    ) -> Result<Arc<Self>> {
        let library = Arc::new(MusicLibrary::open(paths)?);
        let registry = TaskRegistry::new(fetcher, library.clone(), settings);
        let batch = BatchCoordinator::new(registry.clone());
        Ok(Arc::new(Self {
            registry,
            batch,
            library,
        }))
    }

    // --- commands ---

    /// Starts a single download. The returned handle resolves with the
    /// terminal status; dropping it does not affect the transfer.
    pub async fn download(&self, song: SongInfo) -> Result<TaskHandle> {
        self.registry.start(song).await
    }

    /// Starts a sequential batch. Songs already in the library are
    /// downloaded again; songs already transferring are skipped.
    pub async fn download_batch(&self, songs: Vec<SongInfo>) -> Result<()> {
        self.batch.start(songs).await
    }

    pub async fn cancel(&self, song_id: u64) -> Result<()> {
        self.registry.cancel(song_id).await
    }

    pub async fn cancel_batch(&self) {
        self.batch.cancel().await
    }

    /// Restarts a cancelled task from byte zero.
    pub async fn resume(&self, song_id: u64) -> Result<TaskHandle> {
        self.registry.resume(song_id).await
    }

    /// Dismisses a terminal task from the visible list.
    pub async fn remove(&self, song_id: u64) -> Result<()> {
        self.registry.remove(song_id).await
    }

    pub async fn clear_completed(&self) {
        self.registry.clear_completed().await
    }

    /// Deletes a downloaded song's files and index entry.
    pub async fn delete(&self, song_id: u64) -> Result<()> {
        self.library.remove(song_id).await
    }

    // --- queries ---

    pub async fn tasks(&self) -> Vec<DownloadTask> {
        self.registry.tasks().await
    }

    pub async fn list_downloaded(&self) -> Vec<DownloadedSong> {
        self.library.list().await
    }

    pub async fn local_path(&self, song_id: u64) -> Option<PathBuf> {
        self.library.local_path(song_id).await
    }

    // --- snapshot channels ---

    pub fn subscribe_tasks(&self) -> watch::Receiver<TaskListSnapshot> {
        self.registry.subscribe()
    }

    pub fn subscribe_batch(&self) -> watch::Receiver<Option<BatchDownloadProgress>> {
        self.batch.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DownloadError;
    use crate::models::task::DownloadStatus;
    use crate::testutil::{fast_settings, song, FakeFetcher, FakeSource, TempPaths};
    use std::time::Duration;

    fn service(dir: &tempfile::TempDir) -> (Arc<FakeFetcher>, Arc<DownloadService>) {
        let fetcher = FakeFetcher::new();
        let service =
            DownloadService::new(fetcher.clone(), TempPaths::new(dir), fast_settings()).unwrap();
        (fetcher, service)
    }

    #[tokio::test]
    async fn single_download_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let (fetcher, service) = service(&dir);
        fetcher.insert(
            "song://1",
            FakeSource::of_len(1000)
                .chunk_size(100)
                .chunk_delay(Duration::from_millis(5)),
        );

        let mut rx = service.subscribe_tasks();
        let handle = service.download(song(1, "A")).await.unwrap();

        // progress is observable while the transfer runs
        let mut saw_live_progress = false;
        loop {
            rx.changed().await.unwrap();
            let snapshot = rx.borrow_and_update().clone();
            let Some(task) = snapshot.iter().find(|t| t.song.id == 1) else {
                continue;
            };
            if task.status.is_terminal() {
                break;
            }
            if task.progress.as_ref().is_some_and(|p| p.bytes_read > 0) {
                saw_live_progress = true;
            }
        }
        assert!(saw_live_progress);
        assert_eq!(handle.wait().await, DownloadStatus::Completed);

        let downloaded = service.list_downloaded().await;
        assert_eq!(downloaded.len(), 1);
        assert_eq!(downloaded[0].file_size, 1000);
        let path = service.local_path(1).await.unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 1000);
    }

    #[tokio::test]
    async fn batch_cancel_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let (fetcher, service) = service(&dir);
        fetcher.insert("song://1", FakeSource::of_len(300).chunk_size(100));
        fetcher.insert(
            "song://2",
            FakeSource::of_len(50_000)
                .chunk_size(100)
                .chunk_delay(Duration::from_millis(10)),
        );
        fetcher.insert("song://3", FakeSource::of_len(300).chunk_size(100));

        let mut rx = service.subscribe_batch();
        service
            .download_batch(vec![song(1, "A"), song(2, "B"), song(3, "C")])
            .await
            .unwrap();

        loop {
            rx.changed().await.unwrap();
            let on_second = rx
                .borrow_and_update()
                .as_ref()
                .is_some_and(|p| p.completed_songs == 1);
            if on_second {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        service.cancel_batch().await;
        loop {
            rx.changed().await.unwrap();
            if rx.borrow_and_update().is_none() {
                break;
            }
        }

        assert_eq!(service.list_downloaded().await.len(), 1);
        let statuses: Vec<DownloadStatus> =
            service.tasks().await.iter().map(|t| t.status).collect();
        assert_eq!(
            statuses,
            vec![DownloadStatus::Completed, DownloadStatus::Cancelled]
        );

        // a new batch may start once the previous one wound down
        service.download_batch(vec![song(3, "C")]).await.unwrap();
    }

    #[tokio::test]
    async fn delete_removes_files_and_index_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (fetcher, service) = service(&dir);
        fetcher.insert("song://1", FakeSource::of_len(100));

        let handle = service.download(song(1, "A")).await.unwrap();
        assert_eq!(handle.wait().await, DownloadStatus::Completed);
        let path = service.local_path(1).await.unwrap();
        assert!(path.exists());

        service.delete(1).await.unwrap();

        assert!(!path.exists());
        assert!(service.list_downloaded().await.is_empty());
        assert_eq!(service.local_path(1).await, None);
        assert!(matches!(
            service.delete(1).await,
            Err(DownloadError::NotFound { song_id: 1 })
        ));
    }

    #[tokio::test]
    async fn redownload_after_delete_works() {
        let dir = tempfile::tempdir().unwrap();
        let (fetcher, service) = service(&dir);
        fetcher.insert("song://1", FakeSource::of_len(100));

        service.download(song(1, "A")).await.unwrap().wait().await;
        service.delete(1).await.unwrap();
        service.download(song(1, "A")).await.unwrap().wait().await;

        assert_eq!(service.list_downloaded().await.len(), 1);
        assert!(service.local_path(1).await.unwrap().exists());
    }

    #[tokio::test]
    async fn library_survives_service_reconstruction() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (fetcher, service) = service(&dir);
            fetcher.insert("song://1", FakeSource::of_len(100));
            service.download(song(1, "A")).await.unwrap().wait().await;
        }

        let (_, reopened) = service(&dir);
        let downloaded = reopened.list_downloaded().await;
        assert_eq!(downloaded.len(), 1);
        assert_eq!(downloaded[0].id, 1);
        assert!(reopened.local_path(1).await.unwrap().exists());
    }
}
