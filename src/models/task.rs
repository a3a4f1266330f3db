use serde::Serialize;

use crate::models::song::SongInfo;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum DownloadStatus {
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DownloadStatus::Downloading)
    }

    /// Terminal states the user may dismiss via `clear_completed`.
    /// `Failed` stays visible until acknowledged through `remove`.
    pub fn is_dismissible(self) -> bool {
        matches!(self, DownloadStatus::Completed | DownloadStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DownloadProgress {
    pub bytes_read: u64,
    pub total_bytes: Option<u64>,
    pub percentage: f64,
    pub speed_bytes_per_sec: f64,
    pub file_name: String,
}

/// One song's download lifecycle record, as published in task-list
/// snapshots. `progress` is present only while `Downloading`; `error`
/// carries the human-readable cause for `Failed` tasks.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadTask {
    pub song: SongInfo,
    pub status: DownloadStatus,
    pub progress: Option<DownloadProgress>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchDownloadProgress {
    pub total_songs: usize,
    pub completed_songs: usize,
    pub current_song: String,
    pub percentage: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downloading_is_not_terminal() {
        assert!(!DownloadStatus::Downloading.is_terminal());
    }

    #[test]
    fn completed_failed_cancelled_are_terminal() {
        assert!(DownloadStatus::Completed.is_terminal());
        assert!(DownloadStatus::Failed.is_terminal());
        assert!(DownloadStatus::Cancelled.is_terminal());
    }

    #[test]
    fn failed_is_not_dismissible() {
        assert!(!DownloadStatus::Failed.is_dismissible());
        assert!(!DownloadStatus::Downloading.is_dismissible());
    }

    #[test]
    fn completed_and_cancelled_are_dismissible() {
        assert!(DownloadStatus::Completed.is_dismissible());
        assert!(DownloadStatus::Cancelled.is_dismissible());
    }
}
