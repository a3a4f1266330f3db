use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    /// Upper bound on simultaneously running transfers across the whole
    /// registry. Batches are sequential on top of this.
    #[serde(default = "default_max_concurrent_transfers")]
    pub max_concurrent_transfers: usize,
    /// Minimum interval between published progress snapshots per task.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    /// A transfer that receives no data for this long is failed.
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_audio_extension")]
    pub audio_extension: String,
}

fn default_max_concurrent_transfers() -> usize {
    2
}

fn default_progress_interval_ms() -> u64 {
    150
}

fn default_stall_timeout_secs() -> u64 {
    45
}

fn default_connect_timeout_secs() -> u64 {
    15
}

fn default_audio_extension() -> String {
    "mp3".into()
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: default_max_concurrent_transfers(),
            progress_interval_ms: default_progress_interval_ms(),
            stall_timeout_secs: default_stall_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            audio_extension: default_audio_extension(),
        }
    }
}
