use std::path::PathBuf;

/// Durable directories the library writes into. Injected so tests (and
/// alternative platforms) can root everything elsewhere.
pub trait LibraryPaths: Send + Sync {
    fn songs_dir(&self) -> PathBuf;
    fn covers_dir(&self) -> PathBuf;
    fn data_dir(&self) -> PathBuf;
}

pub struct DesktopPaths;

impl LibraryPaths for DesktopPaths {
    fn songs_dir(&self) -> PathBuf {
        dirs::audio_dir()
            .map(|d| d.join("songvault"))
            .unwrap_or_else(|| PathBuf::from("songvault"))
    }

    fn covers_dir(&self) -> PathBuf {
        self.data_dir().join("covers")
    }

    fn data_dir(&self) -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join("songvault"))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
