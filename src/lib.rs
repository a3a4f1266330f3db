//! Download orchestration for a music-streaming client.
//!
//! The crate is organized around one [`DownloadService`] instance: it owns
//! the ordered task registry, the sequential batch coordinator and the
//! persisted downloaded-songs library, and publishes immutable snapshots
//! over `tokio::sync::watch` channels for any UI to render.

pub mod core;
pub mod error;
pub mod models;
pub mod service;
pub mod storage;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{DownloadError, Result};
pub use service::DownloadService;
