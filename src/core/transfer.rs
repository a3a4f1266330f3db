use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::fetch::MediaFetcher;
use crate::error::{DownloadError, Result};

const WRITE_BUF_CAPACITY: usize = 256 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct TransferSample {
    pub bytes_read: u64,
    pub total_bytes: Option<u64>,
}

/// Streams one remote asset into `part_path`. Checks the cancellation
/// token at every chunk boundary, pushes progress samples without ever
/// blocking on the receiver, and verifies the byte count against the
/// advertised total. Any outcome other than `Ok` leaves no part file
/// behind.
pub async fn transfer_to_part(
    fetcher: &dyn MediaFetcher,
    url: &str,
    part_path: &Path,
    stall_timeout: Duration,
    progress_tx: &mpsc::Sender<TransferSample>,
    cancel: &CancellationToken,
) -> Result<u64> {
    if let Some(parent) = part_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let stream = fetcher
        .open(url)
        .await
        .map_err(|e| DownloadError::TransferFailed(e.to_string()))?;
    let total_bytes = stream.total_bytes;
    let mut body = stream.bytes;

    let file = tokio::fs::File::create(part_path).await?;
    let mut file = tokio::io::BufWriter::with_capacity(WRITE_BUF_CAPACITY, file);
    let mut bytes_read: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            drop(file);
            discard_part(part_path).await;
            return Err(DownloadError::Cancelled);
        }

        match tokio::time::timeout(stall_timeout, body.next()).await {
            Ok(Some(Ok(chunk))) => {
                if let Err(e) = file.write_all(&chunk).await {
                    drop(file);
                    discard_part(part_path).await;
                    return Err(DownloadError::Storage(e));
                }
                bytes_read += chunk.len() as u64;
                let _ = progress_tx.try_send(TransferSample {
                    bytes_read,
                    total_bytes,
                });
            }
            Ok(Some(Err(e))) => {
                drop(file);
                discard_part(part_path).await;
                return Err(DownloadError::TransferFailed(e.to_string()));
            }
            Ok(None) => break,
            Err(_) => {
                drop(file);
                discard_part(part_path).await;
                return Err(DownloadError::TransferFailed(format!(
                    "no data received for {}s",
                    stall_timeout.as_secs()
                )));
            }
        }
    }

    if let Err(e) = file.flush().await {
        drop(file);
        discard_part(part_path).await;
        return Err(DownloadError::Storage(e));
    }
    drop(file);

    if let Some(expected) = total_bytes {
        if expected > 0 && bytes_read != expected {
            discard_part(part_path).await;
            return Err(DownloadError::CorruptTransfer {
                expected,
                actual: bytes_read,
            });
        }
    }

    Ok(bytes_read)
}

pub async fn discard_part(part_path: &Path) {
    if let Err(e) = tokio::fs::remove_file(part_path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(
                "failed to remove part file {}: {}",
                part_path.display(),
                e
            );
        }
    }
}
