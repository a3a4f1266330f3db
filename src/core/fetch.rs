use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::models::settings::DownloadSettings;

/// An open byte stream for one remote asset. `total_bytes` is the
/// server-advertised length when known; transfers verify against it.
pub struct MediaStream {
    pub bytes: BoxStream<'static, anyhow::Result<Bytes>>,
    pub total_bytes: Option<u64>,
}

/// Network capability consumed by the orchestrator. Injected so tests run
/// against an in-memory implementation.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn open(&self, url: &str) -> anyhow::Result<MediaStream>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(settings: &DownloadSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn open(&self, url: &str) -> anyhow::Result<MediaStream> {
        let parsed = url::Url::parse(url)
            .map_err(|e| anyhow::anyhow!("invalid media URL {}: {}", url, e))?;

        let response = self.client.get(parsed).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {} fetching {}", status, url);
        }
        if let Some(ct) = response.headers().get("content-type") {
            if ct.to_str().is_ok_and(|v| v.contains("text/html")) {
                anyhow::bail!("server returned HTML instead of media, URL may have expired");
            }
        }

        let total_bytes = response.content_length();
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(anyhow::Error::from))
            .boxed();
        Ok(MediaStream { bytes, total_bytes })
    }
}

/// Drains a whole asset into memory. Used for cover images, which are
/// small and not worth the temp-file dance.
pub async fn fetch_bytes(fetcher: &dyn MediaFetcher, url: &str) -> anyhow::Result<Vec<u8>> {
    let mut stream = fetcher.open(url).await?;
    let mut buf = match stream.total_bytes {
        Some(total) => Vec::with_capacity(total as usize),
        None => Vec::new(),
    };
    while let Some(chunk) = stream.bytes.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf)
}
