use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::filters::ChunkStream;
use super::{RandomAccessReader, RangeStream};

/// HTTP Range reader for remote ZIP files.
///
/// Each range stream is served by one or more `Range` requests issued from a
/// background task; body chunks are forwarded as they arrive, so an entry is
/// never buffered whole. Connection failures and timeouts are retried with a
/// linear backoff, resuming from the last byte received.
pub struct HttpRangeReader {
    client: Client,
    url: Arc<str>,
    size: u64,
    transferred_bytes: Arc<AtomicU64>,
    max_retry: u32,
}

impl HttpRangeReader {
    /// Create a new HTTP Range reader
    ///
    /// This will send a HEAD request to verify Range support and get file size
    pub async fn new(url: String) -> io::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(io::Error::other)?;

        let resp = client.head(&url).send().await.map_err(io::Error::other)?;
        if !resp.status().is_success() {
            return Err(io::Error::other(format!(
                "HTTP request failed with status: {}",
                resp.status()
            )));
        }

        let accept_ranges = resp
            .headers()
            .get("accept-ranges")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none");
        if !accept_ranges.contains("bytes") {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "Remote server does not support Range requests",
            ));
        }

        let size = resp
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| io::Error::other("Remote server did not return Content-Length"))?;

        debug!(url = %url, size, "remote archive supports range requests");
        Ok(Self {
            client,
            url: url.into(),
            size,
            transferred_bytes: Arc::new(AtomicU64::new(0)),
            max_retry: 10,
        })
    }

    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    /// Size reported by the server.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// Shared transfer counter, still readable after the reader is handed
    /// to a [`ZipFile`](crate::ZipFile).
    pub fn transfer_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.transferred_bytes)
    }
}

#[async_trait]
impl RandomAccessReader for HttpRangeReader {
    async fn read_stream_for_range(&self, start: u64, end: u64) -> io::Result<RangeStream> {
        let (tx, rx) = mpsc::channel(4);
        let fetch = RangeFetch {
            client: self.client.clone(),
            url: Arc::clone(&self.url),
            start,
            end: end.min(self.size),
            transferred_bytes: Arc::clone(&self.transferred_bytes),
            max_retry: self.max_retry,
        };
        tokio::spawn(async move {
            if let Err(err) = fetch.run(&tx).await {
                // receiver may already be gone if the stream was aborted
                let _ = tx.send(Err(err)).await;
            }
        });
        Ok(Box::pin(ChunkStream::new(rx)))
    }
}

struct RangeFetch {
    client: Client,
    url: Arc<str>,
    start: u64,
    end: u64,
    transferred_bytes: Arc<AtomicU64>,
    max_retry: u32,
}

impl RangeFetch {
    async fn run(&self, tx: &mpsc::Sender<io::Result<Bytes>>) -> io::Result<()> {
        let mut received = 0u64;
        let mut retry_count = 0;
        let expected = self.end.saturating_sub(self.start);

        while received < expected {
            // HTTP ranges are inclusive
            let range = format!("bytes={}-{}", self.start + received, self.end - 1);
            let result = self
                .client
                .get(&*self.url)
                .header("Range", &range)
                .send()
                .await;

            let mut resp = match result {
                Ok(resp) => resp,
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= self.max_retry {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "Max retries exceeded",
                        ));
                    }
                    warn!(retry_count, max_retry = self.max_retry, error = %e, "connection error, retrying");
                    self.backoff(retry_count).await;
                    continue;
                }
                Err(e) => return Err(io::Error::other(e)),
            };

            if resp.status() != StatusCode::PARTIAL_CONTENT {
                return Err(io::Error::other(format!(
                    "HTTP request failed with status: {}",
                    resp.status()
                )));
            }

            while let Some(chunk) = resp.chunk().await.map_err(io::Error::other)? {
                let take = chunk.len().min((expected - received) as usize);
                if take == 0 {
                    break;
                }
                received += take as u64;
                self.transferred_bytes
                    .fetch_add(take as u64, Ordering::Relaxed);
                if tx.send(Ok(chunk.slice(..take))).await.is_err() {
                    return Ok(());
                }
            }

            if received < expected {
                retry_count += 1;
                if retry_count >= self.max_retry {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("response body ended after {received} of {expected} bytes"),
                    ));
                }
                warn!(received, expected, retry_count, "short response body, retrying");
                self.backoff(retry_count).await;
            }
        }
        Ok(())
    }

    async fn backoff(&self, retry_count: u32) {
        tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
    }
}
