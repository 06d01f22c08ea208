//! # Download streamer
//!
//! Streams a negotiated content URI into any [`AsyncWrite`] sink without holding the body in
//! memory. Each network chunk is handed to the sink in slices of at most `chunk_size` bytes and
//! the sink is flushed once the chunk has been written.

use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument};

use crate::config::{CONTENT_AUTH_QUERY_KEY, NicoConfig};
use crate::error::{NicoError, Result};

/// Progress of a running transfer, reported after every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub written: u64,
    /// Declared content length, when the server sent one
    pub total: Option<u64>,
}

impl DownloadProgress {
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(100.0),
            Some(total) => Some(self.written as f64 / total as f64 * 100.0),
            None => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadStreamer {
    client: Client,
    headers: HeaderMap,
}

impl DownloadStreamer {
    pub fn new(client: Client, config: &NicoConfig) -> Self {
        let mut headers = config.api_headers.clone();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
        Self { client, headers }
    }

    /// Streams `uri` into `sink` and returns the number of bytes written.
    ///
    /// On failure whatever was already written stays in the sink.
    #[instrument(skip(self, auth_token, sink, on_progress), level = "debug")]
    pub async fn stream<W, F>(
        &self,
        uri: &str,
        auth_token: Option<&str>,
        sink: &mut W,
        chunk_size: usize,
        mut on_progress: F,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
        F: FnMut(DownloadProgress),
    {
        let chunk_size = chunk_size.max(1);

        let mut request = self.client.get(uri).headers(self.headers.clone());
        if let Some(token) = auth_token {
            request = request.query(&[(CONTENT_AUTH_QUERY_KEY, token)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NicoError::transfer(uri, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NicoError::transfer_status(uri, status));
        }

        let total = response.content_length();
        match total {
            Some(size) => info!(uri, size, "Download started"),
            None => info!(uri, "Download started, content length not available"),
        }

        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let mut chunk: Bytes = chunk.map_err(|e| NicoError::transfer(uri, e))?;
            while !chunk.is_empty() {
                let piece = chunk.split_to(chunk_size.min(chunk.len()));
                sink.write_all(&piece)
                    .await
                    .map_err(|e| NicoError::transfer(uri, e))?;
                written += piece.len() as u64;
                on_progress(DownloadProgress { written, total });
            }
            sink.flush()
                .await
                .map_err(|e| NicoError::transfer(uri, e))?;
        }

        debug!(uri, written, "Download finished");
        Ok(written)
    }
}
