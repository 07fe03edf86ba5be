//! HTTP client wrapper with Range request support and retry logic.

use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::error::{CloudError, Result};

/// HTTP client for fetching byte ranges from remote files.
pub struct HttpClient {
    client: Client,
    max_retries: u32,
}

/// Response from a HEAD request.
pub struct HeadInfo {
    /// Total file size in bytes, if reported by the server.
    pub content_length: Option<u64>,
    /// Whether the server advertises Range support.
    pub accept_ranges: bool,
}

impl HttpClient {
    pub fn new(request_timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            max_retries,
        })
    }

    /// Send a HEAD request to discover file size and Range support.
    pub async fn head(&self, url: &str) -> Result<HeadInfo> {
        let resp = self.execute_with_retry(self.client.head(url)).await?;
        let headers = resp.headers();

        let accept_ranges = headers
            .get("accept-ranges")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("bytes"))
            .unwrap_or(false);

        let content_length = headers
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        Ok(HeadInfo {
            content_length,
            accept_ranges,
        })
    }

    /// Fetch `[offset .. offset + length)` of a remote file.
    pub async fn fetch_range(&self, url: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let range_value = format!("bytes={}-{}", offset, offset + length - 1);
        let req = self.client.get(url).header("Range", &range_value);
        let resp = self.execute_with_retry(req).await?;

        let status = resp.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE
            || (status.is_success() && status != StatusCode::PARTIAL_CONTENT)
        {
            return Err(CloudError::RangeNotSupported {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(CloudError::Network(format!("HTTP {} fetching {}", status, url)));
        }

        let bytes = resp.bytes().await?;
        tracing::trace!("fetched {} bytes at {} from {}", bytes.len(), offset, url);
        Ok(bytes.to_vec())
    }

    /// Execute a request, retrying timeouts and connection failures with
    /// exponential backoff (100 ms, 200 ms, 400 ms, ...).
    async fn execute_with_retry(
        &self,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let mut attempt = 0;
        loop {
            let Some(cloned) = request.try_clone() else {
                return request.send().await;
            };
            match cloned.send().await {
                Ok(resp) => return Ok(resp),
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < self.max_retries => {
                    let backoff = Duration::from_millis(100 * 2u64.pow(attempt));
                    tracing::debug!("request failed ({e}), retrying in {:?}", backoff);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
