use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use common_exception::{BoundariesError, Result};
use common_utils::ByteRange;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode, Url};
use tokio::sync::OnceCell;
use tracing::{debug, trace, warn};

use crate::option::HttpOptions;
use crate::source::ByteSource;

/// A dataset served over HTTP, read with `Range` requests
///
/// The server must answer range requests with `206 Partial Content`; a server
/// that sends the whole body instead is rejected with
/// [`BoundariesError::RangeUnsupported`] rather than downloaded. The length is
/// discovered once with a one-byte probe and cached.
#[derive(Debug)]
pub struct HttpSource {
    client: Client,
    url: Url,
    name: String,
    length: OnceCell<u64>,
}

impl HttpSource {
    pub fn new(url: &str, options: &HttpOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent.as_str())
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .build()
            .map_err(|err| {
                BoundariesError::Config(format!("Failed to create HTTP client: {err}"))
            })?;
        Self::with_client(client, url)
    }

    /// Use an existing client and its connection pool.
    pub fn with_client(client: Client, url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|err| BoundariesError::Config(format!("Invalid dataset URL {url}: {err}")))?;
        Ok(Self {
            client,
            name: url.to_string(),
            url,
            length: OnceCell::new(),
        })
    }

    /// Issue one range request and return the `206` response body with its
    /// `Content-Range` header.
    async fn get_range(&self, range: ByteRange) -> Result<(Bytes, Option<String>)> {
        trace!(url = %self.url, %range, "requesting range");
        let response = self
            .client
            .get(self.url.clone())
            .header(RANGE, range.to_http_header())
            .send()
            .await
            .map_err(|err| self.transport_error(range, err))?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {}
            StatusCode::OK => {
                warn!(url = %self.url, "server ignored the range request");
                return Err(BoundariesError::RangeUnsupported(self.name.clone()));
            }
            status => {
                warn!(url = %self.url, %range, %status, "range request failed");
                return Err(BoundariesError::ByteSourceIo(format!(
                    "{} answered {status} for range {range}",
                    self.name
                )));
            }
        }

        let content_range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes()
            .await
            .map_err(|err| self.transport_error(range, err))?;
        Ok((body, content_range))
    }

    fn transport_error(&self, range: ByteRange, err: reqwest::Error) -> BoundariesError {
        warn!(url = %self.url, %range, error = %err, "range request failed");
        if err.is_timeout() {
            BoundariesError::ByteSourceTimeout(format!("{} range {range}: {err}", self.name))
        } else {
            BoundariesError::ByteSourceIo(format!("{} range {range}: {err}", self.name))
        }
    }

    async fn probe_length(&self) -> Result<u64> {
        let (_, content_range) = self.get_range(ByteRange::new(0, 1)).await?;
        let length = content_range
            .as_deref()
            .and_then(parse_content_range_total)
            .ok_or_else(|| {
                BoundariesError::ByteSourceIo(format!(
                    "{} did not report a total length in Content-Range",
                    self.name
                ))
            })?;
        debug!(url = %self.url, length, "discovered remote dataset length");
        Ok(length)
    }
}

/// Total length from a `Content-Range: bytes 0-0/12345` value.
fn parse_content_range_total(value: &str) -> Option<u64> {
    let (unit, rest) = value.trim().split_once(' ')?;
    if !unit.eq_ignore_ascii_case("bytes") {
        return None;
    }
    let (_, total) = rest.split_once('/')?;
    total.trim().parse().ok()
}

#[async_trait]
impl ByteSource for HttpSource {
    async fn read_range(&self, range: ByteRange) -> Result<Bytes> {
        if range.is_empty() {
            return Ok(Bytes::new());
        }
        let (body, _) = self.get_range(range).await?;
        if body.len() as u64 != range.length {
            return Err(BoundariesError::ByteSourceIo(format!(
                "{} returned {} bytes for range {range}",
                self.name,
                body.len()
            )));
        }
        Ok(body)
    }

    async fn length(&self) -> Result<u64> {
        self.length
            .get_or_try_init(|| self.probe_length())
            .await
            .copied()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
