//! HTTP transport: a single streaming request/response round trip, with cancellation and
//! status-code classification.
//!
//! Replaces the teacher SDK's plain `reqwest::Client::post(...).send().await` call (see
//! `client.rs`) with one that races the response against both a
//! [`tokio_util::sync::CancellationToken`] and an optional default deadline via `tokio::select!`,
//! classifying which fired first: the token cancelling reports `Aborted`, the deadline elapsing
//! reports `Timeout`. The two are raced as independent futures rather than conflated into one, so
//! a caller that holds both a cancellation token and a default timeout still gets the right
//! classification regardless of which fires. Status codes are classified into the §7 taxonomy by
//! [`crate::adapter::classify_status`].

use crate::adapter::classify_status;
use crate::error::{Error, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A prepared request ready to send: method is always POST in this core (the only outbound
/// call shape providers need), body already serialized to a JSON value by the adapter.
pub struct Request {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

/// Executes requests against a shared `reqwest::Client`, honoring cancellation and an optional
/// default deadline.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    default_timeout: Option<Duration>,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            default_timeout: None,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Send `req` and return the still-streaming response on success. The caller is
    /// responsible for reading the body (typically via [`crate::sse::parse_sse_stream`]);
    /// this method resolves as soon as headers arrive, or as soon as cancellation/timeout
    /// fires first.
    ///
    /// `cancel` firing always reports [`Error::aborted`]; the default deadline elapsing always
    /// reports [`Error::timeout`]. Both are raced simultaneously when present, so holding a
    /// cancellation token does not suppress the default deadline or vice versa.
    pub async fn send(&self, req: Request, cancel: Option<&CancellationToken>) -> Result<reqwest::Response> {
        let mut builder = self.client.post(&req.url).json(&req.body);
        for (key, value) in &req.headers {
            builder = builder.header(key, value);
        }
        let send_fut = builder.send();

        let response = match (cancel, self.default_timeout) {
            (Some(token), Some(deadline)) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(Error::aborted()),
                    _ = tokio::time::sleep(deadline) => return Err(Error::timeout()),
                    result = send_fut => result?,
                }
            }
            (Some(token), None) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(Error::aborted()),
                    result = send_fut => result?,
                }
            }
            (None, Some(deadline)) => {
                tokio::select! {
                    biased;
                    _ = tokio::time::sleep(deadline) => return Err(Error::timeout()),
                    result = send_fut => result?,
                }
            }
            (None, None) => send_fut.await?,
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        Err(classify_status(status.as_u16(), retry_after_secs))
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}
