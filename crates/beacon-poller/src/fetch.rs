//! Upstream fetch: turns the status feed URL into an [`UpstreamSnapshot`].

use std::{future::Future, time::Duration};

use anyhow::Context as _;
use beacon_core::{Error, snapshot::UpstreamSnapshot};
use reqwest::{Client, StatusCode, header};
use tracing::debug;

/// Anything that can produce one upstream snapshot per call.
///
/// Failures are reported as [`Error::FetchFailure`] or
/// [`Error::MalformedSnapshot`] so the caller can publish an error report.
pub trait SnapshotSource: Send + Sync {
  fn fetch(
    &self,
  ) -> impl Future<Output = beacon_core::Result<UpstreamSnapshot>> + Send + '_;

  /// Where snapshots come from, for reports and logs.
  fn describe(&self) -> &str;
}

/// Fetches a Statuspage-style `summary.json` over HTTP.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpSource {
  client:  Client,
  url:     String,
  timeout: Duration,
}

impl HttpSource {
  pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
    let client = Client::builder()
      .timeout(timeout)
      .user_agent(concat!("beacon/", env!("CARGO_PKG_VERSION")))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self {
      client,
      url: url.into(),
      timeout,
    })
  }

  fn failure(&self, e: reqwest::Error) -> Error {
    if e.is_timeout() {
      Error::FetchFailure(format!(
        "GET {} timed out after {}s",
        self.url,
        self.timeout.as_secs()
      ))
    } else {
      Error::FetchFailure(format!("GET {} failed: {e}", self.url))
    }
  }

  fn rejected(&self, status: StatusCode) -> Error {
    Error::FetchFailure(format!("GET {} returned {status}", self.url))
  }
}

impl SnapshotSource for HttpSource {
  async fn fetch(&self) -> beacon_core::Result<UpstreamSnapshot> {
    let resp = self
      .client
      .get(&self.url)
      .header(header::ACCEPT, "application/json")
      .send()
      .await
      .map_err(|e| self.failure(e))?;

    let status = resp.status();
    if !status.is_success() {
      return Err(self.rejected(status));
    }

    let body = resp.bytes().await.map_err(|e| self.failure(e))?;
    debug!(url = %self.url, bytes = body.len(), "fetched upstream snapshot");
    UpstreamSnapshot::from_slice(&body)
  }

  fn describe(&self) -> &str { &self.url }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejected_status_is_a_plain_fetch_failure() {
    let source = HttpSource::new(
      "https://status.example.test/api/v2/summary.json",
      Duration::from_secs(5),
    )
    .unwrap();

    let err = source.rejected(StatusCode::SERVICE_UNAVAILABLE);
    assert!(err.is_poll_failure());
    assert_eq!(
      err.to_string(),
      "fetch failure: GET https://status.example.test/api/v2/summary.json \
       returned 503 Service Unavailable"
    );
    assert!(err.to_string().is_ascii());
  }
}
