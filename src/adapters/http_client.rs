use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result};
use reqwest::{Client, header};
use tracing::Instrument;

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientResult};

/// HTTP client adapter for remote subscription fetches, backed by `reqwest`
/// with rustls.
///
/// Only success statuses count as a fetched payload. Every other status and
/// every transport failure is reported as an [`HttpClientError`] so the caller
/// can skip the reference.
#[derive(Clone)]
pub struct HttpClientAdapter {
    client: Client,
    timeout: Option<Duration>,
}

impl HttpClientAdapter {
    /// Create a client whose requests are bounded by `timeout` (`None` = unbounded).
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .context("Failed to build HTTP client")?;

        tracing::debug!("Created subscription fetch client (timeout: {:?})", timeout);
        Ok(Self { client, timeout })
    }

    fn map_error(&self, url: &str, err: reqwest::Error) -> HttpClientError {
        if err.is_timeout() {
            HttpClientError::Timeout(self.timeout.map(|t| t.as_secs()).unwrap_or_default())
        } else if err.is_builder() {
            HttpClientError::InvalidRequest(format!("{url}: {err}"))
        } else {
            HttpClientError::ConnectionError(format!("GET {url} failed: {err}"))
        }
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn get_text(&self, url: &str, user_agent: &str) -> HttpClientResult<String> {
        let span = tracing::debug_span!(
            "subscription_fetch",
            http.url = %url,
            http.status_code = tracing::field::Empty,
        );

        async move {
            let response = self
                .client
                .get(url)
                .header(header::USER_AGENT, user_agent)
                .send()
                .await
                .map_err(|e| self.map_error(url, e))?;

            let status = response.status();
            tracing::Span::current().record("http.status_code", status.as_u16());
            if !status.is_success() {
                return Err(HttpClientError::UpstreamStatus {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let body = response.text().await.map_err(|e| self.map_error(url, e))?;
            tracing::debug!("Fetched {} bytes from {}", body.len(), url);
            Ok(body)
        }
        .instrument(span)
        .await
    }
}
