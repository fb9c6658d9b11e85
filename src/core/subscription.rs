//! Subscription aggregation.
//!
//! A raw subscription is newline-delimited text. Entries that are http/https
//! URLs are fetched, base64-decoded (then percent-decoded once if the result
//! still carries `%` escapes) and spliced in at their position. An entry that
//! is itself a base64 blob of share links is unwrapped the same way; every
//! other entry passes through verbatim. Expansion is sequential so the output order
//! is deterministic, and a failing reference only drops itself.
use std::sync::Arc;

use thiserror::Error;

use crate::{
    core::codec::{self, DecodeError},
    ports::http_client::{HttpClient, HttpClientError},
};

/// User-Agent used for remote fetches unless the caller overrides it
pub const DEFAULT_USER_AGENT: &str = "curl/7.74.0";

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SubscriptionError {
    /// Aggregation produced nothing to return
    #[error("Subscription aggregation produced an empty result")]
    Empty,
}

/// Why a single remote reference contributed nothing
#[derive(Error, Debug)]
enum ExpandError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] HttpClientError),

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
}

pub struct SubscriptionResolver {
    http_client: Arc<dyn HttpClient>,
}

impl SubscriptionResolver {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }

    /// Whether `entry` is a remote reference rather than a descriptor
    pub fn is_remote_reference(entry: &str) -> bool {
        let entry = entry.trim_start();
        entry.starts_with("http://") || entry.starts_with("https://")
    }

    /// Expand every remote reference in `raw`, preserving entry order.
    pub async fn resolve(&self, raw: &str, user_agent: &str) -> Vec<String> {
        let mut descriptors = Vec::new();

        for entry in raw.split('\n') {
            if !Self::is_remote_reference(entry) {
                match Self::expand_inline(entry) {
                    Some(lines) => descriptors.extend(lines),
                    None => descriptors.push(entry.to_string()),
                }
                continue;
            }

            let url = entry.trim();
            match self.expand_remote(url, user_agent).await {
                Ok(lines) => {
                    tracing::debug!("Expanded {} into {} descriptors", url, lines.len());
                    descriptors.extend(lines);
                }
                Err(e) => {
                    tracing::warn!("Skipping subscription reference {}: {}", url, e);
                }
            }
        }

        descriptors
    }

    /// Resolve and re-encode the newline-joined result as base64.
    pub async fn aggregate_base64(
        &self,
        raw: &str,
        user_agent: &str,
    ) -> Result<String, SubscriptionError> {
        let joined = self.resolve(raw, user_agent).await.join("\n");
        if joined.is_empty() {
            return Err(SubscriptionError::Empty);
        }
        Ok(codec::encode_base64(&joined))
    }

    async fn expand_remote(&self, url: &str, user_agent: &str) -> Result<Vec<String>, ExpandError> {
        let body = self.http_client.get_text(url, user_agent).await?;
        Ok(Self::decode_payload(&body)?)
    }

    /// Lines of an inline base64 blob, or `None` when `entry` is not one.
    fn expand_inline(entry: &str) -> Option<Vec<String>> {
        let trimmed = entry.trim();
        if trimmed.is_empty() || trimmed.contains("://") {
            return None;
        }

        let lines = Self::decode_payload(trimmed).ok()?;
        if !lines.iter().any(|line| line.contains("://")) {
            return None;
        }
        tracing::debug!("Expanded inline subscription into {} descriptors", lines.len());
        Some(lines)
    }

    fn decode_payload(payload: &str) -> Result<Vec<String>, DecodeError> {
        let mut decoded = codec::decode_base64(payload.trim())?;
        if decoded.contains('%') {
            decoded = codec::percent_decode(&decoded)?;
        }

        Ok(decoded
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }
}
