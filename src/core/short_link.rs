//! Short links.
//!
//! A short link maps an opaque code to either a query string (`?config=...`)
//! or, for links minted by the v1 endpoint, a full URL. The one-letter prefix
//! of the short path selects which conversion route the stored query is
//! replayed against.
use std::{fmt, str::FromStr, sync::Arc};

use thiserror::Error;
use url::Url;

use crate::{
    core::codec::random_code,
    ports::{
        config_builder::TargetFormat,
        kv_store::{KvStore, StoreError},
    },
};

/// Attempts at minting an unused code before giving up
const MAX_CODE_ATTEMPTS: usize = 8;

/// Store key prefix; keeps short links apart from other users of the same store
const KEY_PREFIX: &str = "link:";

fn store_key(code: &str) -> String {
    format!("{KEY_PREFIX}{code}")
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ShortLinkError {
    /// The URL to shorten could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid short code: {0}")]
    InvalidCode(String),

    /// The short URL to resolve is malformed or has an unknown prefix
    #[error("Invalid short URL: {0}")]
    InvalidShortUrl(String),

    #[error("Could not mint an unused short code after {0} attempts")]
    CodeExhausted(usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Route family a short path redirects into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShortLinkPrefix {
    Singbox,
    Clash,
    Xray,
    Surge,
}

impl ShortLinkPrefix {
    pub const ALL: [ShortLinkPrefix; 4] = [
        ShortLinkPrefix::Singbox,
        ShortLinkPrefix::Clash,
        ShortLinkPrefix::Xray,
        ShortLinkPrefix::Surge,
    ];

    pub fn letter(&self) -> &'static str {
        match self {
            ShortLinkPrefix::Singbox => "b",
            ShortLinkPrefix::Clash => "c",
            ShortLinkPrefix::Xray => "x",
            ShortLinkPrefix::Surge => "s",
        }
    }

    /// Path the stored query is appended to
    pub fn route(&self) -> &'static str {
        match self {
            ShortLinkPrefix::Singbox => TargetFormat::Singbox.route_prefix(),
            ShortLinkPrefix::Clash => TargetFormat::Clash.route_prefix(),
            ShortLinkPrefix::Xray => "/xray",
            ShortLinkPrefix::Surge => TargetFormat::Surge.route_prefix(),
        }
    }

    pub fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.letter() == segment)
    }
}

impl fmt::Display for ShortLinkPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.letter())
    }
}

impl FromStr for ShortLinkPrefix {
    type Err = ShortLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_segment(s).ok_or_else(|| ShortLinkError::InvalidShortUrl(s.to_string()))
    }
}

pub struct ShortLinkService {
    store: Arc<dyn KvStore>,
    code_length: usize,
}

impl ShortLinkService {
    pub fn new(store: Arc<dyn KvStore>, code_length: usize) -> Self {
        Self { store, code_length }
    }

    /// Store the full `url` under a fresh code.
    pub async fn shorten_url(&self, url: &str) -> Result<String, ShortLinkError> {
        self.insert_generated(url.to_string()).await
    }

    /// Store only the query string of `url` (`?...`, or empty when it has none).
    ///
    /// An explicit `code` replaces whatever was stored under it.
    pub async fn shorten_query(
        &self,
        url: &str,
        code: Option<&str>,
    ) -> Result<String, ShortLinkError> {
        let parsed = Url::parse(url)?;
        let query = parsed
            .query()
            .map(|q| format!("?{q}"))
            .unwrap_or_default();

        match code {
            Some(code) => {
                validate_code(code)?;
                self.store.put(&store_key(code), query).await?;
                tracing::info!("Stored short link {} (caller supplied code)", code);
                Ok(code.to_string())
            }
            None => self.insert_generated(query).await,
        }
    }

    /// The raw stored target for `code`
    pub async fn lookup(&self, code: &str) -> Result<Option<String>, ShortLinkError> {
        Ok(self.store.get(&store_key(code)).await?)
    }

    /// Absolute URL `code` expands to under `origin`, or `None` when unknown.
    pub async fn resolve(
        &self,
        origin: &str,
        prefix: ShortLinkPrefix,
        code: &str,
    ) -> Result<Option<String>, ShortLinkError> {
        if code.is_empty() {
            return Ok(None);
        }
        let target = self.lookup(code).await?;
        Ok(target.map(|stored| expand_target(origin, prefix, &stored)))
    }

    /// Resolve a complete short URL such as `https://host/b/abc123`.
    pub async fn resolve_short_url(
        &self,
        origin: &str,
        short_url: &str,
    ) -> Result<Option<String>, ShortLinkError> {
        let parsed = Url::parse(short_url)
            .map_err(|e| ShortLinkError::InvalidShortUrl(e.to_string()))?;

        let segments: Vec<&str> = parsed.path().split('/').collect();
        if segments.len() < 3 {
            return Err(ShortLinkError::InvalidShortUrl(short_url.to_string()));
        }
        let prefix: ShortLinkPrefix = segments[1].parse()?;

        self.resolve(origin, prefix, segments[2]).await
    }

    async fn insert_generated(&self, value: String) -> Result<String, ShortLinkError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = random_code(self.code_length);
            if self.store.put_if_absent(&store_key(&code), value.clone()).await? {
                tracing::info!("Stored short link {}", code);
                return Ok(code);
            }
            tracing::debug!("Short code {} already taken, retrying", code);
        }
        Err(ShortLinkError::CodeExhausted(MAX_CODE_ATTEMPTS))
    }
}

/// Stored absolute URLs redirect as-is; query strings are replayed on the
/// prefix route.
fn expand_target(origin: &str, prefix: ShortLinkPrefix, stored: &str) -> String {
    if stored.starts_with("http://") || stored.starts_with("https://") {
        stored.to_string()
    } else {
        format!("{origin}{}{stored}", prefix.route())
    }
}

fn validate_code(code: &str) -> Result<(), ShortLinkError> {
    let valid = !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ShortLinkError::InvalidCode(code.to_string()))
    }
}
