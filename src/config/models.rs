//! Configuration data structures for sublink.
//!
//! These types map directly to YAML (also JSON / TOML) configuration files and to
//! `SUBLINK__*` environment variables. Every field has a default so the server can
//! start with no configuration file at all.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::subscription::DEFAULT_USER_AGENT;

/// Default listen address
fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub listen_addr: String,
    /// Fixed origin (`scheme://host[:port]`) used when building short links and
    /// redirect targets. When unset the origin is derived from each request.
    pub public_origin: Option<String>,
    /// Language used for messages when the request does not name a supported one
    pub default_language: String,
    /// User-Agent sent when fetching remote subscriptions (overridable per request)
    pub default_user_agent: String,
    /// Upper bound for a single remote subscription fetch; `0` disables the bound
    pub fetch_timeout_secs: u64,
    /// Width of generated short-link codes
    pub short_code_length: usize,
    /// Width of the random suffix of stored config ids
    pub config_id_length: usize,
    /// Maximum accepted request body for `POST /config`
    pub max_body_bytes: usize,
    /// Directory holding `favicon.png`
    pub static_dir: String,
    /// Attach permissive CORS headers to every response
    pub cors_enabled: bool,
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Create a new server configuration builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Fetch timeout as a `Duration`, `None` when fetches are unbounded.
    pub fn fetch_timeout(&self) -> Option<Duration> {
        (self.fetch_timeout_secs > 0).then(|| Duration::from_secs(self.fetch_timeout_secs))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            public_origin: None,
            default_language: "zh-CN".to_string(),
            default_user_agent: DEFAULT_USER_AGENT.to_string(),
            fetch_timeout_secs: 30,
            short_code_length: 6,
            config_id_length: 8,
            max_body_bytes: 1024 * 1024,
            static_dir: "./public".to_string(),
            cors_enabled: true,
            logging: LoggingConfig::default(),
        }
    }
}

/// Builder for ServerConfig, mostly used by tests and embedders
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Pin the origin used for generated links
    pub fn public_origin(mut self, origin: impl Into<String>) -> Self {
        self.config.public_origin = Some(origin.into());
        self
    }

    pub fn default_language(mut self, language: impl Into<String>) -> Self {
        self.config.default_language = language.into();
        self
    }

    pub fn default_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.default_user_agent = user_agent.into();
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn short_code_length(mut self, length: usize) -> Self {
        self.config.short_code_length = length;
        self
    }

    pub fn static_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.static_dir = dir.into();
        self
    }

    pub fn cors_enabled(mut self, enabled: bool) -> Self {
        self.config.cors_enabled = enabled;
        self
    }

    /// Build the final ServerConfig
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

/// Logging output configuration. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
