//! Builder dispatch contract.
//!
//! Every output format implements [`ConfigBuilder`]: one fallible async build
//! over a [`BuildRequest`]. Format specific inputs travel inside
//! [`FormatOptions`] so the shared fields stay identical for all builders.
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::core::{i18n::Language, rules::RuleList};

/// Target document formats produced through the builder contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    Singbox,
    Clash,
    Surge,
}

impl TargetFormat {
    pub const ALL: [TargetFormat; 3] = [TargetFormat::Singbox, TargetFormat::Clash, TargetFormat::Surge];

    /// Route prefix serving this format
    pub fn route_prefix(&self) -> &'static str {
        match self {
            TargetFormat::Singbox => "/singbox",
            TargetFormat::Clash => "/clash",
            TargetFormat::Surge => "/surge",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            TargetFormat::Singbox => "application/json; charset=utf-8",
            TargetFormat::Clash => "text/yaml; charset=utf-8",
            TargetFormat::Surge => "text/plain; charset=utf-8",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.route_prefix()[1..])
    }
}

/// Per-format extras, tagged by format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatOptions {
    Singbox,
    Clash,
    Surge {
        /// Full URL of the originating request, embedded as the managed-config URL
        subscription_url: String,
    },
}

impl FormatOptions {
    pub fn format(&self) -> TargetFormat {
        match self {
            FormatOptions::Singbox => TargetFormat::Singbox,
            FormatOptions::Clash => TargetFormat::Clash,
            FormatOptions::Surge { .. } => TargetFormat::Surge,
        }
    }
}

/// Everything a builder receives
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Resolved descriptors, in subscription order
    pub subscription: Vec<String>,
    /// Selected (predefined or literal) rules
    pub rules: RuleList,
    pub custom_rules: RuleList,
    /// Stored base config, when a `configId` resolved
    pub base_config: Option<Value>,
    pub language: Language,
    pub user_agent: String,
    pub options: FormatOptions,
}

/// Builder output
#[derive(Debug, Clone, PartialEq)]
pub enum BuiltConfig {
    Json(Value),
    Yaml(String),
    Text(String),
}

impl BuiltConfig {
    /// Serialize to the response body. JSON is pretty printed with 2-space indent.
    pub fn into_body(self) -> Result<String, BuildError> {
        match self {
            BuiltConfig::Json(value) => serde_json::to_string_pretty(&value)
                .map_err(|e| BuildError::Serialization(e.to_string())),
            BuiltConfig::Yaml(text) | BuiltConfig::Text(text) => Ok(text),
        }
    }
}

/// Error type for builder operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BuildError {
    /// The builder was handed options for another format
    #[error("Builder for {expected} received options for {actual}")]
    FormatMismatch {
        expected: TargetFormat,
        actual: TargetFormat,
    },

    /// Stored base config has an unusable shape
    #[error("Invalid base config: {0}")]
    InvalidBaseConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// ConfigBuilder defines the port (interface) implemented by each format builder
#[async_trait]
pub trait ConfigBuilder: Send + Sync + 'static {
    /// Produce the client document for `request`
    async fn build(&self, request: BuildRequest) -> Result<BuiltConfig, BuildError>;
}
