//! Stored base configs.
//!
//! A base config is a user supplied document that builders merge generated
//! sections into. It is canonicalized to a JSON string before storage and is
//! immutable once stored.
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::{
    core::codec::random_code,
    ports::kv_store::{KvStore, StoreError},
};

/// Config type whose string content may be YAML
pub const CLASH_TYPE: &str = "clash";

/// Attempts at minting an unused id before giving up
const MAX_ID_ATTEMPTS: usize = 8;

/// Store key prefix; keeps configs apart from other users of the same store
const KEY_PREFIX: &str = "config:";

fn store_key(id: &str) -> String {
    format!("{KEY_PREFIX}{id}")
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigBlobError {
    /// Content is not a usable document; carries the parser message
    #[error("{0}")]
    InvalidContent(String),

    #[error("Config type is required")]
    MissingType,

    #[error("Could not mint an unused config id after {0} attempts")]
    IdExhausted(usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ConfigBlobService {
    store: Arc<dyn KvStore>,
    id_length: usize,
}

impl ConfigBlobService {
    pub fn new(store: Arc<dyn KvStore>, id_length: usize) -> Self {
        Self { store, id_length }
    }

    /// Canonical JSON text for `content`.
    ///
    /// Clash string content that looks like YAML (starts with a list marker or
    /// contains a colon) is parsed as YAML first. Other strings pass through and
    /// structured values are serialized. The result must parse as JSON.
    pub fn canonicalize(kind: &str, content: &Value) -> Result<String, ConfigBlobError> {
        let canonical = match content {
            Value::String(text) if kind == CLASH_TYPE && looks_like_yaml(text) => {
                let document: Value = serde_yaml::from_str(text)
                    .map_err(|e| ConfigBlobError::InvalidContent(e.to_string()))?;
                serde_json::to_string(&document)
                    .map_err(|e| ConfigBlobError::InvalidContent(e.to_string()))?
            }
            Value::String(text) => text.clone(),
            other => serde_json::to_string(other)
                .map_err(|e| ConfigBlobError::InvalidContent(e.to_string()))?,
        };

        serde_json::from_str::<Value>(&canonical)
            .map_err(|e| ConfigBlobError::InvalidContent(e.to_string()))?;

        Ok(canonical)
    }

    /// Store `content` and return its new id, `{kind}_{random}`.
    pub async fn create(&self, kind: &str, content: &Value) -> Result<String, ConfigBlobError> {
        let kind = kind.trim();
        if kind.is_empty() {
            return Err(ConfigBlobError::MissingType);
        }

        let canonical = Self::canonicalize(kind, content)?;

        for _ in 0..MAX_ID_ATTEMPTS {
            let id = format!("{kind}_{}", random_code(self.id_length));
            if self.store.put_if_absent(&store_key(&id), canonical.clone()).await? {
                tracing::info!("Stored base config {} ({} bytes)", id, canonical.len());
                return Ok(id);
            }
            tracing::debug!("Config id {} already taken, retrying", id);
        }

        Err(ConfigBlobError::IdExhausted(MAX_ID_ATTEMPTS))
    }

    /// The stored document for `id`; `None` means no base config.
    pub async fn lookup(&self, id: &str) -> Result<Option<Value>, ConfigBlobError> {
        let Some(raw) = self.store.get(&store_key(id)).await? else {
            return Ok(None);
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| ConfigBlobError::InvalidContent(e.to_string()))
    }
}

fn looks_like_yaml(text: &str) -> bool {
    text.trim().starts_with('-') || text.contains(':')
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::adapters::MemoryStore;

    fn service() -> ConfigBlobService {
        ConfigBlobService::new(Arc::new(MemoryStore::new()), 8)
    }

    #[tokio::test]
    async fn test_object_content_round_trips() {
        let service = service();
        let content = json!({"log": {"level": "warn"}, "dns": {"servers": []}});

        let id = service.create("singbox", &content).await.unwrap();
        assert!(id.starts_with("singbox_"));
        assert_eq!(id.len(), "singbox_".len() + 8);

        assert_eq!(service.lookup(&id).await.unwrap(), Some(content));
    }

    #[tokio::test]
    async fn test_clash_yaml_is_converted() {
        let service = service();
        let yaml = "port: 7890\nmode: rule\ndns:\n  enable: true\n";

        let id = service.create("clash", &json!(yaml)).await.unwrap();
        assert_eq!(
            service.lookup(&id).await.unwrap(),
            Some(json!({"port": 7890, "mode": "rule", "dns": {"enable": true}}))
        );
    }

    #[tokio::test]
    async fn test_clash_yaml_list() {
        let canonical = ConfigBlobService::canonicalize("clash", &json!("- a\n- b\n")).unwrap();
        assert_eq!(canonical, r#"["a","b"]"#);
    }

    #[tokio::test]
    async fn test_json_string_passes_through() {
        let service = service();
        let id = service
            .create("singbox", &json!(r#"{"route":{"final":"DIRECT"}}"#))
            .await
            .unwrap();
        assert_eq!(
            service.lookup(&id).await.unwrap(),
            Some(json!({"route": {"final": "DIRECT"}}))
        );
    }

    #[test]
    fn test_invalid_content_carries_parser_message() {
        let err = ConfigBlobService::canonicalize("singbox", &json!("port: 7890")).unwrap_err();
        match err {
            ConfigBlobError::InvalidContent(message) => assert!(!message.is_empty()),
            other => panic!("unexpected error: {other:?}"),
        }

        // YAML syntax errors surface the same way
        assert!(ConfigBlobService::canonicalize("clash", &json!("a: [unclosed")).is_err());
    }

    #[tokio::test]
    async fn test_missing_type_is_rejected() {
        let err = service().create("  ", &json!({})).await.unwrap_err();
        assert!(matches!(err, ConfigBlobError::MissingType));
    }

    #[tokio::test]
    async fn test_ids_are_independent() {
        let service = service();
        let first = service.create("clash", &json!({"a": 1})).await.unwrap();
        let second = service.create("clash", &json!({"a": 1})).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_short_link_with_same_name_does_not_touch_config() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let configs = ConfigBlobService::new(store.clone(), 8);
        let links = crate::core::short_link::ShortLinkService::new(store, 6);
        let content = json!({"log": {"level": "warn"}});

        let id = configs.create("singbox", &content).await.unwrap();
        links
            .shorten_query("https://h/singbox?config=x", Some(&id))
            .await
            .unwrap();

        assert_eq!(configs.lookup(&id).await.unwrap(), Some(content));
        assert_eq!(
            links.lookup(&id).await.unwrap().as_deref(),
            Some("?config=x")
        );
    }

    #[tokio::test]
    async fn test_unknown_id_is_none() {
        assert_eq!(service().lookup("clash_missing0").await.unwrap(), None);
    }
}
