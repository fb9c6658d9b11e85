//! Core service orchestration.
//!
//! `SublinkService` ties the request pipeline together: rule resolution,
//! subscription expansion, stored base-config lookup and builder dispatch. It
//! knows nothing about HTTP; the handler maps its results to responses.
use std::sync::Arc;

use eyre::WrapErr;

use crate::{
    config::ServerConfig,
    core::{
        config_store::{ConfigBlobError, ConfigBlobService},
        i18n::Language,
        rules::RuleSetResolver,
        short_link::ShortLinkService,
        subscription::{SubscriptionError, SubscriptionResolver},
    },
    ports::{
        config_builder::{BuildRequest, BuiltConfig, ConfigBuilder, FormatOptions, TargetFormat},
        http_client::HttpClient,
        kv_store::KvStore,
    },
};

/// One builder per target format
#[derive(Clone)]
pub struct BuilderRegistry {
    singbox: Arc<dyn ConfigBuilder>,
    clash: Arc<dyn ConfigBuilder>,
    surge: Arc<dyn ConfigBuilder>,
}

impl BuilderRegistry {
    pub fn new(
        singbox: Arc<dyn ConfigBuilder>,
        clash: Arc<dyn ConfigBuilder>,
        surge: Arc<dyn ConfigBuilder>,
    ) -> Self {
        Self {
            singbox,
            clash,
            surge,
        }
    }

    pub fn get(&self, format: TargetFormat) -> &Arc<dyn ConfigBuilder> {
        match format {
            TargetFormat::Singbox => &self.singbox,
            TargetFormat::Clash => &self.clash,
            TargetFormat::Surge => &self.surge,
        }
    }
}

/// Query inputs of a conversion request
#[derive(Debug, Clone, Default)]
pub struct ConversionRequest {
    /// Raw subscription text, required
    pub config: String,
    pub selected_rules: Option<String>,
    pub custom_rules: Option<String>,
    /// Id of a stored base config
    pub config_id: Option<String>,
    pub user_agent: Option<String>,
    pub language: Language,
    /// Full URL of the incoming request
    pub request_url: String,
}

pub struct SublinkService {
    subscriptions: SubscriptionResolver,
    config_blobs: ConfigBlobService,
    short_links: ShortLinkService,
    builders: BuilderRegistry,
    default_user_agent: String,
}

impl SublinkService {
    /// Wire the service from configuration and its ports.
    ///
    /// Config blobs and short links share `store`.
    pub fn new(
        config: &ServerConfig,
        store: Arc<dyn KvStore>,
        http_client: Arc<dyn HttpClient>,
        builders: BuilderRegistry,
    ) -> Self {
        Self {
            subscriptions: SubscriptionResolver::new(http_client),
            config_blobs: ConfigBlobService::new(store.clone(), config.config_id_length),
            short_links: ShortLinkService::new(store, config.short_code_length),
            builders,
            default_user_agent: config.default_user_agent.clone(),
        }
    }

    pub fn config_blobs(&self) -> &ConfigBlobService {
        &self.config_blobs
    }

    pub fn short_links(&self) -> &ShortLinkService {
        &self.short_links
    }

    /// The caller supplied User-Agent, or the configured default
    pub fn user_agent<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .filter(|ua| !ua.is_empty())
            .unwrap_or(self.default_user_agent.as_str())
    }

    /// Produce the `format` document for `request`.
    pub async fn convert(
        &self,
        format: TargetFormat,
        request: ConversionRequest,
    ) -> eyre::Result<BuiltConfig> {
        let rules = RuleSetResolver::resolve(
            request.selected_rules.as_deref(),
            request.custom_rules.as_deref(),
        );

        let user_agent = self.user_agent(request.user_agent.as_deref()).to_string();
        let subscription = self
            .subscriptions
            .resolve(&request.config, &user_agent)
            .await;

        let base_config = match request.config_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => match self.config_blobs.lookup(id).await {
                Ok(Some(found)) => Some(found),
                Ok(None) => {
                    tracing::debug!("Base config {} not found, building without it", id);
                    None
                }
                Err(ConfigBlobError::InvalidContent(e)) => {
                    tracing::warn!("Base config {} is unreadable, building without it: {}", id, e);
                    None
                }
                Err(e) => {
                    return Err(e).wrap_err_with(|| format!("Failed to load base config {id}"));
                }
            },
            None => None,
        };

        let options = match format {
            TargetFormat::Singbox => FormatOptions::Singbox,
            TargetFormat::Clash => FormatOptions::Clash,
            TargetFormat::Surge => FormatOptions::Surge {
                subscription_url: request.request_url,
            },
        };

        tracing::debug!(
            "Building {} config from {} descriptors ({} rules, {} custom rules)",
            format,
            subscription.len(),
            rules.selected.len(),
            rules.custom.len()
        );

        let build_request = BuildRequest {
            subscription,
            rules: rules.selected,
            custom_rules: rules.custom,
            base_config,
            language: request.language,
            user_agent,
            options,
        };

        self.builders
            .get(format)
            .build(build_request)
            .await
            .wrap_err_with(|| format!("Failed to build {format} config"))
    }

    /// Expand `raw` and return the result base64 encoded.
    pub async fn aggregate(
        &self,
        raw: &str,
        user_agent: Option<&str>,
    ) -> Result<String, SubscriptionError> {
        let user_agent = self.user_agent(user_agent);
        self.subscriptions.aggregate_base64(raw, user_agent).await
    }
}
