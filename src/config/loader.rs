use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::ServerConfig;

/// Prefix for environment overrides, e.g. `SUBLINK__FETCH_TIMEOUT_SECS=10`
pub const ENV_PREFIX: &str = "SUBLINK";

/// Load configuration from a file using the config crate
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_config(config_path: &str) -> Result<ServerConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously.
///
/// The file is optional: a missing file yields the built-in defaults, still
/// layered with `SUBLINK__*` variables and the conventional `PORT` variable.
pub fn load_config_sync(config_path: &str) -> Result<ServerConfig> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Yaml, // Default to YAML
    };

    let settings = Config::builder()
        .add_source(
            File::new(
                config_path
                    .to_str()
                    .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
                format,
            )
            .required(false),
        )
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let mut server_config: ServerConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    if let Ok(port) = std::env::var("PORT") {
        apply_port_override(&mut server_config, &port)?;
    }

    Ok(server_config)
}

/// Replace the port of `listen_addr`, keeping the configured host.
fn apply_port_override(config: &mut ServerConfig, port: &str) -> Result<()> {
    let port: u16 = port
        .trim()
        .parse()
        .with_context(|| format!("Invalid PORT value: {port}"))?;
    let host = config
        .listen_addr
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or("0.0.0.0");
    config.listen_addr = format!("{host}:{port}");
    Ok(())
}
