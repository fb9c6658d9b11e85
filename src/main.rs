use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use sublink::{
    adapters::{FileSystemAdapter, HttpClientAdapter, HttpHandler, MemoryStore, builders, router},
    config::{ServerConfig, ServerConfigValidator, load_config},
    core::SublinkService,
    tracing_setup,
    utils::GracefulShutdown,
};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },
    /// Write a configuration file with the defaults
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },
    /// Start the HTTP server (default)
    Serve {
        /// Configuration file to use; a missing file means defaults
        #[clap(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    let config = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    ServerConfigValidator::validate(&config)
        .map_err(|e| eyre!("Invalid configuration in {config_path}: {e}"))?;

    tracing_setup::init_tracing(&config.logging).context("Failed to initialize tracing")?;
    tracing::info!("Loaded configuration from {config_path}");

    let config = Arc::new(config);
    let http_client = HttpClientAdapter::new(config.fetch_timeout())
        .context("Failed to create HTTP client adapter")?;
    let service = Arc::new(SublinkService::new(
        &config,
        Arc::new(MemoryStore::new()),
        Arc::new(http_client),
        builders::reference_registry(),
    ));
    let handler = Arc::new(HttpHandler::new(
        service,
        Arc::new(FileSystemAdapter::new()),
        config.clone(),
    ));
    let app = router(handler);

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("Failed to parse listen address {}", config.listen_addr))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    tracing::info!(
        "Sublink listening on {} (origin: {}, default language: {}, fetch timeout: {:?})",
        addr,
        config.public_origin.as_deref().unwrap_or("per request"),
        config.default_language,
        config.fetch_timeout()
    );

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {:?}", e);
        }
    });

    let drain_shutdown = graceful_shutdown.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let reason = drain_shutdown.wait_for_shutdown_signal().await;
        tracing::info!("Draining in-flight requests ({:?})", reason);
    });

    // The drain window only starts once shutdown has been requested
    let mut server = std::pin::pin!(server.into_future());
    tokio::select! {
        result = &mut server => {
            result.context("Server error")?;
        }
        _ = graceful_shutdown.wait_for_shutdown_signal() => {
            match tokio::time::timeout(graceful_shutdown.drain_timeout(), &mut server).await {
                Ok(result) => result.context("Server error")?,
                Err(_) => tracing::warn!(
                    "Requests still running after {:?}, exiting anyway",
                    graceful_shutdown.drain_timeout()
                ),
            }
        }
    }

    tracing::info!("Sublink server stopped");
    Ok(())
}

/// Parse and validate a configuration file, then print a summary
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!(
                "   • Public Origin: {}",
                config.public_origin.as_deref().unwrap_or("(derived per request)")
            );
            println!("   • Default Language: {}", config.default_language);
            println!("   • Fetch Timeout: {}s", config.fetch_timeout_secs);
            println!("   • Short Code Length: {}", config.short_code_length);
            println!("   • CORS Enabled: {}", config.cors_enabled);
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Verify listen address format (e.g., '0.0.0.0:3000')");
            println!("   • public_origin must look like 'https://sub.example.com'");
            println!("   • default_language must be one of zh-CN, en-US, fa, ru");
            std::process::exit(1);
        }
    }
}

/// Write the default configuration as YAML, refusing to overwrite
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let yaml = serde_yaml::to_string(&ServerConfig::default())
        .context("Failed to serialize default config")?;
    let contents = format!("# Sublink configuration\n# Any key can be overridden with SUBLINK__<KEY>, e.g. SUBLINK__FETCH_TIMEOUT_SECS=10\n{yaml}");

    tokio::fs::write(path, contents)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'sublink serve --config {config_path}' to start the server");
    Ok(())
}
