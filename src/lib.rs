//! Sublink - proxy subscription aggregator and client configuration generator.
//!
//! Sublink accepts share links (`ss://`, `vmess://`, `vless://`, `trojan://`,
//! `hysteria2://`, `tuic://`), base64 subscription blobs and remote subscription
//! URLs, and turns them into ready-to-use client documents:
//!
//! - sing-box JSON (`/singbox`)
//! - Clash YAML (`/clash`)
//! - Surge managed profiles (`/surge`)
//! - a re-encoded base64 node list for Xray-style clients (`/xray`)
//!
//! It also stores user supplied base configs (`POST /config`) and hands out short
//! links (`/shorten`, `/shorten-v2`, `/resolve`) that redirect back to the
//! conversion endpoints.
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use sublink::{
//!     adapters::{FileSystemAdapter, HttpClientAdapter, HttpHandler, MemoryStore, builders, router},
//!     config::ServerConfig,
//!     core::SublinkService,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = Arc::new(ServerConfig::default());
//! let service = Arc::new(SublinkService::new(
//!     &config,
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(HttpClientAdapter::new(config.fetch_timeout())?),
//!     builders::reference_registry(),
//! ));
//! let handler = HttpHandler::new(service, Arc::new(FileSystemAdapter::new()), config.clone());
//! let app = router(Arc::new(handler));
//! let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
//! axum::serve(listener, app).await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! **Ports** (traits in [`ports`]) describe the storage, outbound HTTP, config
//! builder and static file seams. **Adapters** implement them, and `core` holds
//! the request-independent logic: subscription expansion, rule resolution,
//! short links, stored configs and language negotiation.
//!
//! # Error Handling
//! Domain operations return their own `thiserror` enums. Request handling wraps
//! unexpected failures in `eyre::Report` with context attached via `WrapErr`, and
//! the HTTP layer turns every failure into one localized plain-text response.
//!
//! # Concurrency & Data Structures
//! The in-memory key-value store uses `scc::HashMap`, so inserts that must not
//! overwrite (generated codes and ids) are atomic without a global lock.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{FileSystemAdapter, HttpClientAdapter, HttpHandler, MemoryStore},
    core::SublinkService,
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
