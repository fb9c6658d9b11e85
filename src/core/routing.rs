//! Request classification.
//!
//! Paths are matched in a fixed order and the first match wins. Conversion
//! routes match by prefix, so `/singbox/anything` is still a sing-box request.
use axum::http::Method;

use crate::{core::short_link::ShortLinkPrefix, ports::config_builder::TargetFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Home,
    Convert(TargetFormat),
    Shorten,
    ShortenV2,
    Redirect(ShortLinkPrefix),
    Xray,
    Favicon,
    StoreConfig,
    Resolve,
}

impl Endpoint {
    /// Classify a request, `None` when nothing matches.
    pub fn classify(method: &Method, path: &str) -> Option<Endpoint> {
        if path == "/" && method == Method::GET {
            return Some(Endpoint::Home);
        }

        if let Some(format) = TargetFormat::ALL
            .into_iter()
            .find(|format| path.starts_with(format.route_prefix()))
        {
            return Some(Endpoint::Convert(format));
        }

        match path {
            "/shorten" => return Some(Endpoint::Shorten),
            "/shorten-v2" => return Some(Endpoint::ShortenV2),
            _ => {}
        }

        if let Some(prefix) = ShortLinkPrefix::ALL
            .into_iter()
            .find(|prefix| redirect_code(path, *prefix).is_some())
        {
            return Some(Endpoint::Redirect(prefix));
        }

        if path.starts_with("/xray") {
            return Some(Endpoint::Xray);
        }

        match path {
            "/favicon.ico" | "/favicon.png" => Some(Endpoint::Favicon),
            "/config" if method == Method::POST => Some(Endpoint::StoreConfig),
            "/resolve" => Some(Endpoint::Resolve),
            _ => None,
        }
    }
}

/// The code segment of a `/{letter}/{code}` path, which may be empty
pub fn redirect_code(path: &str, prefix: ShortLinkPrefix) -> Option<&str> {
    let rest = path.strip_prefix('/')?.strip_prefix(prefix.letter())?;
    let rest = rest.strip_prefix('/')?;
    Some(rest.split('/').next().unwrap_or_default())
}
