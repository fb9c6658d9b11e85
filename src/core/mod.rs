pub mod codec;
pub mod config_store;
pub mod i18n;
pub mod routing;
pub mod rules;
pub mod service;
pub mod short_link;
pub mod subscription;

pub use service::{BuilderRegistry, ConversionRequest, SublinkService};
