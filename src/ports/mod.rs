pub mod config_builder;
pub mod file_system;
pub mod http_client;
pub mod http_server;
pub mod kv_store;
