pub mod builders;
pub mod file_system;
pub mod home_page;
pub mod http_client;
pub mod http_handler;
pub mod memory_store;
pub mod middleware;

/// Re-export commonly used types from adapters
pub use file_system::FileSystemAdapter;
pub use http_client::HttpClientAdapter;
pub use http_handler::{HttpHandler, router};
pub use memory_store::MemoryStore;
pub use middleware::*;
