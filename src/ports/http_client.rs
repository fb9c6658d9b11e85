use async_trait::async_trait;
use thiserror::Error;

/// Custom error type for outbound HTTP fetches
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Error when connection to the remote host fails
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when request times out
    #[error("Timeout error after {0} seconds")]
    Timeout(u64),

    /// Error when request is invalid
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Error when the remote host returns an error status code
    #[error("Upstream returned error status: {status}, url: {url}")]
    UpstreamStatus {
        /// The URL that was requested
        url: String,
        /// The status code returned by the remote host
        status: u16,
    },
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for fetching remote subscription
/// payloads
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// GET `url` with the given `User-Agent` and return the body as text
    ///
    /// # Arguments
    /// * `url` - Absolute http/https URL
    /// * `user_agent` - Value of the `User-Agent` header
    ///
    /// # Returns
    /// A future that resolves to the response body or an error
    async fn get_text(&self, url: &str, user_agent: &str) -> HttpClientResult<String>;
}
