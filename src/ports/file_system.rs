use axum::body::Body as AxumBody;
use axum::http::{Request, Response};
use thiserror::Error;

/// Error type for static asset operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FileSystemError {
    /// Error when encountering an IO issue
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error when the asset name is not a plain file name
    #[error("Invalid asset name: {0}")]
    InvalidPath(String),
}

/// Result type for static asset operations
pub type FileSystemResult<T> = Result<T, FileSystemError>;

/// FileSystem defines the port (interface) for serving the few static assets
/// the service exposes (favicon).
pub trait FileSystem: Send + Sync + 'static {
    /// Serve `file_name` from `root`
    ///
    /// # Arguments
    /// * `root` - Directory holding the assets
    /// * `file_name` - Plain file name inside `root`
    /// * `req` - The original HTTP request (conditional headers are honored)
    ///
    /// # Returns
    /// A future that resolves to the file response (404 when absent) or an error
    fn serve_asset(
        &self,
        root: &str,
        file_name: &str,
        req: Request<AxumBody>,
    ) -> impl std::future::Future<Output = FileSystemResult<Response<AxumBody>>> + Send;
}
