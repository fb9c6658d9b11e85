use axum::{
    body::Body as AxumBody,
    http::{Request, Response, Uri},
};
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::ports::file_system::{FileSystem, FileSystemError};

/// File system adapter using tower-http `ServeDir` for the static assets
#[derive(Debug, Default, Clone)]
pub struct FileSystemAdapter;

impl FileSystemAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for FileSystemAdapter {
    async fn serve_asset(
        &self,
        root: &str,
        file_name: &str,
        req: Request<AxumBody>,
    ) -> Result<Response<AxumBody>, FileSystemError> {
        if file_name.is_empty()
            || file_name.contains(['/', '\\'])
            || file_name.starts_with('.')
        {
            return Err(FileSystemError::InvalidPath(file_name.to_string()));
        }

        let uri: Uri = format!("/{file_name}")
            .parse()
            .map_err(|_| FileSystemError::InvalidPath(file_name.to_string()))?;

        let (mut parts, body) = req.into_parts();
        parts.uri = uri;
        let asset_req = Request::from_parts(parts, body);

        let response = ServeDir::new(root)
            .oneshot(asset_req)
            .await
            .map_err(|e| FileSystemError::IoError(std::io::Error::other(e.to_string())))?;

        tracing::debug!("Served asset {} from {}: {}", file_name, root, response.status());
        Ok(response.map(AxumBody::new))
    }
}
