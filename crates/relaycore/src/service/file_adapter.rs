//! Local File URL Adapter (spec.md §4.10): serves `file://` track URLs
//! (materialized manifests, cached segments) back over HTTP so a client
//! downloader never needs filesystem access to the engine's host.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;

/// Resolves a `file://` URL to a filesystem path, rejecting anything that
/// isn't the `file` scheme.
pub fn path_from_file_url(url: &str) -> Option<std::path::PathBuf> {
    let stripped = url.strip_prefix("file://")?;
    Some(std::path::PathBuf::from(stripped))
}

pub struct LocalFileAdapter;

impl LocalFileAdapter {
    /// Streams the file at `path` as a 200 with `Content-Length`, or a 404
    /// with a short error body when it's missing or unreadable.
    pub async fn serve(path: &std::path::Path) -> Response {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) if m.is_file() => m,
            _ => {
                return (StatusCode::NOT_FOUND, format!("file not found: {}", path.display())).into_response();
            }
        };

        let file = match tokio::fs::File::open(path).await {
            Ok(f) => f,
            Err(err) => {
                return (StatusCode::NOT_FOUND, format!("cannot open file: {err}")).into_response();
            }
        };

        let stream = ReaderStream::new(file);
        let body = Body::from_stream(stream);

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, metadata.len())
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_scheme_only() {
        assert_eq!(path_from_file_url("file:///tmp/x.mp4"), Some(std::path::PathBuf::from("/tmp/x.mp4")));
        assert_eq!(path_from_file_url("https://example.com/x.mp4"), None);
    }

    #[tokio::test]
    async fn serve_missing_file_returns_404() {
        let response = LocalFileAdapter::serve(std::path::Path::new("/nonexistent/path/x.bin")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serve_existing_file_returns_200_with_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.bin");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let response = LocalFileAdapter::serve(&path).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CONTENT_LENGTH).unwrap(), "5");
    }
}
