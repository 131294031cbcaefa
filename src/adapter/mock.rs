//! File-backed mock adapter
//!
//! Selected automatically when a scenario sets its target via
//! [`crate::Scenario::mock`]: the file's contents stand in for the response
//! body, with a content type guessed from the extension and a synthetic
//! 200 status. A missing file surfaces as a transport error, exercising the
//! same Aborted path a real network fault would.

use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;

use crate::common::{Error, Result};

use super::{FetchAdapter, FetchRequest, NormalizedResponse, Target};

/// Adapter serving scenario targets from the local filesystem
#[derive(Debug, Default)]
pub struct MockAdapter;

impl MockAdapter {
    pub fn new() -> Self {
        Self
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => "application/json",
        Some("html") | Some("htm") => "text/html",
        Some("xml") => "application/xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl FetchAdapter for MockAdapter {
    async fn fetch(&self, request: &FetchRequest) -> Result<NormalizedResponse> {
        let path = match &request.target {
            Target::MockFile(path) => path.clone(),
            Target::Url(url) => {
                return Err(Error::Transport(format!(
                    "mock adapter cannot fetch network URL '{}'",
                    url
                )))
            }
        };

        tracing::debug!(path = %path.display(), "Loading mock response");
        let started = Instant::now();
        let body = tokio::fs::read(&path).await.map_err(|e| {
            Error::Transport(format!("failed to read mock file '{}': {}", path.display(), e))
        })?;

        Ok(NormalizedResponse {
            status: 200,
            headers: vec![("content-type".to_string(), content_type_for(&path).to_string())],
            body,
            final_url: Some(format!("file://{}", path.display())),
            duration: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{RequestOptions, ResponseType};
    use std::io::Write;

    fn request_for(path: std::path::PathBuf) -> FetchRequest {
        FetchRequest {
            target: Target::MockFile(path),
            options: RequestOptions::default(),
            response_type: ResponseType::Json,
        }
    }

    #[test]
    fn content_type_guessing() {
        assert_eq!(content_type_for(Path::new("a.json")), "application/json");
        assert_eq!(content_type_for(Path::new("a.html")), "text/html");
        assert_eq!(content_type_for(Path::new("a.bin")), "application/octet-stream");
    }

    #[tokio::test]
    async fn serves_file_contents_with_synthetic_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"ok":true}}"#).unwrap();

        let response = MockAdapter::new().fetch(&request_for(path)).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.body_text(), r#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn missing_file_is_a_transport_error() {
        let err = MockAdapter::new()
            .fetch(&request_for("/nonexistent/fixture.json".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
