//! Fetch adapters and the adapter registry
//!
//! A [`FetchAdapter`] retrieves one target and normalizes the result; the
//! engine only ever talks to the trait. Adapters are resolved from an
//! enum-keyed [`AdapterRegistry`] at scenario construction time, so there is
//! no runtime string dispatch on the hot path.

mod http;
mod mock;

pub use http::HttpAdapter;
pub use mock::MockAdapter;

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::common::{Error, Result};

/// Which response wrapper (and default adapter) a scenario uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Raw resource; body kept as bytes
    Resource,
    /// HTML document; body decoded as text
    Html,
    /// JSON document; body parsed into a `serde_json::Value`
    Json,
    /// XML document; body decoded as text
    Xml,
    /// Image; only metadata assertions apply
    Image,
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource => write!(f, "resource"),
            Self::Html => write!(f, "html"),
            Self::Json => write!(f, "json"),
            Self::Xml => write!(f, "xml"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// Request configuration owned by the adapter
///
/// The engine treats this as an opaque blob: it stores it on the scenario
/// and hands it to the adapter untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestOptions {
    /// HTTP method (ignored by non-HTTP adapters)
    #[serde(default = "default_method")]
    pub method: String,
    /// Header name/value pairs, sent in order
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Optional request body
    #[serde(default)]
    pub body: Option<String>,
    /// Per-request transport timeout
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: default_method(),
            headers: Vec::new(),
            body: None,
            timeout_ms: None,
        }
    }
}

fn default_method() -> String {
    "GET".to_string()
}

/// A scenario's resolved target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Network URL, already joined against the suite base URL
    Url(Url),
    /// Local file standing in for the real resource
    MockFile(PathBuf),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{}", url),
            Self::MockFile(path) => write!(f, "mock:{}", path.display()),
        }
    }
}

/// Everything an adapter needs to perform one fetch
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub target: Target,
    pub options: RequestOptions,
    pub response_type: ResponseType,
}

/// Adapter-agnostic fetch result
#[derive(Debug, Clone)]
pub struct NormalizedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// URL after redirects, when the adapter knows it
    pub final_url: Option<String>,
    /// Wall time the fetch took
    pub duration: Duration,
}

impl NormalizedResponse {
    /// First header value matching `name` (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body decoded as UTF-8, lossily
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// External collaborator that retrieves a resource for one scenario
///
/// Cancellation is drop-based: when a watchdog fires, the engine drops the
/// in-flight `fetch` future at its next await point. Adapters holding
/// external resources must tolerate being dropped mid-fetch; the engine
/// never blocks waiting for an adapter to acknowledge cancellation.
#[async_trait]
pub trait FetchAdapter: Send + Sync {
    /// Retrieve the target and normalize the result
    async fn fetch(&self, request: &FetchRequest) -> Result<NormalizedResponse>;
}

/// Enum-keyed registry of adapters, resolved at scenario construction
pub struct AdapterRegistry {
    adapters: HashMap<ResponseType, Arc<dyn FetchAdapter>>,
}

impl AdapterRegistry {
    /// Registry with no adapters; callers register their own
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Registry with the built-in HTTP adapter backing every response type
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        let http: Arc<dyn FetchAdapter> = Arc::new(HttpAdapter::new());
        for response_type in [
            ResponseType::Resource,
            ResponseType::Html,
            ResponseType::Json,
            ResponseType::Xml,
            ResponseType::Image,
        ] {
            registry.register(response_type, http.clone());
        }
        registry
    }

    /// Register (or replace) the adapter for one response type
    pub fn register(&mut self, response_type: ResponseType, adapter: Arc<dyn FetchAdapter>) {
        self.adapters.insert(response_type, adapter);
    }

    /// Resolve the adapter for a response type
    pub fn resolve(&self, response_type: ResponseType) -> Result<Arc<dyn FetchAdapter>> {
        self.adapters
            .get(&response_type)
            .cloned()
            .ok_or_else(|| Error::AdapterNotRegistered {
                response_type: response_type.to_string(),
            })
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("response_types", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_covers_every_response_type() {
        let registry = AdapterRegistry::default();
        for rt in [
            ResponseType::Resource,
            ResponseType::Html,
            ResponseType::Json,
            ResponseType::Xml,
            ResponseType::Image,
        ] {
            assert!(registry.resolve(rt).is_ok(), "missing adapter for {}", rt);
        }
    }

    #[test]
    fn empty_registry_reports_missing_adapter() {
        let registry = AdapterRegistry::empty();
        let err = registry.resolve(ResponseType::Json).err().unwrap();
        assert!(err.to_string().contains("json"));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let response = NormalizedResponse {
            status: 200,
            headers: vec![("Content-Type".into(), "text/html".into())],
            body: Vec::new(),
            final_url: None,
            duration: Duration::from_millis(1),
        };
        assert_eq!(response.header("content-type"), Some("text/html"));
        assert_eq!(response.header("x-missing"), None);
    }
}
