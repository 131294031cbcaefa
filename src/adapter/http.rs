//! Built-in HTTP adapter backed by reqwest

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::common::{Error, Result};

use super::{FetchAdapter, FetchRequest, NormalizedResponse, Target};

/// Network adapter used by the default registry for every response type
pub struct HttpAdapter {
    client: reqwest::Client,
}

impl HttpAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Wrap a preconfigured client (shared cookie store, proxies, ...).
    /// Session reuse across scenarios is the caller's choice, never implicit.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchAdapter for HttpAdapter {
    async fn fetch(&self, request: &FetchRequest) -> Result<NormalizedResponse> {
        let url = match &request.target {
            Target::Url(url) => url.clone(),
            Target::MockFile(path) => {
                return Err(Error::Transport(format!(
                    "HTTP adapter cannot fetch mock file '{}'",
                    path.display()
                )))
            }
        };

        let method = reqwest::Method::from_bytes(request.options.method.as_bytes())
            .map_err(|_| Error::Transport(format!("invalid method '{}'", request.options.method)))?;

        let mut builder = self.client.request(method, url.clone());
        for (name, value) in &request.options.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.options.body {
            builder = builder.body(body.clone());
        }
        if let Some(ms) = request.options.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }

        tracing::debug!(url = %url, method = %request.options.method, "Dispatching HTTP fetch");
        let started = Instant::now();
        let response = builder.send().await?;

        let status = response.status().as_u16();
        let final_url = Some(response.url().to_string());
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        tracing::debug!(status, bytes = body.len(), "HTTP fetch complete");
        Ok(NormalizedResponse {
            status,
            headers,
            body,
            final_url,
            duration: started.elapsed(),
        })
    }
}
