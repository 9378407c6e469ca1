use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::types::EnvelopeId;

use super::{DispatchError, Remote, RemoteRequest};

/// Connection settings for [`HttpRemote`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// API root, e.g. `https://club.example/api`.
    pub base_url: String,
    /// Per-request timeout. Zero leaves the client default.
    pub timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            timeout_ms: 15_000,
        }
    }
}

/// JSON-over-HTTP [`Remote`].
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpRemote {
    pub fn new(config: HttpConfig) -> Result<Self, DispatchError> {
        let mut builder = reqwest::Client::builder();
        if config.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(config.timeout_ms));
        }
        let client = builder
            .build()
            .map_err(|e| DispatchError::Network(format!("client build failed: {e}")))?;
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| DispatchError::Malformed(format!("invalid base url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(DispatchError::Malformed(format!(
                "base url {} cannot carry a path",
                config.base_url
            )));
        }
        Ok(Self { client, base_url })
    }

    /// Full URL for `request`; each endpoint segment is percent-encoded.
    pub fn url_for(&self, request: &RemoteRequest) -> Result<Url, DispatchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| DispatchError::Malformed("base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(request.endpoint.segments());
        Ok(url)
    }
}

impl Remote for HttpRemote {
    async fn submit(
        &self,
        request: RemoteRequest,
        idempotency_key: Option<EnvelopeId>,
    ) -> Result<(), DispatchError> {
        let url = self.url_for(&request)?;
        let mut req = self.client.post(url.clone()).json(&request.body);
        if let Some(key) = idempotency_key {
            req = req.header("Idempotency-Key", key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| DispatchError::Network(e.to_string()))?;
        let status = resp.status().as_u16();
        debug!(%url, status, "remote responded");
        DispatchError::from_status(status)
    }
}
