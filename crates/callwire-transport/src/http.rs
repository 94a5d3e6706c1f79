//! HTTP transport against a replica's v2 API.
//!
//! Envelopes are POSTed as `application/cbor` to
//! `{base}/api/v2/canister/{canister}/{query|call|read_state}`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use callwire_core::{Principal, RequestId};
use reqwest::header::CONTENT_TYPE;

use crate::error::{Result, TransportError};
use crate::transport::Transport;

const CBOR_CONTENT_TYPE: &str = "application/cbor";

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Per-request timeout enforced by the HTTP client.
    pub request_timeout: Duration,
    /// Connection establishment timeout.
    pub connect_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Transport that talks to a replica over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_config(base_url, HttpConfig::default())
    }

    pub fn with_config(base_url: impl Into<String>, config: HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self::with_client(base_url, client))
    }

    /// Use a preconfigured client.
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The endpoint URL for a canister and request kind.
    pub fn endpoint(&self, canister: &Principal, kind: &str) -> String {
        format!(
            "{}/api/v2/canister/{}/{}",
            self.base_url,
            canister.to_text(),
            kind
        )
    }

    async fn post(&self, url: String, envelope: Bytes) -> Result<Bytes> {
        let resp = self
            .client
            .post(url)
            .header(CONTENT_TYPE, CBOR_CONTENT_TYPE)
            .body(envelope)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                body,
            });
        }

        resp.bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn query(&self, canister: &Principal, envelope: Bytes) -> Result<Bytes> {
        self.post(self.endpoint(canister, "query"), envelope).await
    }

    async fn call(
        &self,
        canister: &Principal,
        request_id: &RequestId,
        envelope: Bytes,
    ) -> Result<()> {
        tracing::debug!(canister = %canister, request_id = %request_id, "submitting call");
        self.post(self.endpoint(canister, "call"), envelope).await?;
        Ok(())
    }

    async fn read_state(&self, canister: &Principal, envelope: Bytes) -> Result<Bytes> {
        self.post(self.endpoint(canister, "read_state"), envelope)
            .await
    }
}
