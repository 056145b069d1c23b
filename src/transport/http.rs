//! HTTP transport implementation.
//!
//! POSTs each frame to the BOSH endpoint with `reqwest`.

use reqwest::header::CONTENT_TYPE as CONTENT_TYPE_HEADER;
use reqwest::Client;

use super::{SendFuture, Transport};
use crate::config::BoshConfig;
use crate::error::{BoshError, Result};
use crate::protocol::CONTENT_TYPE;

/// BOSH over HTTP(S) using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Endpoint URL
    url: String,
    /// Shared connection pool
    client: Client,
}

impl HttpTransport {
    /// Create a transport for the configured endpoint.
    pub fn new(config: &BoshConfig) -> Result<Self> {
        Self::for_url(&config.url, config)
    }

    /// Create a transport for an explicit endpoint (attach path), taking
    /// TLS and timeout settings from `config`.
    pub fn for_url(url: &str, config: &BoshConfig) -> Result<Self> {
        if !config.verify_tls {
            tracing::warn!("TLS certificate verification disabled for {} - NOT FOR PRODUCTION", url);
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| BoshError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for HttpTransport {
    fn send(&self, body: String) -> SendFuture<'_> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .header(CONTENT_TYPE_HEADER, CONTENT_TYPE)
                .body(body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(BoshError::Transport(format!(
                    "{} returned HTTP {}",
                    self.url,
                    status.as_u16()
                )));
            }

            Ok(response.text().await?)
        })
    }

    fn name(&self) -> &'static str {
        "HTTP"
    }
}
