//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - Builder methods (for embedding and CLI arguments)
//!
//! Credentials are deliberately not part of [`BoshConfig`]; they are passed
//! to [`BoshClient::connect`](crate::BoshClient::connect) directly.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BoshError, Result};

/// Default BOSH `wait` (seconds the connection manager may hold a request)
pub const DEFAULT_WAIT: u32 = 60;

/// Default BOSH `hold` (requests the connection manager may keep waiting)
pub const DEFAULT_HOLD: u32 = 1;

/// Slack added on top of `wait` for the HTTP timeout
const TIMEOUT_MARGIN_SECS: u64 = 15;

/// BOSH connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoshConfig {
    /// BOSH endpoint (e.g., https://example.com/http-bind/)
    pub url: String,

    /// XMPP domain, sent as the `to` attribute
    pub domain: String,

    /// Desired resource; empty or absent lets the server assign one
    #[serde(default)]
    pub resource: Option<String>,

    /// Long-poll wait in seconds
    #[serde(default = "default_wait")]
    pub wait: u32,

    /// Number of requests the server may hold
    #[serde(default = "default_hold")]
    pub hold: u32,

    /// `xml:lang` attribute of every frame
    #[serde(default = "default_lang")]
    pub lang: String,

    /// Verify the server's TLS certificate
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,

    /// Per-request HTTP timeout (defaults to `wait` plus a margin)
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_wait() -> u32 {
    DEFAULT_WAIT
}

fn default_hold() -> u32 {
    DEFAULT_HOLD
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_verify_tls() -> bool {
    true
}

impl BoshConfig {
    /// Create a configuration for the given endpoint and domain
    pub fn new(url: &str, domain: &str) -> Self {
        Self {
            url: url.to_string(),
            domain: domain.to_string(),
            resource: None,
            wait: DEFAULT_WAIT,
            hold: DEFAULT_HOLD,
            lang: default_lang(),
            verify_tls: true,
            request_timeout_secs: None,
        }
    }

    /// Set the desired resource
    pub fn with_resource(mut self, resource: &str) -> Self {
        self.resource = if resource.is_empty() {
            None
        } else {
            Some(resource.to_string())
        };
        self
    }

    /// Set wait/hold
    pub fn with_wait_hold(mut self, wait: u32, hold: u32) -> Self {
        self.wait = wait;
        self.hold = hold;
        self
    }

    /// Disable TLS certificate verification (development only)
    pub fn insecure(mut self) -> Self {
        self.verify_tls = false;
        self
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| BoshError::Config(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| BoshError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// `BOSH_URL` and `BOSH_DOMAIN` are required; `BOSH_RESOURCE`,
    /// `BOSH_WAIT`, `BOSH_HOLD` and `BOSH_VERIFY_TLS` are optional.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("BOSH_URL")
            .map_err(|_| BoshError::Config("BOSH_URL is not set".to_string()))?;
        let domain = std::env::var("BOSH_DOMAIN")
            .map_err(|_| BoshError::Config("BOSH_DOMAIN is not set".to_string()))?;

        let mut config = Self::new(&url, &domain);

        if let Ok(resource) = std::env::var("BOSH_RESOURCE") {
            config = config.with_resource(&resource);
        }
        if let Ok(wait) = std::env::var("BOSH_WAIT") {
            if let Ok(wait) = wait.parse() {
                config.wait = wait;
            }
        }
        if let Ok(hold) = std::env::var("BOSH_HOLD") {
            if let Ok(hold) = hold.parse() {
                config.hold = hold;
            }
        }
        if let Ok(verify) = std::env::var("BOSH_VERIFY_TLS") {
            config.verify_tls = !matches!(verify.to_lowercase().as_str(), "0" | "false" | "no");
        }

        config.validate()?;
        Ok(config)
    }

    /// Check required fields
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(BoshError::Config("url must not be empty".to_string()));
        }
        if self.domain.trim().is_empty() {
            return Err(BoshError::Config("domain must not be empty".to_string()));
        }
        if self.hold == 0 {
            return Err(BoshError::Config("hold must be at least 1".to_string()));
        }
        Ok(())
    }

    /// HTTP timeout applied to each request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(u64::from(self.wait) + TIMEOUT_MARGIN_SECS),
        )
    }

    /// Resource to request during bind (empty asks the server to assign one)
    pub fn resource_or_empty(&self) -> &str {
        self.resource.as_deref().unwrap_or("")
    }
}
