//! Registry client configuration.
//!
//! All connection settings are carried in an explicit value handed to
//! [`RegistryClient::new`](crate::client::RegistryClient::new) at construction
//! time; nothing is read from ambient process state by the client itself.

use std::time::Duration;

/// Connection settings for one registry.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Registry base URL, without a trailing slash (normalized by `new`).
    pub base_url: String,
    /// Bearer token; `None` for anonymous access.
    pub api_key: Option<String>,
    /// Whole-request timeout applied to the underlying HTTP client.
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            api_key: None,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
