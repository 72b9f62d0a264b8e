//! Main client for the Dooray SDK.

use crate::api::*;
use crate::config::{ClientConfig, RetryConfig, DEFAULT_BASE_URL};
use crate::error::{DoorayError, DoorayResult};
use crate::transport::HttpTransport;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Environment variable holding the API token.
pub const API_KEY_ENV: &str = "DOORAY_API_KEY";
/// Environment variable overriding the API base URL.
pub const BASE_URL_ENV: &str = "DOORAY_BASE_URL";

/// Main client for interacting with the Dooray API.
#[derive(Clone)]
pub struct DoorayClient {
    config: Arc<ClientConfig>,
    pub(crate) http: HttpTransport,
}

impl DoorayClient {
    /// Create a new client builder.
    pub fn builder() -> DoorayClientBuilder {
        DoorayClientBuilder::new()
    }

    /// Build a client from `DOORAY_API_KEY` and, if set, `DOORAY_BASE_URL`.
    pub fn from_env() -> DoorayResult<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| DoorayError::Config(format!("{} is required", API_KEY_ENV)))?;

        let mut builder = Self::builder().api_key(api_key);
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            builder = builder.base_url(base_url);
        }
        builder.build()
    }

    /// Create a client from configuration.
    fn from_config(config: ClientConfig) -> DoorayResult<Self> {
        let config = Arc::new(config);
        let http = HttpTransport::new(config.clone())?;

        Ok(Self { config, http })
    }

    /// Base URL this client talks to.
    pub fn base_url(&self) -> &Url {
        &self.config.base_url
    }

    /// Get the wiki API.
    pub fn wiki(&self) -> WikiApi<'_> {
        WikiApi::new(self)
    }

    /// Get the projects API.
    pub fn projects(&self) -> ProjectsApi<'_> {
        ProjectsApi::new(self)
    }

    /// Get the messenger API.
    pub fn messenger(&self) -> MessengerApi<'_> {
        MessengerApi::new(self)
    }

    /// Get the calendar API.
    pub fn calendar(&self) -> CalendarApi<'_> {
        CalendarApi::new(self)
    }
}

/// Builder for creating a DoorayClient.
pub struct DoorayClientBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
    retry_config: RetryConfig,
}

impl DoorayClientBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout: Duration::from_secs(30),
            retry_config: RetryConfig::default(),
        }
    }

    /// Set the base URL of the Dooray API. Defaults to the public endpoint.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the API token.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry configuration.
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Build the client.
    pub fn build(self) -> DoorayResult<DoorayClient> {
        let api_key = self
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| DoorayError::Config("api_key is required".to_string()))?;

        let base_url_str = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base_url_str)?;

        let config = ClientConfig {
            base_url,
            api_key,
            timeout: self.timeout,
            retry_config: self.retry_config,
        };

        DoorayClient::from_config(config)
    }
}

impl Default for DoorayClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
