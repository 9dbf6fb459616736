//! Client configuration
//!
//! The only setting that varies between deployments is the backend origin:
//! the local development server or a production origin.

use std::time::Duration;
use thiserror::Error;

/// Origin of the local development backend
pub const DEVELOPMENT_ORIGIN: &str = "http://localhost:8001";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Unknown COUNCIL_ENV value: {0} (expected development or production)")]
    UnknownEnvironment(String),
    #[error("COUNCIL_BASE_URL must be set in production")]
    MissingProductionOrigin,
}

/// Configuration for the council client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub environment: Environment,
    /// Origin the `/api/...` paths are appended to, without trailing slash
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Applies to non-streaming requests only
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::development()
    }
}

impl ClientConfig {
    pub fn development() -> Self {
        Self::with_origin(Environment::Development, DEVELOPMENT_ORIGIN)
    }

    pub fn production(origin: impl Into<String>) -> Self {
        Self::with_origin(Environment::Production, origin)
    }

    fn with_origin(environment: Environment, origin: impl Into<String>) -> Self {
        Self {
            environment,
            base_url: origin.into().trim_end_matches('/').to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Read `COUNCIL_ENV` and, in production, `COUNCIL_BASE_URL`
    ///
    /// # Errors
    ///
    /// Unknown `COUNCIL_ENV` values and a production setup without
    /// `COUNCIL_BASE_URL` are rejected.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let environment = match lookup("COUNCIL_ENV").as_deref().map(str::trim) {
            None | Some("" | "development" | "dev") => Environment::Development,
            Some("production" | "prod") => Environment::Production,
            Some(other) => return Err(ConfigError::UnknownEnvironment(other.to_string())),
        };

        match environment {
            Environment::Development => Ok(Self::development()),
            Environment::Production => lookup("COUNCIL_BASE_URL")
                .filter(|origin| !origin.trim().is_empty())
                .map(Self::production)
                .ok_or(ConfigError::MissingProductionOrigin),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Absolute URL for an API path starting with `/`
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
