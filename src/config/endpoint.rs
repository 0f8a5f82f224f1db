//! Endpoint resolution configuration

use serde::Deserialize;
use tokio_tungstenite::tungstenite::http::Uri;

use super::error::ValidationError;

const LOOPBACK_HOSTS: [&str; 4] = ["localhost", "127.0.0.1", "::1", "0.0.0.0"];

/// Where the real-time endpoint lives
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Origin the consuming application is served from
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Externally configured API base URL, if any
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Path suffix stripped from `api_base_url`
    #[serde(default = "default_api_suffix")]
    pub api_suffix: String,

    /// Backend used when the origin is a local loopback host
    #[serde(default = "default_local_dev_url")]
    pub local_dev_url: String,

    /// Path of the real-time namespace
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl EndpointConfig {
    /// Resolve the WebSocket endpoint.
    ///
    /// Priority: local loopback origin, then `api_base_url` (trailing `/`
    /// and `api_suffix` stripped), then the origin itself.
    pub fn resolve(&self) -> Result<String, ValidationError> {
        let base = if is_loopback(&self.origin)? {
            self.local_dev_url.as_str()
        } else if let Some(api) = self.api_base_url.as_deref().filter(|u| !u.is_empty()) {
            let api = api.trim_end_matches('/');
            api.strip_suffix(self.api_suffix.as_str()).unwrap_or(api)
        } else {
            self.origin.as_str()
        };

        let ws_base = to_ws_scheme(base.trim_end_matches('/'))?;
        Ok(format!("{}{}", ws_base, self.namespace))
    }

    /// Validate endpoint configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.origin.is_empty() {
            return Err(ValidationError::MissingRequired("ENDPOINT__ORIGIN"));
        }
        if !self.namespace.starts_with('/') {
            return Err(ValidationError::InvalidNamespace(self.namespace.clone()));
        }
        self.resolve()?;
        Ok(())
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            api_base_url: None,
            api_suffix: default_api_suffix(),
            local_dev_url: default_local_dev_url(),
            namespace: default_namespace(),
        }
    }
}

fn is_loopback(origin: &str) -> Result<bool, ValidationError> {
    let uri: Uri = origin.parse().map_err(|_| ValidationError::InvalidUrl {
        field: "endpoint.origin",
        value: origin.to_string(),
    })?;
    let host = uri
        .host()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
        .unwrap_or_default();
    Ok(LOOPBACK_HOSTS.contains(&host))
}

fn to_ws_scheme(base: &str) -> Result<String, ValidationError> {
    if let Some(rest) = base.strip_prefix("https://") {
        Ok(format!("wss://{}", rest))
    } else if let Some(rest) = base.strip_prefix("http://") {
        Ok(format!("ws://{}", rest))
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        Ok(base.to_string())
    } else {
        Err(ValidationError::InvalidUrl {
            field: "endpoint",
            value: base.to_string(),
        })
    }
}

fn default_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_api_suffix() -> String {
    "/api".to_string()
}

fn default_local_dev_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_namespace() -> String {
    "/realtime".to_string()
}
