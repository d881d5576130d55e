//! Client configuration.

use reqwest::Url;

use crate::error::ConfigError;
use crate::keys::CustomValueKeys;
use crate::transport::DEFAULT_CONNECT_ATTEMPTS;

/// Environment variable holding access keys, `host=key[;host=key...]`.
pub const ACCESS_KEY_ENV: &str = "GRADLE_ENTERPRISE_ACCESS_KEY";

/// Settings for one [`crate::BuildValidationClient`].
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the server; may include a context path.
    pub server_url: Url,
    pub custom_value_keys: CustomValueKeys,
    /// Bearer token for the export API.
    pub access_key: Option<String>,
    pub connect_attempts: u32,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server_url", &self.server_url.as_str())
            .field("custom_value_keys", &self.custom_value_keys)
            .field("access_key", &self.access_key.as_ref().map(|_| "<redacted>"))
            .field("connect_attempts", &self.connect_attempts)
            .finish()
    }
}

impl ClientConfig {
    /// Config for `server_url` with default keys and no access key.
    pub fn new(server_url: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(server_url).map_err(|err| ConfigError::InvalidServerUrl {
            url: server_url.to_string(),
            reason: err.to_string(),
        })?;
        Self::from_url(url)
    }

    pub fn from_url(server_url: Url) -> Result<Self, ConfigError> {
        if !matches!(server_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidServerUrl {
                url: server_url.to_string(),
                reason: format!("unsupported scheme '{}'", server_url.scheme()),
            });
        }
        if server_url.host_str().is_none() {
            return Err(ConfigError::InvalidServerUrl {
                url: server_url.to_string(),
                reason: "missing host".to_string(),
            });
        }

        Ok(ClientConfig {
            server_url,
            custom_value_keys: CustomValueKeys::default(),
            access_key: None,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
        })
    }

    /// Like [`new`](Self::new), picking the access key for this server's
    /// host from [`ACCESS_KEY_ENV`].
    pub fn from_env(server_url: &str) -> Result<Self, ConfigError> {
        let mut config = Self::new(server_url)?;
        if let Ok(spec) = std::env::var(ACCESS_KEY_ENV) {
            config.access_key = lookup_access_key(&spec, config.host())?;
        }
        Ok(config)
    }

    pub fn with_custom_value_keys(mut self, keys: CustomValueKeys) -> Self {
        self.custom_value_keys = keys;
        self
    }

    pub fn with_access_key(mut self, access_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self
    }

    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts;
        self
    }

    pub fn host(&self) -> &str {
        self.server_url.host_str().unwrap_or_default()
    }
}

/// Find the key for `host` in a `host=key[;host=key...]` list.
pub fn lookup_access_key(spec: &str, host: &str) -> Result<Option<String>, ConfigError> {
    for entry in spec.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (entry_host, key) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidAccessKey("expected host=key".to_string()))?;
        if entry_host.trim().is_empty() || key.trim().is_empty() {
            return Err(ConfigError::InvalidAccessKey(
                "host and key must not be empty".to_string(),
            ));
        }
        if entry_host.trim().eq_ignore_ascii_case(host) {
            return Ok(Some(key.trim().to_string()));
        }
    }
    Ok(None)
}
