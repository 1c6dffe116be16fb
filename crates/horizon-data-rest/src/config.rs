//! REST proxy configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RestError, Result};

/// Configuration for a [`RestProxy`](crate::RestProxy).
///
/// Every field has a default, so a configuration file only needs the keys it
/// changes:
///
/// ```
/// use horizon_data_rest::RestProxyConfig;
///
/// let config = RestProxyConfig::from_toml_str(r#"
///     url_root = "https://api.example.com/users"
///     incremental = true
///
///     [headers]
///     Authorization = "Bearer token"
/// "#).unwrap();
///
/// assert!(config.append_id);
/// assert_eq!(config.headers.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestProxyConfig {
    /// Absolute URL of the resource collection.
    pub url_root: String,
    /// Append `/<id>` to the URL for read, update and destroy.
    pub append_id: bool,
    /// Send only changed attributes on update.
    pub incremental: bool,
    /// Key that wraps the record in read responses, if any.
    pub root_property: Option<String>,
    /// Request timeout in milliseconds. `None` uses the client default.
    pub timeout_ms: Option<u64>,
    /// Headers sent with every request.
    pub headers: BTreeMap<String, String>,
}

impl Default for RestProxyConfig {
    fn default() -> Self {
        Self {
            url_root: String::new(),
            append_id: true,
            incremental: false,
            root_property: None,
            timeout_ms: None,
            headers: BTreeMap::new(),
        }
    }
}

impl RestProxyConfig {
    /// A default configuration for `url_root`.
    pub fn new(url_root: impl Into<String>) -> Self {
        Self {
            url_root: url_root.into(),
            ..Self::default()
        }
    }

    /// Parse a configuration from TOML.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|err| RestError::Config(err.to_string()))
    }

    /// Parse a configuration from JSON.
    pub fn from_json_str(source: &str) -> Result<Self> {
        serde_json::from_str(source).map_err(|err| RestError::Config(err.to_string()))
    }

    pub fn append_id(mut self, append_id: bool) -> Self {
        self.append_id = append_id;
        self
    }

    pub fn incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn root_property(mut self, property: impl Into<String>) -> Self {
        self.root_property = Some(property.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis().try_into().unwrap_or(u64::MAX));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The request timeout as a duration.
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
