//! Source configuration blob parsing.
//!
//! The blob attached to a harvest source is free-form JSON. Parsing never
//! fails: a malformed document yields [`SourceConfig::default`], and each key
//! that is missing or has the wrong type falls back to its own default.

use serde_json::Value;
use tracing::debug;

pub const DEFAULT_METADATA_PREFIX: &str = "oai_dc";

/// Basic credentials for the remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Effective per-source harvesting options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// `username` + `password`; both must be strings. Default: none
    pub credentials: Option<Credentials>,
    /// `set`; empty strings count as absent. Default: none
    pub set_spec: Option<String>,
    /// `metadata_prefix`. Default: `oai_dc`
    pub metadata_prefix: String,
    /// `force_http_get`. Default: `false` (POST)
    pub force_http_get: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            set_spec: None,
            metadata_prefix: DEFAULT_METADATA_PREFIX.to_string(),
            force_http_get: false,
        }
    }
}

impl SourceConfig {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
            return Self::default();
        };

        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "Ignoring unparseable source config");
                return Self::default();
            }
        };

        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Self {
        let mut config = Self::default();
        let Some(map) = value.as_object() else {
            return config;
        };

        let username = map.get("username").and_then(Value::as_str);
        let password = map.get("password").and_then(Value::as_str);
        if let (Some(username), Some(password)) = (username, password) {
            config.credentials = Some(Credentials {
                username: username.to_string(),
                password: password.to_string(),
            });
        }

        config.set_spec = map
            .get("set")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if let Some(prefix) = map
            .get("metadata_prefix")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
        {
            config.metadata_prefix = prefix.to_string();
        }

        if let Some(force) = map.get("force_http_get").and_then(Value::as_bool) {
            config.force_http_get = force;
        }

        config
    }
}
