use serde::{Deserialize, Serialize};
use std::fmt;

use crate::defaults;
use crate::errors::{Error, Result};
use crate::model::Distance;

/// Connection and collection defaults for a [`CollectionClient`](crate::CollectionClient).
///
/// At least one of `port` / `api_key` must be set. When both are given the
/// port is written into the URL and the key is sent with every request.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub url: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub distance: Distance,
    #[serde(default = "default_vector_size")]
    pub vector_size: u64,
    #[serde(default)]
    pub collection_name: Option<String>,
    #[serde(default)]
    pub print_logs: bool,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_vector_size() -> u64 {
    defaults::DEFAULT_VECTOR_SIZE
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            port: None,
            api_key: None,
            distance: Distance::default(),
            vector_size: defaults::DEFAULT_VECTOR_SIZE,
            collection_name: None,
            print_logs: false,
            timeout_secs: None,
        }
    }

    /// Read `QDRANT_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("QDRANT_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", defaults::DEFAULT_PORT));
        let port = match std::env::var("QDRANT_PORT") {
            Ok(raw) if !raw.is_empty() => Some(parse_env::<u16>("QDRANT_PORT", &raw)?),
            _ => None,
        };
        let api_key = std::env::var("QDRANT_API_KEY").ok().filter(|k| !k.is_empty());
        let distance = match std::env::var("QDRANT_DISTANCE") {
            Ok(raw) if !raw.is_empty() => raw.parse()?,
            _ => Distance::default(),
        };
        let vector_size = match std::env::var("QDRANT_VECTOR_SIZE") {
            Ok(raw) if !raw.is_empty() => parse_env::<u64>("QDRANT_VECTOR_SIZE", &raw)?,
            _ => defaults::DEFAULT_VECTOR_SIZE,
        };
        let timeout_secs = match std::env::var("QDRANT_TIMEOUT_SECS") {
            Ok(raw) if !raw.is_empty() => Some(parse_env::<u64>("QDRANT_TIMEOUT_SECS", &raw)?),
            _ => None,
        };
        let collection_name = std::env::var("QDRANT_COLLECTION").ok().filter(|c| !c.is_empty());
        let print_logs = std::env::var("QDRANT_PRINT_LOGS")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            url,
            port,
            api_key,
            distance,
            vector_size,
            collection_name,
            print_logs,
            timeout_secs,
        })
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn distance(mut self, distance: Distance) -> Self {
        self.distance = distance;
        self
    }

    pub fn vector_size(mut self, vector_size: u64) -> Self {
        self.vector_size = vector_size;
        self
    }

    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = Some(name.into());
        self
    }

    pub fn print_logs(mut self, enabled: bool) -> Self {
        self.print_logs = enabled;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let has_key = self.api_key.as_deref().map(|k| !k.is_empty()).unwrap_or(false);
        if self.port.is_none() && !has_key {
            return Err(Error::ConnectionConfig);
        }
        Ok(())
    }

    /// URL to dial, with `port` (if set) replacing any port already in the URL.
    pub fn endpoint(&self) -> String {
        let url = self.url.trim_end_matches('/');
        let Some(port) = self.port else {
            return url.to_string();
        };

        let (scheme, rest) = url.split_once("://").unwrap_or(("http", url));
        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };
        let host = match authority.rsplit_once(':') {
            Some((host, p)) if !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()) => host,
            _ => authority,
        };

        format!("{}://{}:{}{}", scheme, host, port, path)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("port", &self.port)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("distance", &self.distance)
            .field("vector_size", &self.vector_size)
            .field("collection_name", &self.collection_name)
            .field("print_logs", &self.print_logs)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::InvalidConfig(format!("{} has invalid value: {}", name, raw)))
}
