//! Engine configuration from environment variables.

use std::net::SocketAddr;

use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

use crate::infrastructure::channels::DEFAULT_CHANNEL_CAPACITY;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub server_host: String,
    pub server_port: u16,
    /// SQLite file for sessions and players. `None` keeps them in memory.
    pub session_db: Option<String>,
    /// JSON campaign catalog. `None` starts with no campaigns.
    pub campaign_data_path: Option<String>,
    pub channel_capacity: usize,
    pub cors_allowed_origins: Option<String>,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable numbers fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let server_port = non_empty("SERVER_PORT")
            .or_else(|| non_empty("PORT"))
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let channel_capacity = non_empty("CHANNEL_CAPACITY")
            .and_then(|v| v.parse().ok())
            .filter(|capacity| *capacity > 0)
            .unwrap_or(DEFAULT_CHANNEL_CAPACITY);

        Self {
            server_host: non_empty("SERVER_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            server_port,
            session_db: non_empty("SESSION_DB"),
            campaign_data_path: non_empty("CAMPAIGN_DATA_PATH"),
            channel_capacity,
            cors_allowed_origins: non_empty("CORS_ALLOWED_ORIGINS"),
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server_host, self.server_port).parse()
    }

    /// CORS layer for `CORS_ALLOWED_ORIGINS`: `*` or a comma-separated list.
    pub fn cors_layer(&self) -> Option<CorsLayer> {
        let allowed_origins = self.cors_allowed_origins.as_deref()?;

        let mut cors = CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE]);

        if allowed_origins == "*" {
            cors = cors.allow_origin(Any);
        } else {
            let origins: Vec<HeaderValue> = allowed_origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .filter_map(|s| HeaderValue::from_str(s).ok())
                .collect();

            if origins.is_empty() {
                return None;
            }

            cors = cors.allow_origin(origins);
        }

        Some(cors)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> EngineConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = EngineConfig::default();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.server_host, "0.0.0.0");
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert!(config.session_db.is_none());
        assert!(config.cors_layer().is_none());
    }

    #[test]
    fn port_falls_back_to_port_variable() {
        assert_eq!(config(&[("PORT", "8080")]).server_port, 8080);
        assert_eq!(
            config(&[("SERVER_PORT", "9000"), ("PORT", "8080")]).server_port,
            9000
        );
        assert_eq!(config(&[("SERVER_PORT", "nope")]).server_port, 3000);
    }

    #[test]
    fn blank_paths_are_unset() {
        let config = config(&[("SESSION_DB", "  "), ("CAMPAIGN_DATA_PATH", "campaigns.json")]);
        assert!(config.session_db.is_none());
        assert_eq!(config.campaign_data_path.as_deref(), Some("campaigns.json"));
    }

    #[test]
    fn zero_channel_capacity_uses_default() {
        assert_eq!(
            config(&[("CHANNEL_CAPACITY", "0")]).channel_capacity,
            DEFAULT_CHANNEL_CAPACITY
        );
    }

    #[test]
    fn cors_accepts_wildcard_and_lists() {
        assert!(config(&[("CORS_ALLOWED_ORIGINS", "*")]).cors_layer().is_some());
        assert!(config(&[("CORS_ALLOWED_ORIGINS", "http://a.test, http://b.test")])
            .cors_layer()
            .is_some());
    }
}
