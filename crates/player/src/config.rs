//! Player configuration from environment variables.

use std::time::Duration;

use thiserror::Error;
use url::Url;

use tavern_domain::{Identity, JoinCode, PlayerId, SessionRole, GAME_MASTER_NAME};

use crate::application::services::DEFAULT_BOOTSTRAP_TIMEOUT;

const DEFAULT_ENGINE_URL: &str = "ws://localhost:3000/ws";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("Invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    /// WebSocket endpoint of the engine
    pub engine_url: String,
    /// REST base for the bootstrap read; derived from `engine_url` unless
    /// `ENGINE_HTTP_URL` is set.
    pub http_base_url: String,
    pub join_code: JoinCode,
    pub user_id: PlayerId,
    pub user_name: String,
    pub role: SessionRole,
    pub bootstrap_timeout: Duration,
}

impl PlayerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let engine_url = non_empty("ENGINE_URL").unwrap_or_else(|| DEFAULT_ENGINE_URL.to_string());
        let http_base_url = match non_empty("ENGINE_HTTP_URL") {
            Some(url) => url,
            None => http_base_from_ws(&engine_url)?,
        };

        let join_code = non_empty("JOIN_CODE").ok_or(ConfigError::Missing("JOIN_CODE"))?;
        let join_code = JoinCode::new(&join_code).map_err(|e| ConfigError::Invalid {
            key: "JOIN_CODE",
            reason: e.to_string(),
        })?;

        let role = match non_empty("ROLE") {
            Some(role) => role.parse::<SessionRole>().map_err(|e| ConfigError::Invalid {
                key: "ROLE",
                reason: e.to_string(),
            })?,
            None => SessionRole::Player,
        };

        let user_id = non_empty("USER_ID").ok_or(ConfigError::Missing("USER_ID"))?;
        let user_name = match non_empty("USER_NAME") {
            Some(name) => name,
            None if role.is_gm() => GAME_MASTER_NAME.to_string(),
            None => user_id.clone(),
        };

        let bootstrap_timeout = match non_empty("BOOTSTRAP_TIMEOUT_SECS") {
            Some(secs) => secs
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| ConfigError::Invalid {
                    key: "BOOTSTRAP_TIMEOUT_SECS",
                    reason: e.to_string(),
                })?,
            None => DEFAULT_BOOTSTRAP_TIMEOUT,
        };

        Ok(Self {
            engine_url,
            http_base_url,
            join_code,
            user_id: PlayerId::new(user_id),
            user_name,
            role,
            bootstrap_timeout,
        })
    }

    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.user_id.clone(),
            display_name: self.user_name.clone(),
            role: self.role,
        }
    }
}

/// `ws://host:port/ws` → `http://host:port`
fn http_base_from_ws(engine_url: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        key: "ENGINE_URL",
        reason,
    };

    let mut url = Url::parse(engine_url).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => return Err(invalid(format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid(format!("cannot use scheme {scheme}")))?;
    url.set_path("");
    url.set_query(None);

    Ok(url.as_str().trim_end_matches('/').to_string())
}
