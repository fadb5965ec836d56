//! HTTP bootstrap source against the engine's REST surface

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use tavern_domain::JoinCode;
use tavern_shared::BootstrapSnapshot;

use crate::ports::outbound::{BootstrapFetchError, BootstrapSource};

/// Fetches `GET /api/sessions/{code}/bootstrap`.
pub struct HttpBootstrapSource {
    client: Client,
    base_url: String,
}

impl HttpBootstrapSource {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn bootstrap_url(&self, join_code: &JoinCode) -> String {
        format!("{}/api/sessions/{}/bootstrap", self.base_url, join_code)
    }
}

#[async_trait]
impl BootstrapSource for HttpBootstrapSource {
    async fn fetch(&self, join_code: &JoinCode) -> Result<BootstrapSnapshot, BootstrapFetchError> {
        let url = self.bootstrap_url(join_code);
        tracing::debug!(url = %url, "Fetching session snapshot");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BootstrapFetchError::Request(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(BootstrapFetchError::NotFound(join_code.to_string()));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BootstrapFetchError::Request(format!(
                "{status}: {error_text}"
            )));
        }

        response
            .json::<BootstrapSnapshot>()
            .await
            .map_err(|e| BootstrapFetchError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_url_ignores_trailing_slash() {
        let source = HttpBootstrapSource::new("http://localhost:3000/", Duration::from_secs(1));
        let code = JoinCode::new("ABCD").unwrap();

        assert_eq!(
            source.bootstrap_url(&code),
            "http://localhost:3000/api/sessions/ABCD/bootstrap"
        );
    }

    #[tokio::test]
    async fn unreachable_engine_is_a_request_error() {
        let source = HttpBootstrapSource::new("http://127.0.0.1:1", Duration::from_secs(1));
        let code = JoinCode::new("ABCD").unwrap();

        let result = source.fetch(&code).await;

        assert!(matches!(result, Err(BootstrapFetchError::Request(_))));
    }
}
