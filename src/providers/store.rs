//! Secret store provider: path-based reads and writes against the store's
//! HTTP API.
//!
//! The trait seam keeps the resolver independent of the transport so tests
//! can substitute an in-memory store.

use crate::config::StoreSettings;
use crate::errors::{DriftsyncError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

/// A path/key secret store.
#[async_trait]
pub trait SecretStore: Send + Sync + std::fmt::Debug {
    /// Read the secret at `path`, returning its flat key/value map.
    async fn read_path(&self, path: &str) -> Result<HashMap<String, String>>;

    /// Write `params` to `path` and return the response data, if any.
    /// Some store backends mint dynamic secrets on write.
    async fn write_path(
        &self,
        path: &str,
        params: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>>;
}

/// HTTP implementation of [`SecretStore`].
#[derive(Debug)]
pub struct HttpSecretStore {
    client: reqwest::Client,
    settings: StoreSettings,
}

#[derive(Deserialize)]
struct SecretResponse {
    #[serde(default)]
    data: HashMap<String, serde_json::Value>,
}

impl HttpSecretStore {
    pub fn new(settings: StoreSettings) -> Self {
        Self { client: reqwest::Client::new(), settings }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.settings.address, path.trim_start_matches('/'))
    }

    async fn into_data(
        response: reqwest::Response,
        path: &str,
    ) -> Result<HashMap<String, String>> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DriftsyncError::not_found("secret", path));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DriftsyncError::provider(
                "store",
                format!("request for '{}' failed ({}): {}", path, status, body),
            ));
        }

        // Writes that mint nothing come back with an empty body.
        let raw = response.text().await?;
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }

        let parsed: SecretResponse = serde_json::from_str(&raw)
            .map_err(|e| DriftsyncError::serialization(e, format!("secret at '{}'", path)))?;

        Ok(parsed
            .data
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect())
    }
}

#[async_trait]
impl SecretStore for HttpSecretStore {
    async fn read_path(&self, path: &str) -> Result<HashMap<String, String>> {
        let response = self
            .client
            .get(self.url(path))
            .header("X-Vault-Token", &self.settings.token)
            .send()
            .await?;
        Self::into_data(response, path).await
    }

    async fn write_path(
        &self,
        path: &str,
        params: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>> {
        let response = self
            .client
            .put(self.url(path))
            .header("X-Vault-Token", &self.settings.token)
            .json(params)
            .send()
            .await?;
        Self::into_data(response, path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(address: String) -> HttpSecretStore {
        HttpSecretStore::new(StoreSettings { address, token: "s.test".to_string() })
    }

    #[tokio::test]
    async fn test_read_path_returns_flat_map() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/secret/db"))
            .and(header("X-Vault-Token", "s.test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "username": "app", "password": "hunter2", "port": 5432 }
            })))
            .mount(&server)
            .await;

        let data = store(server.uri()).read_path("secret/db").await.unwrap();
        assert_eq!(data.get("username").map(String::as_str), Some("app"));
        assert_eq!(data.get("password").map(String::as_str), Some("hunter2"));
        assert_eq!(data.get("port").map(String::as_str), Some("5432"));
    }

    #[tokio::test]
    async fn test_read_missing_path_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/secret/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = store(server.uri()).read_path("secret/missing").await.unwrap_err();
        assert!(matches!(err, DriftsyncError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_write_path_sends_params() {
        let server = MockServer::start().await;
        let mut params = HashMap::new();
        params.insert("role".to_string(), "deployer".to_string());

        Mock::given(method("PUT"))
            .and(path("/v1/aws/creds/deployer"))
            .and(body_json(serde_json::json!({ "role": "deployer" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "access_key": "AKIA...", "secret_key": "abc" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let data = store(server.uri()).write_path("aws/creds/deployer", &params).await.unwrap();
        assert_eq!(data.len(), 2);
    }

    #[tokio::test]
    async fn test_write_with_empty_body_is_empty_map() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/v1/secret/app"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let data = store(server.uri()).write_path("secret/app", &HashMap::new()).await.unwrap();
        assert!(data.is_empty());
    }
}
