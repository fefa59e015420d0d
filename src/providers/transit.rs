//! Transit cipher engine: decryption delegated to the secret store's transit
//! backend over HTTP. Payloads are the store's own ciphertext format and are
//! never interpreted locally.

use crate::config::StoreSettings;
use crate::errors::{DriftsyncError, Result};
use crate::providers::cipher::CipherEngine;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;

#[derive(Debug)]
pub struct TransitEngine {
    client: reqwest::Client,
    settings: StoreSettings,
    key: String,
}

#[derive(Deserialize)]
struct DecryptResponse {
    data: DecryptData,
}

#[derive(Deserialize)]
struct DecryptData {
    plaintext: String,
}

impl TransitEngine {
    pub fn new(settings: StoreSettings, key: String) -> Self {
        Self { client: reqwest::Client::new(), settings, key }
    }
}

#[async_trait]
impl CipherEngine for TransitEngine {
    async fn decrypt(&self, payload: &str) -> Result<String> {
        let url = format!("{}/v1/transit/decrypt/{}", self.settings.address, self.key);

        let response = self
            .client
            .post(&url)
            .header("X-Vault-Token", &self.settings.token)
            .json(&serde_json::json!({ "ciphertext": payload }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DriftsyncError::provider(
                "transit",
                format!("decrypt with key '{}' failed ({}): {}", self.key, status, body),
            ));
        }

        let decrypted: DecryptResponse = response.json().await?;
        let raw = BASE64.decode(&decrypted.data.plaintext).map_err(|e| {
            DriftsyncError::provider("transit", format!("invalid base64 plaintext: {}", e))
        })?;

        String::from_utf8(raw).map_err(|_| {
            DriftsyncError::provider("transit", "decrypted payload is not valid utf-8")
        })
    }
}
