//! Cipher provider: decrypts `{cipher:<payload>}` tokens embedded in
//! configured values.
//!
//! A variable's cipher block selects an engine and carries engine identity
//! (keys, key names). Identity resolution is layered: per-variable values win
//! over the spec-level cipher defaults, which win over `DRIFTSYNC_*`
//! environment fallbacks.

use crate::config::spec::Defaults;
use crate::config::StoreSettings;
use crate::errors::{DriftsyncError, Result};
use crate::providers::aes::AesEngine;
use crate::providers::transit::TransitEngine;
use async_trait::async_trait;
use serde::Deserialize;

const TOKEN_PREFIX: &str = "{cipher:";
const TOKEN_SUFFIX: &str = "}";

/// A decryption engine for cipher payloads.
#[async_trait]
pub trait CipherEngine: Send + Sync + std::fmt::Debug {
    /// Decrypt one payload (the text between the token delimiters).
    async fn decrypt(&self, payload: &str) -> Result<String>;
}

/// Engine selector for a cipher source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherEngineType {
    Aes,
    Aws,
    Gcp,
    Pgp,
    Transit,
}

impl CipherEngineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CipherEngineType::Aes => "aes",
            CipherEngineType::Aws => "aws",
            CipherEngineType::Gcp => "gcp",
            CipherEngineType::Pgp => "pgp",
            CipherEngineType::Transit => "transit",
        }
    }
}

/// Cipher source block on a variable (or the spec-level default).
///
/// `value` holds the configured text containing the ciphertext token; it is
/// absent on the defaults block, which only supplies engine identity.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CipherSource {
    pub value: Option<String>,
    pub engine: Option<CipherEngineType>,
    pub aes: Option<AesIdentity>,
    pub aws: Option<AwsIdentity>,
    pub gcp: Option<GcpIdentity>,
    pub pgp: Option<PgpIdentity>,
    pub transit: Option<TransitIdentity>,
}

/// AES-256-GCM identity: a hex-encoded 256-bit key.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AesIdentity {
    pub key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AwsIdentity {
    pub kms_key_arn: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GcpIdentity {
    pub kms_key_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PgpIdentity {
    pub public_key_path: Option<String>,
    pub private_key_path: Option<String>,
}

/// Transit identity: the named key on the secret store's transit backend.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TransitIdentity {
    pub key: Option<String>,
}

/// Resolves cipher sources to plaintext by selecting an engine and decrypting
/// every token found in the configured value.
pub struct CipherResolver {
    defaults: CipherSource,
    store: Option<StoreSettings>,
}

impl CipherResolver {
    pub fn new(defaults: Option<&Defaults>, store: Option<StoreSettings>) -> Self {
        Self {
            defaults: defaults.and_then(|d| d.cipher.clone()).unwrap_or_default(),
            store,
        }
    }

    /// Decrypt the configured value of a cipher source, replacing each
    /// `{cipher:...}` token with its plaintext in place.
    pub async fn resolve(&self, source: &CipherSource) -> Result<String> {
        let value = source.value.as_deref().ok_or_else(|| {
            DriftsyncError::config("cipher source has no value to decrypt")
        })?;

        let engine = self.engine_for(source)?;

        let mut output = String::with_capacity(value.len());
        let mut rest = value;
        while let Some(start) = rest.find(TOKEN_PREFIX) {
            let after = &rest[start + TOKEN_PREFIX.len()..];
            let end = after.find(TOKEN_SUFFIX).ok_or_else(|| {
                DriftsyncError::provider("cipher", "unterminated ciphertext token")
            })?;
            output.push_str(&rest[..start]);
            output.push_str(&engine.decrypt(&after[..end]).await?);
            rest = &after[end + TOKEN_SUFFIX.len()..];
        }
        output.push_str(rest);
        Ok(output)
    }

    fn engine_for(&self, source: &CipherSource) -> Result<Box<dyn CipherEngine>> {
        let engine_type = source
            .engine
            .or(self.defaults.engine)
            .ok_or_else(|| DriftsyncError::config("no cipher engine configured"))?;

        match engine_type {
            CipherEngineType::Aes => {
                let key = source
                    .aes
                    .as_ref()
                    .and_then(|a| a.key.clone())
                    .or_else(|| self.defaults.aes.as_ref().and_then(|a| a.key.clone()))
                    .or_else(|| std::env::var("DRIFTSYNC_AES_KEY").ok())
                    .ok_or_else(|| {
                        DriftsyncError::config(
                            "aes cipher key is not defined (spec or DRIFTSYNC_AES_KEY)",
                        )
                    })?;
                Ok(Box::new(AesEngine::from_hex_key(&key)?))
            }
            CipherEngineType::Transit => {
                let key = source
                    .transit
                    .as_ref()
                    .and_then(|t| t.key.clone())
                    .or_else(|| self.defaults.transit.as_ref().and_then(|t| t.key.clone()))
                    .or_else(|| std::env::var("DRIFTSYNC_TRANSIT_KEY").ok())
                    .ok_or_else(|| {
                        DriftsyncError::config(
                            "transit cipher key is not defined (spec or DRIFTSYNC_TRANSIT_KEY)",
                        )
                    })?;
                let store = self.store.clone().ok_or_else(|| {
                    DriftsyncError::config("transit cipher requires secret store settings")
                })?;
                Ok(Box::new(TransitEngine::new(store, key)))
            }
            other => Err(DriftsyncError::provider(
                "cipher",
                format!("cipher engine '{}' is not supported yet", other.as_str()),
            )),
        }
    }
}
