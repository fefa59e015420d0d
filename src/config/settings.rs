//! Client settings resolved from the sync spec with environment fallbacks.
//!
//! Spec values win over the environment. The secret store follows the
//! conventional `VAULT_ADDR` / `VAULT_TOKEN` / `~/.vault-token` lookup chain.

use crate::config::spec::{RemoteSpec, StoreSpec};
use crate::errors::{DriftsyncError, Result};

/// Default remote workspace API address.
const DEFAULT_REMOTE_ADDRESS: &str = "https://app.terraform.io";

/// Connection settings for the remote workspace API.
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub address: String,
    pub token: String,
    pub organization: String,
    pub workspace: String,
}

impl RemoteSettings {
    /// Resolve settings: spec value, then `DRIFTSYNC_REMOTE_*` environment
    /// variables, then (for the address only) the public default.
    pub fn resolve(spec: &RemoteSpec) -> Result<Self> {
        let address = spec
            .address
            .clone()
            .or_else(|| std::env::var("DRIFTSYNC_REMOTE_ADDRESS").ok())
            .unwrap_or_else(|| DEFAULT_REMOTE_ADDRESS.to_string());

        let token = spec
            .token
            .clone()
            .or_else(|| std::env::var("DRIFTSYNC_REMOTE_TOKEN").ok())
            .ok_or_else(|| {
                DriftsyncError::config(
                    "remote API token is not defined (spec or DRIFTSYNC_REMOTE_TOKEN)",
                )
            })?;

        if spec.organization.is_empty() {
            return Err(DriftsyncError::config("remote organization is not defined"));
        }
        if spec.workspace.name.is_empty() {
            return Err(DriftsyncError::config("remote workspace name is not defined"));
        }

        Ok(Self {
            address: address.trim_end_matches('/').to_string(),
            token,
            organization: spec.organization.clone(),
            workspace: spec.workspace.name.clone(),
        })
    }
}

/// Connection settings for the secret store.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub address: String,
    pub token: String,
}

impl StoreSettings {
    /// Resolve settings: spec value, then `VAULT_ADDR` / `VAULT_TOKEN`, then
    /// the token file at `~/.vault-token`.
    pub fn resolve(spec: Option<&StoreSpec>) -> Result<Self> {
        let address = spec
            .and_then(|s| s.address.clone())
            .or_else(|| std::env::var("VAULT_ADDR").ok())
            .ok_or_else(|| {
                DriftsyncError::config("secret store address is not defined (spec or VAULT_ADDR)")
            })?;

        let token = match spec.and_then(|s| s.token.clone()) {
            Some(token) => token,
            None => match std::env::var("VAULT_TOKEN") {
                Ok(token) if !token.is_empty() => token,
                _ => Self::token_from_home_file().ok_or_else(|| {
                    DriftsyncError::config(
                        "secret store token is not defined (spec, VAULT_TOKEN or ~/.vault-token)",
                    )
                })?,
            },
        };

        Ok(Self { address: address.trim_end_matches('/').to_string(), token })
    }

    fn token_from_home_file() -> Option<String> {
        let home = std::env::var("HOME").ok()?;
        let raw = std::fs::read_to_string(format!("{}/.vault-token", home)).ok()?;
        let token = raw.trim().to_string();
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    }
}
