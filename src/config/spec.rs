//! Declarative sync specification.
//!
//! The spec file is TOML. `[[tfvar]]` entries become Terraform-kind variables,
//! `[[envvar]]` entries Environment-kind. Each variable names exactly one
//! provider source (`env`, `cipher`, or `store`); anything else is a
//! configuration error caught before any I/O.

use crate::errors::{DriftsyncError, Result};
use crate::model::VariableKind;
use crate::providers::cipher::CipherSource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root of the sync specification file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SyncSpec {
    pub remote: RemoteSpec,

    /// Secret store connection (address/token); environment fallbacks apply.
    pub store: Option<StoreSpec>,

    pub defaults: Option<Defaults>,

    #[serde(default, rename = "tfvar")]
    pub terraform_variables: Vec<VariableSpec>,

    #[serde(default, rename = "envvar")]
    pub environment_variables: Vec<VariableSpec>,
}

impl SyncSpec {
    /// Load a spec from a TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DriftsyncError::io(e, format!("reading spec file {}", path.display())))?;
        toml::from_str(&raw)
            .map_err(|e| DriftsyncError::config(format!("invalid spec file: {}", e)))
    }

    /// Flatten the per-kind variable lists into one kinded list.
    pub fn variables(&self) -> Vec<ManagedVariable> {
        let mut variables = Vec::new();
        for spec in &self.terraform_variables {
            variables
                .push(ManagedVariable { kind: VariableKind::Terraform, spec: spec.clone() });
        }
        for spec in &self.environment_variables {
            variables
                .push(ManagedVariable { kind: VariableKind::Environment, spec: spec.clone() });
        }
        variables
    }

    pub fn variable_defaults(&self) -> VariableDefaults {
        self.defaults.as_ref().and_then(|d| d.variable.clone()).unwrap_or_default()
    }
}

/// Remote workspace API configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RemoteSpec {
    pub address: Option<String>,
    pub token: Option<String>,
    pub organization: String,
    pub workspace: WorkspaceSpec,

    /// Create the workspace if it does not exist yet.
    #[serde(default)]
    pub workspace_auto_create: bool,

    /// Delete remote variables not present in the configured set.
    #[serde(default)]
    pub purge_unmanaged_variables: bool,
}

/// Desired workspace settings. Absent fields mean "leave as-is", except
/// `operations`, which defaults to true at reconcile time (remote execution
/// is enforced unless explicitly disabled).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct WorkspaceSpec {
    pub name: String,
    pub operations: Option<bool>,
    pub auto_apply: Option<bool>,
    pub terraform_version: Option<String>,
    pub working_directory: Option<String>,
    /// SSH key name to assign; the sentinel `"-"` unassigns any current key.
    pub ssh_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSpec {
    pub address: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Defaults {
    pub variable: Option<VariableDefaults>,
    pub cipher: Option<CipherSource>,
}

/// Defaults applied to variables that do not override them.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct VariableDefaults {
    pub sensitive: Option<bool>,
    pub hcl: Option<bool>,
    pub ttl_seconds: Option<u64>,
}

/// A declarative variable: name, exactly one provider source, and rendering
/// attributes.
#[derive(Debug, Clone, Deserialize)]
pub struct VariableSpec {
    pub name: String,

    pub env: Option<EnvSource>,
    pub cipher: Option<CipherSource>,
    pub store: Option<StoreSource>,

    pub sensitive: Option<bool>,
    pub hcl: Option<bool>,
    pub ttl_seconds: Option<u64>,
}

impl VariableSpec {
    /// Return the single configured provider source.
    ///
    /// Zero or more than one configured source is a configuration error, not
    /// a runtime one; this is checked before any I/O happens.
    pub fn source(&self) -> Result<VariableSource<'_>> {
        let mut configured = 0;
        let mut source = None;

        if let Some(env) = &self.env {
            configured += 1;
            source = Some(VariableSource::Env(env));
        }
        if let Some(cipher) = &self.cipher {
            configured += 1;
            source = Some(VariableSource::Cipher(cipher));
        }
        if let Some(store) = &self.store {
            configured += 1;
            source = Some(VariableSource::Store(store));
        }

        match (configured, source) {
            (1, Some(source)) => Ok(source),
            _ => Err(DriftsyncError::config(format!(
                "exactly one provider must be configured per variable, found {} for '{}'",
                configured, self.name
            ))),
        }
    }

    /// Effective TTL: per-variable value, falling back to the defaults block.
    /// `None` and zero both mean "always refresh, never tracked".
    pub fn effective_ttl(&self, defaults: &VariableDefaults) -> Option<Duration> {
        self.ttl_seconds
            .or(defaults.ttl_seconds)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Names this variable contributes to the remote set.
    ///
    /// Store sources with a `keys` mapping fan out to one variable per mapped
    /// output name; everything else contributes the variable's own name. Used
    /// to exempt managed variables from purge without resolving them.
    pub fn output_names(&self) -> Vec<String> {
        if let Some(store) = &self.store {
            if let Some(keys) = &store.keys {
                return keys.values().cloned().collect();
            }
        }
        vec![self.name.clone()]
    }
}

/// A variable spec with its kind attached.
#[derive(Debug, Clone)]
pub struct ManagedVariable {
    pub kind: VariableKind,
    pub spec: VariableSpec,
}

/// The single configured provider source of a variable.
#[derive(Debug)]
pub enum VariableSource<'a> {
    Env(&'a EnvSource),
    Cipher(&'a CipherSource),
    Store(&'a StoreSource),
}

/// Environment lookup source.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvSource {
    pub variable: String,
}

/// Secret-store lookup source: a path read (or write-with-params) returning a
/// flat string map, narrowed by `key` or fanned out by `keys`.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSource {
    pub path: String,
    pub method: Option<StoreMethod>,
    pub params: Option<HashMap<String, String>>,
    /// Single secret key; the resolved variable keeps the *variable's* name.
    pub key: Option<String>,
    /// Secret key -> output variable name mapping.
    pub keys: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMethod {
    Read,
    Write,
}
