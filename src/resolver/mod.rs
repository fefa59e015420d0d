//! Variable resolution.
//!
//! Expands configured variable specs into resolved (name, kind, value)
//! tuples by dispatching to the provider each spec names. Resolution is
//! concurrent: one task per variable, results fanned into a bounded channel
//! in completion order. The consumer stops at the first error; in-flight
//! tasks finish against a closed channel and are dropped.
//!
//! A [`Resolver`] carries per-pass duplicate state, so build a fresh one for
//! each sync pass.

pub mod dedup;

use crate::config::{ManagedVariable, StoreSource, VariableSource};
use crate::errors::{DriftsyncError, Result};
use crate::model::{ResolvedVariable, SecretValue};
use crate::providers::{env, CipherResolver, SecretStore};
use dedup::DedupLedger;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 16;

pub struct Resolver {
    cipher: CipherResolver,
    store: Option<Arc<dyn SecretStore>>,
    dedup: DedupLedger,
}

impl Resolver {
    pub fn new(cipher: CipherResolver, store: Option<Arc<dyn SecretStore>>) -> Self {
        Self { cipher, store, dedup: DedupLedger::default() }
    }

    /// Resolve one configured variable into its output values.
    ///
    /// Most sources yield exactly one value; a store source with a `keys`
    /// mapping fans out to one value per mapped output name.
    pub async fn resolve(&self, variable: &ManagedVariable) -> Result<Vec<ResolvedVariable>> {
        let values = match variable.spec.source()? {
            VariableSource::Env(source) => {
                vec![self.output(variable, variable.spec.name.clone(), env::lookup(source))]
            }
            VariableSource::Cipher(source) => {
                let plaintext = self.cipher.resolve(source).await?;
                vec![self.output(variable, variable.spec.name.clone(), plaintext)]
            }
            VariableSource::Store(source) => self.resolve_store(variable, source).await?,
        };

        for value in &values {
            self.dedup.mark(&value.name, value.kind).await?;
        }

        debug!(
            name = %variable.spec.name,
            kind = %variable.kind,
            outputs = values.len(),
            "resolved variable"
        );
        Ok(values)
    }

    /// Spawn one resolution task per variable and fan the results into a
    /// channel. Dropping the receiver cancels delivery from remaining tasks.
    pub fn stream(
        self: Arc<Self>,
        variables: Vec<ManagedVariable>,
    ) -> mpsc::Receiver<Result<ResolvedVariable>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        for variable in variables {
            let resolver = Arc::clone(&self);
            let tx = tx.clone();
            tokio::spawn(async move {
                match resolver.resolve(&variable).await {
                    Ok(values) => {
                        for value in values {
                            if tx.send(Ok(value)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(error) => {
                        let _ = tx.send(Err(error)).await;
                    }
                }
            });
        }

        rx
    }

    async fn resolve_store(
        &self,
        variable: &ManagedVariable,
        source: &StoreSource,
    ) -> Result<Vec<ResolvedVariable>> {
        let store = self.store.as_ref().ok_or_else(|| {
            DriftsyncError::config(format!(
                "variable '{}' uses the secret store but none is configured",
                variable.spec.name
            ))
        })?;

        let data = match source.method.unwrap_or(crate::config::StoreMethod::Read) {
            crate::config::StoreMethod::Read => store.read_path(&source.path).await?,
            crate::config::StoreMethod::Write => {
                let params = source.params.clone().unwrap_or_default();
                store.write_path(&source.path, &params).await?
            }
        };

        if data.is_empty() {
            return Err(DriftsyncError::not_found("secret data", &source.path));
        }

        match (&source.key, &source.keys) {
            (Some(key), None) => {
                let value = lookup_key(&data, key, &source.path)?;
                Ok(vec![self.output(variable, variable.spec.name.clone(), value)])
            }
            // keys mapping: secret key -> output variable name
            (None, Some(keys)) => {
                let mut values = Vec::with_capacity(keys.len());
                for (secret_key, output_name) in keys {
                    let value = lookup_key(&data, secret_key, &source.path)?;
                    values.push(self.output(variable, output_name.clone(), value));
                }
                Ok(values)
            }
            _ => Err(DriftsyncError::config(format!(
                "store source for '{}' must set exactly one of 'key' or 'keys'",
                variable.spec.name
            ))),
        }
    }

    fn output(&self, variable: &ManagedVariable, name: String, value: String) -> ResolvedVariable {
        ResolvedVariable {
            name,
            kind: variable.kind,
            value: SecretValue::new(value),
            sensitive: variable.spec.sensitive,
            hcl: variable.spec.hcl,
        }
    }
}

fn lookup_key(data: &HashMap<String, String>, key: &str, path: &str) -> Result<String> {
    data.get(key)
        .cloned()
        .ok_or_else(|| DriftsyncError::not_found("secret key", format!("{}:{}", path, key)))
}
