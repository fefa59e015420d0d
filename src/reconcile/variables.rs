//! Remote variable synchronization.
//!
//! One sync pass lists the remote variables (extracting the expiration
//! ledger), filters the configured set down to what actually needs
//! refreshing, resolves those concurrently, writes each resolved value as it
//! arrives, persists the updated ledger, and optionally purges unmanaged
//! variables.
//!
//! Purge exemption is computed from the full configured set, not just the
//! refreshed subset, so a pass that skips everything on TTL grounds deletes
//! nothing.

use crate::config::{SyncSpec, VariableDefaults};
use crate::errors::Result;
use crate::expiration::{ExpirationLedger, EXPIRATION_VARIABLE_KEY};
use crate::model::{ResolvedVariable, VariableKind};
use crate::remote::types::{Category, RemoteVariableIndex, VariableAttributes, Workspace};
use crate::remote::RemoteClient;
use crate::resolver::Resolver;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Options for one remote sync pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Log intended mutations instead of performing them.
    pub dry_run: bool,
    /// Refresh every variable, ignoring live TTL entries.
    pub force_update: bool,
}

/// Run one full sync pass against the remote workspace.
pub async fn sync_remote(
    client: &RemoteClient,
    workspace: &Workspace,
    spec: &SyncSpec,
    resolver: Arc<Resolver>,
    options: SyncOptions,
) -> Result<()> {
    let (index, mut ledger) = load_remote_state(client, workspace).await?;
    let defaults = spec.variable_defaults();
    let all = spec.variables();
    let now = Utc::now();

    let mut to_resolve = Vec::new();
    let mut refreshed: Vec<(VariableKind, String, Option<Duration>)> = Vec::new();
    for variable in all.iter() {
        let ttl = variable.spec.effective_ttl(&defaults);
        if options.force_update
            || ledger.should_refresh(variable.kind, &variable.spec.name, ttl, now)
        {
            refreshed.push((variable.kind, variable.spec.name.clone(), ttl));
            to_resolve.push(variable.clone());
        } else {
            debug!(
                name = %variable.spec.name,
                kind = %variable.kind,
                "ttl has not lapsed, skipping refresh"
            );
        }
    }

    let mut rx = resolver.stream(to_resolve);
    while let Some(item) = rx.recv().await {
        let variable = item?;
        set_variable(client, workspace, &index, variable, &defaults, options.dry_run).await?;
    }

    let mut ledger_changed = false;
    for (kind, name, ttl) in refreshed {
        ledger_changed |= ledger.record(kind, &name, ttl, now);
    }
    if ledger_changed {
        if options.dry_run {
            warn!("[dry-run] would persist updated expiration ledger");
        } else {
            write_ledger(client, workspace, &ledger).await?;
        }
    }

    if spec.remote.purge_unmanaged_variables {
        purge_unmanaged(client, workspace, spec, &index, options.dry_run).await?;
    }

    Ok(())
}

/// List all remote variables, splitting off the reserved expiration ledger
/// variable from the regular index.
pub async fn load_remote_state(
    client: &RemoteClient,
    workspace: &Workspace,
) -> Result<(RemoteVariableIndex, ExpirationLedger)> {
    let mut index: RemoteVariableIndex = HashMap::new();
    let mut ledger = ExpirationLedger::default();

    for variable in client.list_variables(&workspace.id).await? {
        if variable.key == EXPIRATION_VARIABLE_KEY {
            let raw = variable.value.as_deref().unwrap_or("{}");
            ledger = ExpirationLedger::parse(raw)?;
            ledger.remote_id = Some(variable.id);
        } else {
            index.entry(variable.category).or_default().insert(variable.key.clone(), variable);
        }
    }

    Ok((index, ledger))
}

/// Write one resolved variable to the remote, updating in place when it
/// already exists. An update failure (immutable attribute change, e.g.
/// flipping sensitivity off) falls back to delete and recreate.
async fn set_variable(
    client: &RemoteClient,
    workspace: &Workspace,
    index: &RemoteVariableIndex,
    variable: ResolvedVariable,
    defaults: &VariableDefaults,
    dry_run: bool,
) -> Result<()> {
    let sensitive = variable.sensitive.or(defaults.sensitive).unwrap_or(true);
    let hcl = variable.hcl.or(defaults.hcl).unwrap_or(false);
    let category = Category::from(variable.kind);
    let existing = index.get(&category).and_then(|names| names.get(&variable.name));

    if dry_run {
        warn!(
            name = %variable.name,
            kind = %variable.kind,
            value = %variable.value.masked(),
            sensitive,
            hcl,
            "[dry-run] would {} variable",
            if existing.is_some() { "update" } else { "create" }
        );
        return Ok(());
    }

    let attributes = VariableAttributes {
        key: variable.name.clone(),
        value: variable.value.expose().to_string(),
        category,
        sensitive,
        hcl,
    };

    match existing {
        Some(existing) => {
            match client.update_variable(&workspace.id, &existing.id, &attributes).await {
                Ok(_) => {
                    info!(name = %variable.name, kind = %variable.kind, "updated variable");
                }
                Err(error) => {
                    debug!(
                        name = %variable.name,
                        error = %error,
                        "update rejected, recreating variable"
                    );
                    client.delete_variable(&workspace.id, &existing.id).await?;
                    client.create_variable(&workspace.id, &attributes).await?;
                    info!(name = %variable.name, kind = %variable.kind, "recreated variable");
                }
            }
        }
        None => {
            client.create_variable(&workspace.id, &attributes).await?;
            info!(name = %variable.name, kind = %variable.kind, "created variable");
        }
    }

    Ok(())
}

/// Persist the ledger into its reserved remote variable. The ledger variable
/// is plain (non-sensitive, env category) so it can be read back next pass.
async fn write_ledger(
    client: &RemoteClient,
    workspace: &Workspace,
    ledger: &ExpirationLedger,
) -> Result<()> {
    let attributes = VariableAttributes {
        key: EXPIRATION_VARIABLE_KEY.to_string(),
        value: ledger.to_json()?,
        category: Category::Env,
        sensitive: false,
        hcl: false,
    };

    match &ledger.remote_id {
        Some(id) => {
            client.update_variable(&workspace.id, id, &attributes).await?;
        }
        None => {
            client.create_variable(&workspace.id, &attributes).await?;
        }
    }
    debug!("persisted expiration ledger");
    Ok(())
}

/// Delete remote variables not contributed by any configured variable.
async fn purge_unmanaged(
    client: &RemoteClient,
    workspace: &Workspace,
    spec: &SyncSpec,
    index: &RemoteVariableIndex,
    dry_run: bool,
) -> Result<()> {
    let mut managed: HashSet<(Category, String)> = HashSet::new();
    for variable in spec.variables() {
        let category = Category::from(variable.kind);
        for name in variable.spec.output_names() {
            managed.insert((category, name));
        }
    }

    for (category, names) in index {
        for (name, variable) in names {
            if managed.contains(&(*category, name.clone())) {
                continue;
            }
            if dry_run {
                warn!(name = %name, category = %category, "[dry-run] would purge variable");
                continue;
            }
            client.delete_variable(&workspace.id, &variable.id).await?;
            info!(name = %name, category = %category, "purged unmanaged variable");
        }
    }

    Ok(())
}
