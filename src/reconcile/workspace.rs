//! Workspace settings reconciliation.
//!
//! Brings the remote workspace in line with the configured desired state:
//! core attributes in one update call, then the SSH key assignment, which the
//! API manages through a separate relationship endpoint.

use crate::config::spec::RemoteSpec;
use crate::errors::{DriftsyncError, Result};
use crate::remote::types::{Workspace, WorkspaceUpdate};
use crate::remote::RemoteClient;
use tracing::{info, warn};

/// SSH key sentinel meaning "unassign whatever key is currently attached".
pub const SSH_KEY_UNASSIGN: &str = "-";

/// Reconcile the workspace and return its (possibly updated) state.
///
/// A missing workspace is created when auto-create is enabled, except under
/// dry-run: creation cannot be simulated, so that path fails hard rather
/// than pretending the rest of the pass would succeed.
pub async fn reconcile(
    client: &RemoteClient,
    spec: &RemoteSpec,
    dry_run: bool,
) -> Result<Workspace> {
    let name = &spec.workspace.name;

    let mut workspace = match client.read_workspace(name).await {
        Ok(workspace) => workspace,
        Err(DriftsyncError::NotFound { .. }) if spec.workspace_auto_create => {
            if dry_run {
                return Err(DriftsyncError::precondition(format!(
                    "workspace '{}' does not exist and cannot be auto-created under dry-run",
                    name
                )));
            }
            info!(workspace = %name, "workspace not found, creating it");
            client.create_workspace(name).await?
        }
        Err(error) => return Err(error),
    };

    let update = compute_update(&workspace, spec);
    if !update.is_empty() {
        if dry_run {
            warn!(workspace = %name, ?update, "[dry-run] would update workspace settings");
        } else {
            workspace = client.update_workspace(&workspace.id, &update).await?;
            info!(workspace = %name, "updated workspace settings");
        }
    }

    reconcile_ssh_key(client, &workspace, spec, dry_run).await?;

    Ok(workspace)
}

/// Diff desired against actual settings. Remote execution defaults to
/// enabled when the spec does not mention it.
fn compute_update(workspace: &Workspace, spec: &RemoteSpec) -> WorkspaceUpdate {
    let mut update = WorkspaceUpdate::default();

    let desired_operations = spec.workspace.operations.unwrap_or(true);
    if workspace.operations != desired_operations {
        update.operations = Some(desired_operations);
    }

    if let Some(auto_apply) = spec.workspace.auto_apply {
        if workspace.auto_apply != auto_apply {
            update.auto_apply = Some(auto_apply);
        }
    }

    if let Some(version) = &spec.workspace.terraform_version {
        if workspace.terraform_version.as_deref() != Some(version.as_str()) {
            update.terraform_version = Some(version.clone());
        }
    }

    if let Some(directory) = &spec.workspace.working_directory {
        if workspace.working_directory.as_deref() != Some(directory.as_str()) {
            update.working_directory = Some(directory.clone());
        }
    }

    update
}

async fn reconcile_ssh_key(
    client: &RemoteClient,
    workspace: &Workspace,
    spec: &RemoteSpec,
    dry_run: bool,
) -> Result<()> {
    let desired = match spec.workspace.ssh_key.as_deref() {
        Some(name) => name,
        None => return Ok(()),
    };

    if desired == SSH_KEY_UNASSIGN {
        if workspace.ssh_key_id.is_some() {
            if dry_run {
                warn!(workspace = %workspace.name, "[dry-run] would unassign ssh key");
                return Ok(());
            }
            client.assign_ssh_key(&workspace.id, None).await?;
            info!(workspace = %workspace.name, "unassigned ssh key");
        }
        return Ok(());
    }

    let keys = client.list_ssh_keys().await?;
    let key = keys
        .into_iter()
        .find(|key| key.name == desired)
        .ok_or_else(|| DriftsyncError::not_found("ssh key", desired))?;

    if workspace.ssh_key_id.as_deref() != Some(key.id.as_str()) {
        if dry_run {
            warn!(workspace = %workspace.name, ssh_key = %desired, "[dry-run] would assign ssh key");
            return Ok(());
        }
        client.assign_ssh_key(&workspace.id, Some(&key.id)).await?;
        info!(workspace = %workspace.name, ssh_key = %desired, "assigned ssh key");
    }

    Ok(())
}
