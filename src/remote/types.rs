//! Domain types for the remote workspace API.
//!
//! Wire payloads are JSON:API documents with kebab-case attribute names;
//! deserialization of the envelope lives in the client. These types are the
//! flattened view the rest of the engine works with.

use crate::model::VariableKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Remote variable category. Mirrors [`VariableKind`] on the wire, where the
/// environment kind is abbreviated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Terraform,
    Env,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terraform => "terraform",
            Self::Env => "env",
        }
    }
}

impl From<VariableKind> for Category {
    fn from(kind: VariableKind) -> Self {
        match kind {
            VariableKind::Terraform => Self::Terraform,
            VariableKind::Environment => Self::Env,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Remote variables indexed by category, then name.
pub type RemoteVariableIndex = HashMap<Category, HashMap<String, Variable>>;

#[derive(Debug, Clone)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub auto_apply: bool,
    pub operations: bool,
    pub terraform_version: Option<String>,
    pub working_directory: Option<String>,
    pub locked: bool,
    pub current_run_id: Option<String>,
    pub ssh_key_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub id: String,
    pub key: String,
    /// Absent for sensitive variables, which the API writes but never reads
    /// back.
    pub value: Option<String>,
    pub category: Category,
    pub sensitive: bool,
    pub hcl: bool,
}

/// Attributes sent when creating or updating a variable.
#[derive(Debug, Clone, Serialize)]
pub struct VariableAttributes {
    pub key: String,
    pub value: String,
    pub category: Category,
    pub sensitive: bool,
    pub hcl: bool,
}

/// Partial workspace update; absent fields are left untouched remotely.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkspaceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operations: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_apply: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terraform_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
}

impl WorkspaceUpdate {
    pub fn is_empty(&self) -> bool {
        self.operations.is_none()
            && self.auto_apply.is_none()
            && self.terraform_version.is_none()
            && self.working_directory.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ConfigurationVersion {
    pub id: String,
    pub upload_url: String,
}

#[derive(Debug, Clone)]
pub struct Run {
    pub id: String,
    pub status: String,
    pub plan_id: Option<String>,
    pub apply_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub id: String,
    pub status: PlanStatus,
    pub has_changes: bool,
    pub log_read_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApplyInfo {
    pub id: String,
    pub status: ApplyStatus,
    pub log_read_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SshKey {
    pub id: String,
    pub name: String,
}

/// Plan lifecycle states. Unrecognized values map to [`PlanStatus::Unknown`]
/// and keep the poll loop alive instead of failing the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    ManagedQueued,
    Queued,
    Running,
    Errored,
    Canceled,
    Finished,
    Unreachable,
    #[serde(other)]
    Unknown,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ManagedQueued => "managed_queued",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Errored => "errored",
            Self::Canceled => "canceled",
            Self::Finished => "finished",
            Self::Unreachable => "unreachable",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Apply lifecycle states, same conventions as [`PlanStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStatus {
    Pending,
    ManagedQueued,
    Queued,
    Running,
    Errored,
    Canceled,
    Finished,
    Unreachable,
    #[serde(other)]
    Unknown,
}

impl ApplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ManagedQueued => "managed_queued",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Errored => "errored",
            Self::Canceled => "canceled",
            Self::Finished => "finished",
            Self::Unreachable => "unreachable",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ApplyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_kind() {
        assert_eq!(Category::from(VariableKind::Terraform), Category::Terraform);
        assert_eq!(Category::from(VariableKind::Environment), Category::Env);
    }

    #[test]
    fn test_unknown_plan_status_deserializes() {
        let status: PlanStatus = serde_json::from_str("\"cost_estimating\"").unwrap();
        assert_eq!(status, PlanStatus::Unknown);
    }

    #[test]
    fn test_plan_status_display_matches_wire_form() {
        assert_eq!(PlanStatus::ManagedQueued.to_string(), "managed_queued");
        assert_eq!(ApplyStatus::Finished.to_string(), "finished");
    }

    #[test]
    fn test_workspace_update_skips_absent_fields() {
        let update = WorkspaceUpdate { operations: Some(true), ..Default::default() };
        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(json, "{\"operations\":true}");
    }
}
