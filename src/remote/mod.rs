//! Remote workspace API surface.
//!
//! [`client::RemoteClient`] wraps the HTTP transport; [`types`] holds the
//! flattened domain view of workspaces, variables, runs, plans, and applies.

pub mod client;
pub mod types;

pub use client::RemoteClient;
pub use types::{
    ApplyInfo, ApplyStatus, Category, ConfigurationVersion, Plan, PlanStatus,
    RemoteVariableIndex, Run, SshKey, Variable, VariableAttributes, Workspace, WorkspaceUpdate,
};
