//! Reconciliation sinks.
//!
//! Resolved variables flow into one of two sinks: the remote workspace
//! ([`variables`]) or local dotfiles ([`local`]). [`workspace`] reconciles
//! the workspace's own settings before any variables are touched.

pub mod local;
pub mod variables;
pub mod workspace;
