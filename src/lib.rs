//! # Driftsync
//!
//! Syncs secret and variable values from heterogeneous providers into a
//! remote infrastructure-automation workspace, and drives that workspace's
//! plan/apply lifecycle.
//!
//! ## Architecture
//!
//! - [`config`]: the declarative sync spec and client settings
//! - [`providers`]: env, cipher, and secret-store value sources
//! - [`resolver`]: concurrent expansion of specs into resolved variables
//! - [`expiration`]: the TTL ledger persisted in the remote variable set
//! - [`remote`]: the workspace API client
//! - [`reconcile`]: remote-variable, local-file, and workspace sinks
//! - [`run`]: the plan/approve/apply orchestration state machine
//! - [`cli`]: the command-line surface over all of the above

pub mod cli;
pub mod config;
pub mod errors;
pub mod expiration;
pub mod model;
pub mod observability;
pub mod providers;
pub mod reconcile;
pub mod remote;
pub mod resolver;
pub mod run;

pub use config::{RemoteSettings, StoreSettings, SyncSpec};
pub use errors::{DriftsyncError, Result};
pub use expiration::{ExpirationLedger, EXPIRATION_VARIABLE_KEY};
pub use model::{ResolvedVariable, SecretValue, VariableKind};
pub use remote::RemoteClient;
pub use resolver::Resolver;
pub use run::{RunOptions, RunOrchestrator, RunOutcome};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "driftsync");
    }
}
