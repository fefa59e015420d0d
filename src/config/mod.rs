//! # Configuration Management
//!
//! Two layers of configuration:
//!
//! - [`settings`]: client settings (remote API address/token, secret store
//!   address/token) resolved from the sync spec with environment fallbacks.
//! - [`spec`]: the declarative sync specification: managed variables, their
//!   providers, defaults, and the desired workspace state.

pub mod settings;
pub mod spec;

pub use settings::{RemoteSettings, StoreSettings};
pub use spec::{
    Defaults, EnvSource, ManagedVariable, StoreMethod, StoreSource, SyncSpec, VariableDefaults,
    VariableSource, VariableSpec, WorkspaceSpec,
};
