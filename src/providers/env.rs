//! Environment provider: pure process-environment lookup.

use crate::config::EnvSource;

/// Look up the configured environment variable.
///
/// An absent variable yields an empty string, not an error; the empty value
/// is synced as-is.
pub fn lookup(source: &EnvSource) -> String {
    std::env::var(&source.variable).unwrap_or_default()
}
