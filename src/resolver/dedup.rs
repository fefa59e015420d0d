//! Duplicate detection across one resolution pass.

use crate::errors::{DriftsyncError, Result};
use crate::model::VariableKind;
use std::collections::HashSet;
use tokio::sync::Mutex;

/// Tracks every (name, kind) pair produced during a pass. Two variables of
/// different kinds may share a name; the same pair twice is fatal, since the
/// later write would silently clobber the earlier one.
#[derive(Debug, Default)]
pub struct DedupLedger {
    seen: Mutex<HashSet<(String, VariableKind)>>,
}

impl DedupLedger {
    /// Record a resolved (name, kind) pair, failing if it was seen before.
    pub async fn mark(&self, name: &str, kind: VariableKind) -> Result<()> {
        let mut seen = self.seen.lock().await;
        if !seen.insert((name.to_string(), kind)) {
            return Err(DriftsyncError::duplicate(name, kind));
        }
        Ok(())
    }
}
