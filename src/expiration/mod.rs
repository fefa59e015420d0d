//! TTL expiration ledger.
//!
//! The ledger is persisted as a JSON document inside a reserved remote
//! variable, keyed by variable kind then name. Each entry records the TTL it
//! was written with and the absolute expiry instant, so a TTL change in the
//! configuration forces a refresh even before the old entry expires.
//!
//! An unparseable ledger is fatal rather than silently reset: resetting it
//! would refresh every tracked secret at once.

use crate::errors::{DriftsyncError, Result};
use crate::model::VariableKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Name of the reserved remote variable holding the serialized ledger.
pub const EXPIRATION_VARIABLE_KEY: &str = "__DRIFTSYNC_VARIABLE_EXPIRATIONS";

/// One tracked variable: the TTL it was last written with and when it lapses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationEntry {
    /// TTL in seconds at the time of the last refresh.
    pub ttl: u64,
    pub expire_at: DateTime<Utc>,
}

type Entries = BTreeMap<VariableKind, BTreeMap<String, ExpirationEntry>>;

/// Expiration state for all tracked variables, plus the remote id of the
/// variable it was loaded from (absent on first sync).
#[derive(Debug, Default)]
pub struct ExpirationLedger {
    entries: Entries,
    pub remote_id: Option<String>,
}

impl ExpirationLedger {
    /// Parse a ledger from its serialized remote value.
    pub fn parse(raw: &str) -> Result<Self> {
        let entries: Entries = serde_json::from_str(raw).map_err(|e| {
            DriftsyncError::corrupt_state(format!("unparseable expiration ledger: {}", e))
        })?;
        Ok(Self { entries, remote_id: None })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.entries)
            .map_err(|e| DriftsyncError::serialization(e, "expiration ledger"))
    }

    /// Whether a variable needs refreshing now.
    ///
    /// True when it has no effective TTL (untracked variables always
    /// refresh), has no ledger entry yet, was last written with a different
    /// TTL, or has lapsed.
    pub fn should_refresh(
        &self,
        kind: VariableKind,
        name: &str,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> bool {
        let ttl = match ttl {
            Some(ttl) => ttl,
            None => return true,
        };

        match self.entries.get(&kind).and_then(|names| names.get(name)) {
            Some(entry) => entry.ttl != ttl.as_secs() || entry.expire_at <= now,
            None => true,
        }
    }

    /// Record a refresh of one variable. Tracked variables get a fresh entry;
    /// variables without a TTL lose any stale entry. Returns whether the
    /// ledger actually changed.
    pub fn record(
        &mut self,
        kind: VariableKind,
        name: &str,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> bool {
        match ttl {
            Some(ttl) => {
                let entry = ExpirationEntry {
                    ttl: ttl.as_secs(),
                    expire_at: now
                        + chrono::Duration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
                };
                let previous = self.entries.entry(kind).or_default().insert(name.to_string(), entry.clone());
                previous.as_ref() != Some(&entry)
            }
            None => {
                let removed = self
                    .entries
                    .get_mut(&kind)
                    .map(|names| names.remove(name).is_some())
                    .unwrap_or(false);
                if removed {
                    self.entries.retain(|_, names| !names.is_empty());
                }
                removed
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|names| names.is_empty())
    }
}
