//! Core domain types shared across the resolution pipeline.
//!
//! A [`ResolvedVariable`] is produced once per successful provider resolution,
//! owned exclusively by the pipeline stage processing it, and discarded after
//! being written to its sink. Its value is held in a [`SecretValue`] that
//! redacts itself in Debug/Display/serialization and zeroes its memory on
//! drop, so plaintext never leaks through logs or error messages.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Classification of a managed variable.
///
/// `Terraform` variables live in the remote execution tool's own namespace;
/// `Environment` variables live in the surrounding process environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    Terraform,
    Environment,
}

impl VariableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terraform => "terraform",
            Self::Environment => "environment",
        }
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A variable value resolved from a provider, ready to be written to a sink.
#[derive(Debug, Clone)]
pub struct ResolvedVariable {
    pub name: String,
    pub kind: VariableKind,
    pub value: SecretValue,
    /// Per-variable sensitivity override; defaults cascade at sink time.
    pub sensitive: Option<bool>,
    /// Render the value as a bare HCL expression instead of a quoted string.
    pub hcl: Option<bool>,
}

/// A string wrapper that redacts its contents in Debug, Display, and
/// serialization, and securely zeroes its memory when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Exposes the underlying plaintext. Never log or print the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A masked preview safe for dry-run logs: first and last character with
    /// the middle blanked, or a fixed mask for very short values.
    pub fn masked(&self) -> String {
        if self.0.chars().count() < 4 {
            return "**********".to_string();
        }
        let first = self.0.chars().next().unwrap_or('*');
        let last = self.0.chars().last().unwrap_or('*');
        format!("{}********{}", first, last)
    }
}

impl Serialize for SecretValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Never serialize the actual value; sinks call expose() explicitly.
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(SecretValue(value))
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretValue([REDACTED])")
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for SecretValue {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretValue {}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretValue {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
