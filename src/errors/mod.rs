//! # Error Handling
//!
//! Crate-wide error taxonomy for driftsync, built on `thiserror`.

pub mod types;

pub use types::{DriftsyncError, Result};
