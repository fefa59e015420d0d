//! Secret provider adapters.
//!
//! Three polymorphic providers feed the variable resolver:
//!
//! - [`env`]: pure process-environment lookup (absent variables yield an
//!   empty string, not an error).
//! - [`cipher`]: token-delimited ciphertext decryption through a pluggable
//!   [`cipher::CipherEngine`]; AES-256-GCM ([`aes`]) and transit-key
//!   ([`transit`]) engines are built in.
//! - [`store`]: path/key-based secret store lookups over its HTTP contract.
//!
//! Selection between them is driven by the tagged source on each
//! [`crate::config::VariableSpec`], never by runtime type inspection.

pub mod aes;
pub mod cipher;
pub mod env;
pub mod store;
pub mod transit;

pub use cipher::{CipherEngine, CipherEngineType, CipherResolver, CipherSource};
pub use store::{HttpSecretStore, SecretStore};
