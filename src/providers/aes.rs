//! AES-256-GCM cipher engine.
//!
//! Payloads are base64 of `nonce || ciphertext || tag` with a random 12-byte
//! nonce per sealing. The key is hex-encoded, 32 bytes once decoded.

use crate::errors::{DriftsyncError, Result};
use crate::providers::cipher::CipherEngine;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// Single-use nonce sequence for AES-GCM.
struct SingleNonce {
    nonce: Option<[u8; NONCE_SIZE]>,
}

impl SingleNonce {
    fn new(nonce_bytes: [u8; NONCE_SIZE]) -> Self {
        Self { nonce: Some(nonce_bytes) }
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.nonce.take().map(Nonce::assume_unique_for_key).ok_or(ring::error::Unspecified)
    }
}

pub struct AesEngine {
    key_bytes: Zeroizing<[u8; 32]>,
    rng: SystemRandom,
}

impl AesEngine {
    /// Build an engine from a hex-encoded 256-bit key.
    pub fn from_hex_key(key: &str) -> Result<Self> {
        let decoded = hex::decode(key.trim())
            .map_err(|e| DriftsyncError::config(format!("invalid hex in aes cipher key: {}", e)))?;

        if decoded.len() != 32 {
            return Err(DriftsyncError::config(format!(
                "aes cipher key must be 32 bytes (256 bits), got {} bytes",
                decoded.len()
            )));
        }

        let mut key_bytes = Zeroizing::new([0u8; 32]);
        key_bytes.copy_from_slice(&decoded);
        Ok(Self { key_bytes, rng: SystemRandom::new() })
    }

    /// Encrypt a plaintext into a payload suitable for a ciphertext token.
    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.rng.fill(&mut nonce_bytes).map_err(|_| {
            DriftsyncError::provider("cipher", "failed to generate random nonce")
        })?;

        let unbound_key = UnboundKey::new(&AES_256_GCM, &*self.key_bytes)
            .map_err(|_| DriftsyncError::provider("cipher", "failed to create sealing key"))?;
        let mut sealing_key = aead::SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

        let mut ciphertext = plaintext.as_bytes().to_vec();
        sealing_key
            .seal_in_place_append_tag(Aad::empty(), &mut ciphertext)
            .map_err(|_| DriftsyncError::provider("cipher", "encryption failed"))?;

        let mut payload = nonce_bytes.to_vec();
        payload.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(payload))
    }

    fn open(&self, payload: &str) -> Result<String> {
        let raw = BASE64
            .decode(payload.trim())
            .map_err(|e| DriftsyncError::provider("cipher", format!("invalid base64 payload: {}", e)))?;

        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(DriftsyncError::provider(
                "cipher",
                "payload too short for nonce and authentication tag",
            ));
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(&raw[..NONCE_SIZE]);

        let unbound_key = UnboundKey::new(&AES_256_GCM, &*self.key_bytes)
            .map_err(|_| DriftsyncError::provider("cipher", "failed to create opening key"))?;
        let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(nonce_bytes));

        let mut in_out = raw[NONCE_SIZE..].to_vec();
        let plaintext = opening_key
            .open_in_place(Aad::empty(), &mut in_out)
            .map_err(|_| DriftsyncError::provider("cipher", "authentication failed, wrong key or tampered payload"))?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|_| DriftsyncError::provider("cipher", "decrypted payload is not valid utf-8"))
    }
}

#[async_trait]
impl CipherEngine for AesEngine {
    async fn decrypt(&self, payload: &str) -> Result<String> {
        self.open(payload)
    }
}

impl std::fmt::Debug for AesEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesEngine").field("key_bytes", &"[REDACTED]").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "4242424242424242424242424242424242424242424242424242424242424242";

    fn engine() -> AesEngine {
        AesEngine::from_hex_key(TEST_KEY).unwrap()
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let engine = engine();
        let payload = engine.seal("my-secret-value").unwrap();
        assert_eq!(engine.open(&payload).unwrap(), "my-secret-value");
    }

    #[test]
    fn test_different_nonces_produce_different_payloads() {
        let engine = engine();
        let a = engine.seal("same").unwrap();
        let b = engine.seal("same").unwrap();
        assert_ne!(a, b);
        assert_eq!(engine.open(&a).unwrap(), "same");
        assert_eq!(engine.open(&b).unwrap(), "same");
    }

    #[test]
    fn test_tampered_payload_fails() {
        let engine = engine();
        let payload = engine.seal("sensitive").unwrap();
        let mut raw = BASE64.decode(&payload).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        assert!(engine.open(&BASE64.encode(raw)).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let payload = engine().seal("sensitive").unwrap();
        let other = AesEngine::from_hex_key(
            "0000000000000000000000000000000000000000000000000000000000000000",
        )
        .unwrap();
        assert!(other.open(&payload).is_err());
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(AesEngine::from_hex_key("42424242").is_err());
    }

    #[test]
    fn test_invalid_hex_key() {
        assert!(AesEngine::from_hex_key("not-hex").is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", engine());
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("42"));
    }

    #[test]
    fn test_short_payload_fails() {
        let engine = engine();
        assert!(engine.open(&BASE64.encode([0u8; 8])).is_err());
    }
}
