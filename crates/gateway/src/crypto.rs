//! Envelope encryption for stored tool credentials.
//!
//! Credentials are sealed with AES-256-GCM under a master key read
//! once at startup. The sealed form is `base64(nonce || ciphertext)`
//! with a fresh 96-bit nonce per encryption. Rotation re-wraps all
//! affected rows under the new key.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

use crate::error::GatewayError;

const NONCE_LEN: usize = 12;

/// Seals and opens credential blobs under the process master key.
pub struct CredentialSealer {
    cipher: Aes256Gcm,
}

impl CredentialSealer {
    /// Build a sealer from the hex-encoded 256-bit master key
    /// (`SECRET_STORE_MASTER_KEY`).
    pub fn from_master_key(hex_key: &str) -> Result<Self, GatewayError> {
        let bytes = hex::decode(hex_key)
            .map_err(|_| GatewayError::Sealing("master key is not hex".into()))?;
        if bytes.len() != 32 {
            return Err(GatewayError::Sealing(format!(
                "master key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&bytes)),
        })
    }

    /// Encrypt a credential value.
    pub fn seal(&self, credentials: &Value) -> Result<String, GatewayError> {
        let plaintext = serde_json::to_vec(credentials)
            .map_err(|e| GatewayError::Sealing(e.to_string()))?;
        let nonce_bytes = rand::random::<[u8; NONCE_LEN]>();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_ref())
            .map_err(|_| GatewayError::Sealing("encryption failed".into()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Decrypt a sealed credential value.
    pub fn open(&self, sealed: &str) -> Result<Value, GatewayError> {
        let bytes = STANDARD
            .decode(sealed)
            .map_err(|_| GatewayError::Sealing("sealed blob is not base64".into()))?;
        if bytes.len() < NONCE_LEN {
            return Err(GatewayError::Sealing("sealed blob too short".into()));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| GatewayError::Sealing("decryption failed".into()))?;
        serde_json::from_slice(&plaintext).map_err(|e| GatewayError::Sealing(e.to_string()))
    }
}

impl std::fmt::Debug for CredentialSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialSealer(…)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sealer() -> CredentialSealer {
        CredentialSealer::from_master_key(&"ab".repeat(32)).unwrap()
    }

    #[test]
    fn seal_open_roundtrip() {
        let sealer = sealer();
        let credentials = serde_json::json!({"apiKey": "shhh"});
        let sealed = sealer.seal(&credentials).unwrap();
        assert!(!sealed.contains("shhh"));
        assert_eq!(sealer.open(&sealed).unwrap(), credentials);
    }

    #[test]
    fn nonces_differ_between_seals() {
        let sealer = sealer();
        let credentials = serde_json::json!({"apiKey": "shhh"});
        let a = sealer.seal(&credentials).unwrap();
        let b = sealer.seal(&credentials).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let credentials = serde_json::json!({"apiKey": "shhh"});
        let sealed = sealer().seal(&credentials).unwrap();
        let other = CredentialSealer::from_master_key(&"cd".repeat(32)).unwrap();
        assert!(other.open(&sealed).is_err());
    }

    #[test]
    fn malformed_keys_are_rejected() {
        assert!(CredentialSealer::from_master_key("not-hex").is_err());
        assert!(CredentialSealer::from_master_key("abcd").is_err());
    }

    #[test]
    fn tampered_blob_fails() {
        let sealer = sealer();
        let sealed = sealer.seal(&serde_json::json!({"k": 1})).unwrap();
        let mut bytes = STANDARD.decode(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(sealer.open(&STANDARD.encode(bytes)).is_err());
    }
}
