//! Resolution tokens.
//!
//! Tokens are secret-equivalent: 32 random bytes, URL-safe base64, no
//! padding. They are never logged and always compared in constant time.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// An unguessable single-record resolution token.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolutionToken(String);

impl ResolutionToken {
    /// Mint a fresh token with 256 bits of entropy.
    #[must_use]
    pub fn mint() -> Self {
        let bytes = rand::random::<[u8; 32]>();
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Constant-time equality against a presented token string.
    #[must_use]
    pub fn matches(&self, presented: &str) -> bool {
        self.0.as_bytes().ct_eq(presented.as_bytes()).into()
    }

    /// The token value, for embedding in links. Callers must not log it.
    #[must_use]
    pub fn reveal(&self) -> &str {
        &self.0
    }
}

// Tokens never appear in logs or debug dumps.
impl std::fmt::Debug for ResolutionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ResolutionToken(…)")
    }
}
