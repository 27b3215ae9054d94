//! Collision-resistant session identifiers.
//!
//! The identifier namespaces all ephemeral filesystem state for one
//! elevation request and doubles as a guard against removing the wrong
//! temp directory. It is derived from a SHA-256 digest over a fixed domain
//! tag, the prompt name, the command text, and 256 bytes of OS randomness,
//! truncated to the final 32 hex characters. The randomness dominates, so
//! identical name/command pairs still yield pairwise-distinct identifiers.

use std::fmt;

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{ElevationError, ElevationResult};

/// Domain separation tag mixed into every identifier digest.
const DOMAIN_TAG: &str = "elevate-session-1";

/// Number of random bytes mixed into each identifier.
const RANDOM_LEN: usize = 256;

/// Exact length of a session identifier in hex characters.
pub const SESSION_ID_LEN: usize = 32;

/// A 32-hex-character session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh identifier for the given name and command.
    ///
    /// Must be called exactly once per session; identifiers are never
    /// reused across sessions.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::Internal`] if the digest does not yield
    /// exactly 32 hex characters. This is critical to ensure the wrong
    /// temp directory is never created or removed, even though the check
    /// should be unreachable.
    pub fn generate(name: &str, command: &str) -> ElevationResult<Self> {
        let mut random = [0u8; RANDOM_LEN];
        rand::rngs::OsRng.fill_bytes(&mut random);
        Self::derive(name, command, &random)
    }

    fn derive(name: &str, command: &str, random: &[u8; RANDOM_LEN]) -> ElevationResult<Self> {
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN_TAG.as_bytes());
        hasher.update(name.as_bytes());
        hasher.update(command.as_bytes());
        hasher.update(random);
        let digest = hex::encode(hasher.finalize().as_slice());

        let id = digest[digest.len() - SESSION_ID_LEN..].to_string();
        if id.len() != SESSION_ID_LEN || !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ElevationError::internal(
                "session identifier is not 32 hex characters",
            ));
        }
        Ok(Self(id))
    }

    /// Identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Utility module for hex encoding.
mod hex {
    use std::fmt::Write;

    /// Encodes bytes as a lowercase hex string.
    pub fn encode(bytes: &[u8]) -> String {
        bytes
            .iter()
            .fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            })
    }
}
