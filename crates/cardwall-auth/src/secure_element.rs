//! Device secure-element key provisioning used by the pairing flow.

use std::fmt;

use async_trait::async_trait;
use rand::RngCore;

use crate::error::SecureElementError;

/// Number of random bytes in a key alias.
pub const ALIAS_LEN: usize = 32;

/// Identifies a secure-element key entry.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SecureElementAlias([u8; ALIAS_LEN]);

impl SecureElementAlias {
    /// Generates a fresh random alias.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; ALIAS_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Creates an alias from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; ALIAS_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the alias as lowercase hex, the key store entry name.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for SecureElementAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureElementAlias({}…)", &self.to_hex()[..8])
    }
}

impl fmt::Display for SecureElementAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A freshly generated device-bound signing key.
#[derive(Debug, Clone)]
pub struct SecureElementKey {
    /// Alias of the key store entry.
    pub alias: SecureElementAlias,
    /// DER-encoded `SubjectPublicKeyInfo` of the key.
    pub public_key: Vec<u8>,
}

/// Hardware-backed key store.
#[async_trait]
pub trait SecureElement: Send + Sync {
    /// Generates a biometric-gated P-256 signing key under `alias`.
    async fn generate_key(
        &self,
        alias: &SecureElementAlias,
    ) -> Result<SecureElementKey, SecureElementError>;

    /// Removes the key stored under `alias`.
    async fn delete_key(&self, alias: &SecureElementAlias) -> Result<(), SecureElementError>;
}
