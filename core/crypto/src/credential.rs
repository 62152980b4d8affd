//! One-way hashing and verification of passwords and PINs.

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::kdf::{derive_key, KdfParams};
use crate::keys::{Salt, KEY_LENGTH};
use strongroom_common::{Error, Result};

/// Stored form of a hashed secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialHash {
    pub salt: Salt,
    pub digest: [u8; KEY_LENGTH],
    pub params: KdfParams,
}

impl CredentialHash {
    /// Encode for storage.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decode a stored hash.
    pub fn decode(encoded: &str) -> Result<Self> {
        serde_json::from_str(encoded).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Hashes and verifies secrets with salted Argon2id.
#[derive(Debug, Clone)]
pub struct CredentialVerifier {
    params: KdfParams,
}

impl CredentialVerifier {
    /// Create a verifier that hashes new secrets with `params`.
    pub fn new(params: KdfParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Hash a secret with a fresh salt and return its storage encoding.
    pub fn hash(&self, secret: &[u8]) -> Result<String> {
        let salt = Salt::generate();
        let digest = derive_key(secret, salt.as_bytes(), &self.params)?;

        CredentialHash {
            salt,
            digest: *digest.as_bytes(),
            params: self.params,
        }
        .encode()
    }

    /// Check `candidate` against a stored hash in constant time.
    ///
    /// Verification uses the parameters recorded in the hash, not the
    /// verifier's current ones.
    ///
    /// # Errors
    /// - Serialization error if `stored` is not a valid encoding
    pub fn verify(&self, candidate: &[u8], stored: &str) -> Result<bool> {
        let stored = CredentialHash::decode(stored)?;
        stored.params.validate()?;

        if candidate.is_empty() {
            return Ok(false);
        }

        let derived = derive_key(candidate, stored.salt.as_bytes(), &stored.params)?;
        Ok(derived.as_bytes().ct_eq(&stored.digest).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::test_params;

    fn verifier() -> CredentialVerifier {
        CredentialVerifier::new(test_params()).unwrap()
    }

    #[test]
    fn test_verify_password() {
        let verifier = verifier();
        let stored = verifier.hash(b"secure-password").unwrap();

        assert!(verifier.verify(b"secure-password", &stored).unwrap());
        assert!(!verifier.verify(b"wrong-password", &stored).unwrap());
        assert!(!verifier.verify(b"", &stored).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let verifier = verifier();
        let a = verifier.hash(b"1234").unwrap();
        let b = verifier.hash(b"1234").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_does_not_contain_secret() {
        let stored = verifier().hash(b"plaintext-pin-9876").unwrap();
        assert!(!stored.contains("plaintext-pin-9876"));
    }

    #[test]
    fn test_verify_uses_stored_params() {
        let stored = verifier().hash(b"pin").unwrap();

        let mut other = test_params();
        other.time_cost = 2;
        let newer = CredentialVerifier::new(other).unwrap();
        assert!(newer.verify(b"pin", &stored).unwrap());
    }

    #[test]
    fn test_corrupt_hash_is_error() {
        assert!(matches!(
            verifier().verify(b"pin", "not-json"),
            Err(Error::Serialization(_))
        ));
    }
}
