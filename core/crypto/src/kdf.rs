//! Key derivation using Argon2id.
//!
//! Argon2id is a memory-hard password hashing function that provides
//! resistance to both GPU and time-memory trade-off attacks.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

use crate::keys::{RecordKey, KEY_LENGTH};
use strongroom_common::{Error, Result};

/// Largest memory cost accepted from stored records (1 GiB).
pub const MAX_MEMORY_COST: u32 = 1 << 20;

/// Largest iteration count accepted from stored records.
pub const MAX_TIME_COST: u32 = 16;

/// Largest parallelism accepted from stored records.
pub const MAX_PARALLELISM: u32 = 16;

/// Parameters for Argon2id key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (e.g., 65536 = 64 MiB).
    pub memory_cost: u32,
    /// Number of iterations.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl KdfParams {
    /// Create parameters suitable for interactive use.
    ///
    /// These parameters provide a balance between security and usability,
    /// targeting approximately 0.5-1 second of derivation time.
    pub fn interactive() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }

    /// Create parameters suitable for sensitive data.
    ///
    /// Higher security parameters that may take several seconds.
    pub fn sensitive() -> Self {
        Self {
            memory_cost: 262144, // 256 MiB
            time_cost: 4,
            parallelism: 4,
        }
    }

    /// Create moderate parameters for constrained hosts.
    pub fn moderate() -> Self {
        Self {
            memory_cost: 32768, // 32 MiB
            time_cost: 3,
            parallelism: 2,
        }
    }

    /// Reject parameters outside the accepted bounds.
    ///
    /// Bounds keep a corrupted or hostile record from forcing an
    /// arbitrarily expensive derivation.
    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 || self.parallelism > MAX_PARALLELISM {
            return Err(Error::Validation(format!(
                "parallelism must be in 1..={}",
                MAX_PARALLELISM
            )));
        }
        if self.time_cost == 0 || self.time_cost > MAX_TIME_COST {
            return Err(Error::Validation(format!(
                "time_cost must be in 1..={}",
                MAX_TIME_COST
            )));
        }
        if self.memory_cost < 8 * self.parallelism || self.memory_cost > MAX_MEMORY_COST {
            return Err(Error::Validation(format!(
                "memory_cost must be in {}..={}",
                8 * self.parallelism,
                MAX_MEMORY_COST
            )));
        }
        Ok(())
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Derive a record key from a password and salt using Argon2id.
///
/// # Preconditions
/// - `password` must not be empty
/// - `salt` must be at least 8 bytes
///
/// # Postconditions
/// - The derived key is deterministic given the same inputs
///
/// # Errors
/// - Returns a validation error if password is empty
/// - Returns a crypto error if Argon2id rejects the parameters or salt
///
/// # Security
/// - Password is not stored or logged
pub fn derive_key(password: &[u8], salt: &[u8], params: &KdfParams) -> Result<RecordKey> {
    if password.is_empty() {
        return Err(Error::Validation("Password cannot be empty".to_string()));
    }

    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(KEY_LENGTH),
    )
    .map_err(|e| Error::Crypto(format!("Invalid KDF parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key_bytes = [0u8; KEY_LENGTH];
    argon2
        .hash_password_into(password, salt, &mut key_bytes)
        .map_err(|e| Error::Crypto(format!("Key derivation failed: {}", e)))?;

    Ok(RecordKey::from_bytes(key_bytes))
}

#[cfg(test)]
pub(crate) fn test_params() -> KdfParams {
    KdfParams {
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_deterministic() {
        let salt = [42u8; 32];
        let params = test_params();

        let key1 = derive_key(b"test-password-123", &salt, &params).unwrap();
        let key2 = derive_key(b"test-password-123", &salt, &params).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_salt() {
        let params = test_params();

        let key1 = derive_key(b"test-password-123", &[1u8; 32], &params).unwrap();
        let key2 = derive_key(b"test-password-123", &[2u8; 32], &params).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_password() {
        let salt = [42u8; 24];
        let params = test_params();

        let key1 = derive_key(b"password1", &salt, &params).unwrap();
        let key2 = derive_key(b"password2", &salt, &params).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_empty_password_fails() {
        assert!(matches!(
            derive_key(b"", &[0u8; 32], &test_params()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_short_salt_fails() {
        assert!(matches!(
            derive_key(b"pw", &[0u8; 4], &test_params()),
            Err(Error::Crypto(_))
        ));
    }

    #[test]
    fn test_presets_validate() {
        assert!(KdfParams::interactive().validate().is_ok());
        assert!(KdfParams::moderate().validate().is_ok());
        assert!(KdfParams::sensitive().validate().is_ok());
        assert!(test_params().validate().is_ok());
    }

    #[test]
    fn test_out_of_bounds_params_rejected() {
        let mut params = test_params();
        params.memory_cost = MAX_MEMORY_COST + 1;
        assert!(params.validate().is_err());

        let mut params = test_params();
        params.parallelism = 0;
        assert!(params.validate().is_err());
    }
}
