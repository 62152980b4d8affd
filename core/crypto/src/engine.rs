//! Password-based encryption of file payloads.
//!
//! Two record formats are understood:
//!
//! - **Modern**: the caller stores `iv` next to the ciphertext. The iv is
//!   `nonce (24) || memory_cost (u32 LE) || time_cost (u32 LE) ||
//!   parallelism (u32 LE)`. The nonce doubles as the Argon2id salt, so
//!   every record gets its own key.
//! - **Legacy**: no iv was stored. The ciphertext is `nonce || data || tag`
//!   and the key is derived with a salt computed from the password alone.
//!
//! The engine holds no state besides its parameters and is safe to clone
//! into worker threads.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use crate::aead::{self, NONCE_SIZE};
use crate::kdf::{derive_key, KdfParams};
use crate::keys::random_bytes;
use strongroom_common::{Error, Result};

/// Length of a modern-format iv.
pub const IV_LENGTH: usize = NONCE_SIZE + 12;

const LEGACY_SALT_CONTEXT: &[u8] = b"strongroom.legacy.v1";

/// Output of [`EncryptionEngine::encrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
}

/// Symmetric encrypt/decrypt keyed by a password.
#[derive(Debug, Clone)]
pub struct EncryptionEngine {
    params: KdfParams,
    legacy_params: KdfParams,
}

impl EncryptionEngine {
    /// Create an engine that derives new keys with `params`.
    ///
    /// # Errors
    /// - Returns a validation error if `params` are out of bounds
    pub fn new(params: KdfParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            legacy_params: KdfParams::moderate(),
        })
    }

    /// Override the parameters legacy records were written with.
    pub fn with_legacy_params(mut self, legacy_params: KdfParams) -> Result<Self> {
        legacy_params.validate()?;
        self.legacy_params = legacy_params;
        Ok(self)
    }

    /// Parameters used for new records.
    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    /// Encrypt `plaintext` under a key derived from `password`.
    ///
    /// # Errors
    /// - Validation error for an empty password
    /// - Crypto error if derivation fails
    pub fn encrypt(&self, plaintext: &[u8], password: &[u8]) -> Result<Sealed> {
        let nonce: [u8; NONCE_SIZE] = random_bytes();
        let key = derive_key(password, &nonce, &self.params)?;
        let ciphertext = aead::encrypt_with_nonce(key.as_bytes(), &nonce, plaintext)?;

        Ok(Sealed {
            ciphertext,
            iv: encode_iv(&nonce, &self.params),
        })
    }

    /// Decrypt a record, choosing the legacy path when `iv` is absent.
    ///
    /// # Errors
    /// - `Error::Decryption` for a wrong password, a malformed iv, or a
    ///   tampered ciphertext. The causes are not distinguished.
    pub fn decrypt(&self, ciphertext: &[u8], password: &[u8], iv: Option<&[u8]>) -> Result<Vec<u8>> {
        match iv {
            Some(iv) => {
                let (nonce, params) = decode_iv(iv)?;
                let key = derive_key(password, &nonce, &params)?;
                aead::decrypt_with_nonce(key.as_bytes(), &nonce, ciphertext)
            }
            None => self.decrypt_legacy(ciphertext, password),
        }
    }

    /// Write a record in the legacy, iv-less format.
    pub fn encrypt_legacy(&self, plaintext: &[u8], password: &[u8]) -> Result<Vec<u8>> {
        let key = derive_key(password, &legacy_salt(password), &self.legacy_params)?;
        aead::encrypt(key.as_bytes(), plaintext)
    }

    /// Read a record written in the legacy format.
    pub fn decrypt_legacy(&self, ciphertext: &[u8], password: &[u8]) -> Result<Vec<u8>> {
        let key = derive_key(password, &legacy_salt(password), &self.legacy_params)?;
        aead::decrypt(key.as_bytes(), ciphertext)
    }
}

fn legacy_salt(password: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(LEGACY_SALT_CONTEXT);
    hasher.update(password);

    let mut salt = [0u8; 32];
    salt.copy_from_slice(&hasher.finalize());
    salt
}

fn encode_iv(nonce: &[u8; NONCE_SIZE], params: &KdfParams) -> Vec<u8> {
    let mut iv = Vec::with_capacity(IV_LENGTH);
    iv.extend_from_slice(nonce);
    iv.extend_from_slice(&params.memory_cost.to_le_bytes());
    iv.extend_from_slice(&params.time_cost.to_le_bytes());
    iv.extend_from_slice(&params.parallelism.to_le_bytes());
    iv
}

fn decode_iv(iv: &[u8]) -> Result<([u8; NONCE_SIZE], KdfParams)> {
    if iv.len() != IV_LENGTH {
        return Err(Error::Decryption);
    }

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&iv[..NONCE_SIZE]);

    let word = |offset: usize| {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&iv[offset..offset + 4]);
        u32::from_le_bytes(bytes)
    };
    let params = KdfParams {
        memory_cost: word(NONCE_SIZE),
        time_cost: word(NONCE_SIZE + 4),
        parallelism: word(NONCE_SIZE + 8),
    };
    params.validate().map_err(|_| Error::Decryption)?;

    Ok((nonce, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::test_params;
    use proptest::prelude::*;

    fn engine() -> EncryptionEngine {
        EncryptionEngine::new(test_params())
            .unwrap()
            .with_legacy_params(test_params())
            .unwrap()
    }

    #[test]
    fn test_hello_world_scenario() {
        let engine = engine();
        let sealed = engine.encrypt(b"hello world", b"correct-password").unwrap();

        let plaintext = engine
            .decrypt(&sealed.ciphertext, b"correct-password", Some(&sealed.iv))
            .unwrap();
        assert_eq!(plaintext, b"hello world");

        let wrong = engine.decrypt(&sealed.ciphertext, b"wrong-password", Some(&sealed.iv));
        assert!(matches!(wrong, Err(Error::Decryption)));
    }

    #[test]
    fn test_iv_layout() {
        let sealed = engine().encrypt(b"x", b"pw").unwrap();
        assert_eq!(sealed.iv.len(), IV_LENGTH);

        let (_, params) = decode_iv(&sealed.iv).unwrap();
        assert_eq!(params, test_params());
    }

    #[test]
    fn test_records_survive_param_change() {
        let old = engine();
        let sealed = old.encrypt(b"payload", b"pw").unwrap();

        let mut newer_params = test_params();
        newer_params.time_cost = 2;
        let newer = EncryptionEngine::new(newer_params).unwrap();

        let plaintext = newer
            .decrypt(&sealed.ciphertext, b"pw", Some(&sealed.iv))
            .unwrap();
        assert_eq!(plaintext, b"payload");
    }

    #[test]
    fn test_malformed_iv_is_decryption_error() {
        let engine = engine();
        let sealed = engine.encrypt(b"payload", b"pw").unwrap();

        let short = &sealed.iv[..NONCE_SIZE];
        assert!(matches!(
            engine.decrypt(&sealed.ciphertext, b"pw", Some(short)),
            Err(Error::Decryption)
        ));

        let mut hostile = sealed.iv.clone();
        hostile[NONCE_SIZE..NONCE_SIZE + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            engine.decrypt(&sealed.ciphertext, b"pw", Some(&hostile)),
            Err(Error::Decryption)
        ));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let engine = engine();
        let mut sealed = engine.encrypt(b"important", b"pw").unwrap();
        sealed.ciphertext[0] ^= 0x01;

        assert!(matches!(
            engine.decrypt(&sealed.ciphertext, b"pw", Some(&sealed.iv)),
            Err(Error::Decryption)
        ));
    }

    #[test]
    fn test_legacy_mode() {
        let engine = engine();
        let stored = engine.encrypt_legacy(b"old record", b"pw").unwrap();

        assert_eq!(engine.decrypt(&stored, b"pw", None).unwrap(), b"old record");
        assert!(matches!(
            engine.decrypt(&stored, b"other", None),
            Err(Error::Decryption)
        ));
    }

    #[test]
    fn test_legacy_record_not_readable_as_modern() {
        let engine = engine();
        let stored = engine.encrypt_legacy(b"old record", b"pw").unwrap();
        let bogus_iv = encode_iv(&[0u8; NONCE_SIZE], &test_params());

        assert!(engine.decrypt(&stored, b"pw", Some(&bogus_iv)).is_err());
    }

    #[test]
    fn test_empty_password_rejected() {
        assert!(matches!(
            engine().encrypt(b"data", b""),
            Err(Error::Validation(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn prop_roundtrip(
            data in proptest::collection::vec(any::<u8>(), 0..2048),
            password in "[a-zA-Z0-9]{1,32}",
        ) {
            let engine = engine();
            let sealed = engine.encrypt(&data, password.as_bytes()).unwrap();
            let plaintext = engine
                .decrypt(&sealed.ciphertext, password.as_bytes(), Some(&sealed.iv))
                .unwrap();
            prop_assert_eq!(plaintext, data);
        }

        #[test]
        fn prop_wrong_password_rejected(
            data in proptest::collection::vec(any::<u8>(), 0..512),
            p1 in "[a-z]{1,16}",
            p2 in "[A-Z]{1,16}",
        ) {
            let engine = engine();
            let sealed = engine.encrypt(&data, p1.as_bytes()).unwrap();
            let result = engine.decrypt(&sealed.ciphertext, p2.as_bytes(), Some(&sealed.iv));
            prop_assert!(matches!(result, Err(Error::Decryption)));
        }
    }
}
