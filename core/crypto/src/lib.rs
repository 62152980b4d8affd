//! Cryptographic primitives for Strongroom.
//!
//! This module provides:
//! - Key derivation using Argon2id
//! - Authenticated encryption using XChaCha20-Poly1305
//! - The password-keyed encryption engine for vault payloads
//! - Salted one-way hashing of passwords and PINs
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Constant-time comparison of credential digests

pub mod aead;
pub mod credential;
pub mod engine;
pub mod kdf;
pub mod keys;

pub use credential::{CredentialHash, CredentialVerifier};
pub use engine::{EncryptionEngine, Sealed, IV_LENGTH};
pub use kdf::{derive_key, KdfParams};
pub use keys::{RecordKey, Salt, KEY_LENGTH};
