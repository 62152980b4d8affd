//! Common utilities and types shared across Strongroom modules.
//!
//! This module provides the error taxonomy, identifiers, and the records
//! persisted by the repository layer.

pub mod error;
pub mod records;
pub mod types;

pub use error::{Error, ErrorBody, ErrorKind, Result};
pub use records::{
    visible_to_member, ClientMeta, FileSummary, HistoryAction, HistoryEntry, LockState,
    PersonalVaultItem, UnlockApproval, UserCredential, UserProfile, Vault, VaultFile, VaultPin,
    MAX_TTL_SECS,
};
pub use types::{FileId, HistoryId, ItemId, SensitiveBytes, UserId, VaultId};
