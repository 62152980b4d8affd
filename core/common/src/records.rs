//! Persistent records shared by the repository and the vault services.
//!
//! Records are plain owned values. Anything time-dependent takes `now`
//! as a parameter instead of reading the wall clock.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::types::{FileId, HistoryId, ItemId, UserId, VaultId};
use crate::Error;

/// Upper bound applied to unlock TTLs (ten years).
pub const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Whether vault contents are currently decryptable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LockState {
    /// Gate closed.
    Locked,
    /// Gate open until `opened_at + ttl_secs`.
    Unlocked {
        opened_at: DateTime<Utc>,
        ttl_secs: u64,
    },
}

impl LockState {
    /// Open the gate at `now` for `ttl_secs`.
    pub fn unlocked(now: DateTime<Utc>, ttl_secs: u64) -> Self {
        Self::Unlocked {
            opened_at: now,
            ttl_secs: ttl_secs.min(MAX_TTL_SECS),
        }
    }

    /// Check if the gate is closed.
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked)
    }

    /// Time the current unlock window opened, if any.
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Locked => None,
            Self::Unlocked { opened_at, .. } => Some(*opened_at),
        }
    }

    /// Instant after which an unlocked vault is considered expired.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Locked => None,
            Self::Unlocked {
                opened_at,
                ttl_secs,
            } => {
                let ttl = Duration::seconds((*ttl_secs).min(MAX_TTL_SECS) as i64);
                Some(
                    opened_at
                        .checked_add_signed(ttl)
                        .unwrap_or(DateTime::<Utc>::MAX_UTC),
                )
            }
        }
    }

    /// Unlocked and `now <= opened_at + ttl`.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expiry| now <= expiry)
    }

    /// Unlocked but past its expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expiry| now > expiry)
    }
}

/// A shared vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub id: VaultId,
    pub name: String,
    pub admin_id: UserId,
    /// Members other than the admin. The admin is implicitly a member.
    pub member_ids: BTreeSet<UserId>,
    /// Soft-delete flag; inactive vaults are never returned by lookups.
    pub is_active: bool,
    pub lock_state: LockState,
    /// TTL applied when a quorum unlock opens the vault.
    pub unlock_ttl_secs: u64,
    /// Number of fresh PIN approvals needed to unlock.
    pub unlock_threshold: u32,
    pub created_at: DateTime<Utc>,
}

impl Vault {
    /// Create an active, locked vault owned by `admin_id`.
    pub fn new(
        id: VaultId,
        name: impl Into<String>,
        admin_id: UserId,
        unlock_ttl_secs: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            admin_id,
            member_ids: BTreeSet::new(),
            is_active: true,
            lock_state: LockState::Locked,
            unlock_ttl_secs: unlock_ttl_secs.min(MAX_TTL_SECS),
            unlock_threshold: 1,
            created_at,
        }
    }

    /// Admin or listed member.
    pub fn is_member(&self, user_id: &UserId) -> bool {
        self.admin_id == *user_id || self.member_ids.contains(user_id)
    }

    /// Admin plus every member.
    pub fn participants(&self) -> BTreeSet<UserId> {
        let mut all = self.member_ids.clone();
        all.insert(self.admin_id.clone());
        all
    }
}

/// The single membership predicate every vault lookup goes through:
/// the vault is active, has the requested id, and `user_id` is its admin
/// or one of its members.
pub fn visible_to_member(vault: &Vault, vault_id: &VaultId, user_id: &UserId) -> bool {
    vault.is_active && vault.id == *vault_id && vault.is_member(user_id)
}

/// An encrypted file owned by a shared vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultFile {
    pub id: FileId,
    pub vault_id: VaultId,
    pub encrypted_data: Vec<u8>,
    /// `None` only for records written in the legacy format.
    pub iv: Option<Vec<u8>>,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

impl VaultFile {
    /// Metadata view without the payload.
    pub fn summary(&self) -> FileSummary {
        FileSummary {
            id: self.id.clone(),
            original_name: self.original_name.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size,
            created_at: self.created_at,
        }
    }
}

/// File metadata without ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub id: FileId,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// An encrypted item in a user's personal vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalVaultItem {
    pub id: ItemId,
    pub owner_id: UserId,
    pub encrypted_data: Vec<u8>,
    pub iv: Option<Vec<u8>>,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Audited action tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryAction {
    FileUpload,
    FileDownload,
    FilePreview,
    VaultLock,
    VaultUnlock,
    UnlockApproval,
    AutoLock,
    MemberAdd,
    VaultDelete,
}

impl HistoryAction {
    /// Wire tag, e.g. `AUTO_LOCK`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileUpload => "FILE_UPLOAD",
            Self::FileDownload => "FILE_DOWNLOAD",
            Self::FilePreview => "FILE_PREVIEW",
            Self::VaultLock => "VAULT_LOCK",
            Self::VaultUnlock => "VAULT_UNLOCK",
            Self::UnlockApproval => "UNLOCK_APPROVAL",
            Self::AutoLock => "AUTO_LOCK",
            Self::MemberAdd => "MEMBER_ADD",
            Self::VaultDelete => "VAULT_DELETE",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "FILE_UPLOAD" => Self::FileUpload,
            "FILE_DOWNLOAD" => Self::FileDownload,
            "FILE_PREVIEW" => Self::FilePreview,
            "VAULT_LOCK" => Self::VaultLock,
            "VAULT_UNLOCK" => Self::VaultUnlock,
            "UNLOCK_APPROVAL" => Self::UnlockApproval,
            "AUTO_LOCK" => Self::AutoLock,
            "MEMBER_ADD" => Self::MemberAdd,
            "VAULT_DELETE" => Self::VaultDelete,
            other => {
                return Err(Error::Serialization(format!(
                    "Unknown history action: {}",
                    other
                )))
            }
        })
    }
}

/// Request origin recorded alongside history entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryId,
    pub vault_id: VaultId,
    pub user_id: UserId,
    pub file_id: Option<FileId>,
    pub action: HistoryAction,
    pub details: String,
    pub timestamp: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl HistoryEntry {
    /// Build a new entry with a fresh id.
    pub fn new(
        vault_id: VaultId,
        user_id: UserId,
        action: HistoryAction,
        details: impl Into<String>,
        file_id: Option<FileId>,
        meta: &ClientMeta,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: HistoryId::generate(),
            vault_id,
            user_id,
            file_id,
            action,
            details: details.into(),
            timestamp,
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
        }
    }
}

/// Display identity of a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
    pub email: Option<String>,
}

/// Stored one-way hash of a user's personal vault password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredential {
    pub user_id: UserId,
    /// Encoded hash produced by the credential verifier.
    pub password_hash: String,
}

/// Stored one-way hash of a member's unlock PIN for one vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultPin {
    pub vault_id: VaultId,
    pub user_id: UserId,
    pub pin_hash: String,
}

/// A member's pending vote to unlock a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockApproval {
    pub vault_id: VaultId,
    pub user_id: UserId,
    pub approved_at: DateTime<Utc>,
}
