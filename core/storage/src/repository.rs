//! Repository trait definition.

use async_trait::async_trait;

use strongroom_common::{
    FileId, FileSummary, HistoryEntry, ItemId, LockState, PersonalVaultItem, Result,
    UnlockApproval, UserCredential, UserId, UserProfile, Vault, VaultFile, VaultId, VaultPin,
};

/// Atomic change of a vault's lock state.
///
/// Applied only if the stored state still equals `expected`; the optional
/// history entry and approval reset commit together with the state change.
#[derive(Debug, Clone)]
pub struct LockTransition {
    pub expected: LockState,
    pub next: LockState,
    pub entry: Option<HistoryEntry>,
    pub clear_approvals: bool,
}

/// One page of history plus the total number of entries for the vault.
#[derive(Debug, Clone, Default)]
pub struct HistorySlice {
    pub entries: Vec<HistoryEntry>,
    pub total: u64,
}

/// Persistence for vaults, files, credentials, and history.
///
/// Implementations never return inactive vaults and scope every file or
/// item lookup to its owning vault or user.
#[async_trait]
pub trait VaultRepository: Send + Sync {
    /// Backend name (e.g., "memory", "sqlite").
    fn name(&self) -> &str;

    /// Insert or replace a user's display identity.
    async fn upsert_user(&self, profile: UserProfile) -> Result<()>;

    /// Fetch profiles for the given ids in a single query. Unknown ids are skipped.
    async fn find_users(&self, ids: &[UserId]) -> Result<Vec<UserProfile>>;

    /// Insert or replace a personal vault password hash.
    async fn put_credential(&self, credential: UserCredential) -> Result<()>;

    async fn find_credential(&self, user_id: &UserId) -> Result<Option<UserCredential>>;

    /// Insert a new vault together with its member set.
    async fn insert_vault(&self, vault: Vault) -> Result<()>;

    /// Look up an active vault visible to `user_id` as admin or member.
    ///
    /// Returns `None` both when the vault does not exist and when the user
    /// is not a member.
    async fn find_active_vault_for_member(
        &self,
        vault_id: &VaultId,
        user_id: &UserId,
    ) -> Result<Option<Vault>>;

    /// Add a member to an active vault. Returns false if already present.
    async fn add_member(&self, vault_id: &VaultId, user_id: &UserId) -> Result<bool>;

    /// Soft-delete a vault. Returns false if it was already inactive or absent.
    async fn deactivate_vault(&self, vault_id: &VaultId, entry: HistoryEntry) -> Result<bool>;

    /// Compare-and-set the lock state of an active vault.
    ///
    /// Returns true if this call performed the transition.
    async fn swap_lock_state(&self, vault_id: &VaultId, transition: LockTransition)
        -> Result<bool>;

    /// Insert or replace a member's unlock PIN hash.
    async fn put_vault_pin(&self, pin: VaultPin) -> Result<()>;

    async fn find_vault_pin(&self, vault_id: &VaultId, user_id: &UserId)
        -> Result<Option<VaultPin>>;

    /// Record (or refresh) a member's unlock approval.
    async fn record_unlock_approval(&self, approval: UnlockApproval) -> Result<()>;

    async fn list_unlock_approvals(&self, vault_id: &VaultId) -> Result<Vec<UnlockApproval>>;

    async fn insert_file(&self, file: VaultFile) -> Result<()>;

    /// Fetch a file only if it belongs to `vault_id`.
    async fn find_file_in_vault(
        &self,
        vault_id: &VaultId,
        file_id: &FileId,
    ) -> Result<Option<VaultFile>>;

    /// Batch-fetch original names for files of one vault.
    async fn find_file_names(
        &self,
        vault_id: &VaultId,
        file_ids: &[FileId],
    ) -> Result<Vec<(FileId, String)>>;

    /// List file metadata for a vault, newest first.
    async fn list_files(&self, vault_id: &VaultId) -> Result<Vec<FileSummary>>;

    async fn insert_personal_item(&self, item: PersonalVaultItem) -> Result<()>;

    /// Fetch an item only if it is owned by `owner_id`.
    async fn find_personal_item(
        &self,
        owner_id: &UserId,
        item_id: &ItemId,
    ) -> Result<Option<PersonalVaultItem>>;

    /// Append an immutable history entry.
    async fn append_history(&self, entry: HistoryEntry) -> Result<()>;

    /// Page through a vault's history, newest first.
    async fn list_history(&self, vault_id: &VaultId, limit: usize, offset: usize)
        -> Result<HistorySlice>;
}
