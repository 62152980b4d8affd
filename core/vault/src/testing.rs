//! Shared fixtures for the service tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::clock::ManualClock;
use crate::config::ServiceConfig;
use strongroom_common::{
    ClientMeta, Error, FileId, FileSummary, HistoryEntry, ItemId, PersonalVaultItem, Result,
    UnlockApproval, UserCredential, UserId, UserProfile, Vault, VaultFile, VaultId, VaultPin,
};
use strongroom_crypto::KdfParams;
use strongroom_storage::{HistorySlice, LockTransition, MemoryRepository, VaultRepository};

pub fn fast_params() -> KdfParams {
    KdfParams {
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn uid(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

pub fn vid(id: &str) -> VaultId {
    VaultId::new(id).unwrap()
}

pub fn fid(id: &str) -> FileId {
    FileId::new(id).unwrap()
}

pub fn meta() -> ClientMeta {
    ClientMeta {
        ip_address: Some("10.0.0.7".to_string()),
        user_agent: Some("tests/1.0".to_string()),
    }
}

pub fn config() -> ServiceConfig {
    ServiceConfig {
        kdf_params: fast_params(),
        ..ServiceConfig::default()
    }
}

pub struct Fixture {
    pub repo: Arc<MemoryRepository>,
    pub clock: Arc<ManualClock>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            repo: Arc::new(MemoryRepository::new()),
            clock: Arc::new(ManualClock::new(t0())),
        }
    }

    /// Insert an active, locked vault with a 600s TTL.
    pub async fn vault(&self, id: &str, admin: &str, members: &[&str]) -> Vault {
        let mut vault = Vault::new(vid(id), format!("Vault {}", id), uid(admin), 600, t0());
        vault.member_ids = members.iter().map(|m| uid(m)).collect();
        self.repo.insert_vault(vault.clone()).await.unwrap();
        vault
    }

    pub async fn user(&self, id: &str, name: &str) {
        self.repo
            .upsert_user(UserProfile {
                id: uid(id),
                display_name: name.to_string(),
                email: Some(format!("{}@example.com", id)),
            })
            .await
            .unwrap();
    }
}

/// Memory repository that counts batch lookups and can refuse history writes.
pub struct CountingRepository {
    pub inner: MemoryRepository,
    pub user_queries: AtomicUsize,
    pub file_queries: AtomicUsize,
    fail_history_writes: bool,
}

impl CountingRepository {
    pub fn new(fail_history_writes: bool) -> Self {
        Self {
            inner: MemoryRepository::new(),
            user_queries: AtomicUsize::new(0),
            file_queries: AtomicUsize::new(0),
            fail_history_writes,
        }
    }
}

#[async_trait]
impl VaultRepository for CountingRepository {
    fn name(&self) -> &str {
        "counting"
    }

    async fn upsert_user(&self, profile: UserProfile) -> Result<()> {
        self.inner.upsert_user(profile).await
    }

    async fn find_users(&self, ids: &[UserId]) -> Result<Vec<UserProfile>> {
        self.user_queries.fetch_add(1, Ordering::SeqCst);
        self.inner.find_users(ids).await
    }

    async fn put_credential(&self, credential: UserCredential) -> Result<()> {
        self.inner.put_credential(credential).await
    }

    async fn find_credential(&self, user_id: &UserId) -> Result<Option<UserCredential>> {
        self.inner.find_credential(user_id).await
    }

    async fn insert_vault(&self, vault: Vault) -> Result<()> {
        self.inner.insert_vault(vault).await
    }

    async fn find_active_vault_for_member(
        &self,
        vault_id: &VaultId,
        user_id: &UserId,
    ) -> Result<Option<Vault>> {
        self.inner.find_active_vault_for_member(vault_id, user_id).await
    }

    async fn add_member(&self, vault_id: &VaultId, user_id: &UserId) -> Result<bool> {
        self.inner.add_member(vault_id, user_id).await
    }

    async fn deactivate_vault(&self, vault_id: &VaultId, entry: HistoryEntry) -> Result<bool> {
        self.inner.deactivate_vault(vault_id, entry).await
    }

    async fn swap_lock_state(
        &self,
        vault_id: &VaultId,
        transition: LockTransition,
    ) -> Result<bool> {
        self.inner.swap_lock_state(vault_id, transition).await
    }

    async fn put_vault_pin(&self, pin: VaultPin) -> Result<()> {
        self.inner.put_vault_pin(pin).await
    }

    async fn find_vault_pin(
        &self,
        vault_id: &VaultId,
        user_id: &UserId,
    ) -> Result<Option<VaultPin>> {
        self.inner.find_vault_pin(vault_id, user_id).await
    }

    async fn record_unlock_approval(&self, approval: UnlockApproval) -> Result<()> {
        self.inner.record_unlock_approval(approval).await
    }

    async fn list_unlock_approvals(&self, vault_id: &VaultId) -> Result<Vec<UnlockApproval>> {
        self.inner.list_unlock_approvals(vault_id).await
    }

    async fn insert_file(&self, file: VaultFile) -> Result<()> {
        self.inner.insert_file(file).await
    }

    async fn find_file_in_vault(
        &self,
        vault_id: &VaultId,
        file_id: &FileId,
    ) -> Result<Option<VaultFile>> {
        self.inner.find_file_in_vault(vault_id, file_id).await
    }

    async fn find_file_names(
        &self,
        vault_id: &VaultId,
        file_ids: &[FileId],
    ) -> Result<Vec<(FileId, String)>> {
        self.file_queries.fetch_add(1, Ordering::SeqCst);
        self.inner.find_file_names(vault_id, file_ids).await
    }

    async fn list_files(&self, vault_id: &VaultId) -> Result<Vec<FileSummary>> {
        self.inner.list_files(vault_id).await
    }

    async fn insert_personal_item(&self, item: PersonalVaultItem) -> Result<()> {
        self.inner.insert_personal_item(item).await
    }

    async fn find_personal_item(
        &self,
        owner_id: &UserId,
        item_id: &ItemId,
    ) -> Result<Option<PersonalVaultItem>> {
        self.inner.find_personal_item(owner_id, item_id).await
    }

    async fn append_history(&self, entry: HistoryEntry) -> Result<()> {
        if self.fail_history_writes {
            return Err(Error::RepositoryUnavailable("history store offline".to_string()));
        }
        self.inner.append_history(entry).await
    }

    async fn list_history(
        &self,
        vault_id: &VaultId,
        limit: usize,
        offset: usize,
    ) -> Result<HistorySlice> {
        self.inner.list_history(vault_id, limit, offset).await
    }
}
