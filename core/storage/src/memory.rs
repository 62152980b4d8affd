//! In-memory repository for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::repository::{HistorySlice, LockTransition, VaultRepository};
use strongroom_common::{
    visible_to_member, Error, FileId, FileSummary, HistoryEntry, ItemId, PersonalVaultItem,
    Result, UnlockApproval, UserCredential, UserId, UserProfile, Vault, VaultFile, VaultId,
    VaultPin,
};

#[derive(Default)]
struct State {
    users: HashMap<UserId, UserProfile>,
    credentials: HashMap<UserId, UserCredential>,
    vaults: HashMap<VaultId, Vault>,
    pins: HashMap<(VaultId, UserId), VaultPin>,
    approvals: HashMap<VaultId, HashMap<UserId, UnlockApproval>>,
    files: HashMap<FileId, VaultFile>,
    items: HashMap<ItemId, PersonalVaultItem>,
    /// Per-vault history in insertion order, tagged with a global sequence.
    history: HashMap<VaultId, Vec<(u64, HistoryEntry)>>,
    next_seq: u64,
}

impl State {
    fn push_history(&mut self, entry: HistoryEntry) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.history
            .entry(entry.vault_id.clone())
            .or_default()
            .push((seq, entry));
    }
}

/// In-memory repository.
///
/// All data is held in a single lock, so every method is atomic with
/// respect to the others. Data is lost on drop.
pub struct MemoryRepository {
    state: RwLock<State>,
}

impl MemoryRepository {
    /// Create a new empty repository.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| Error::RepositoryUnavailable("memory store poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| Error::RepositoryUnavailable("memory store poisoned".to_string()))
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VaultRepository for MemoryRepository {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert_user(&self, profile: UserProfile) -> Result<()> {
        self.write()?.users.insert(profile.id.clone(), profile);
        Ok(())
    }

    async fn find_users(&self, ids: &[UserId]) -> Result<Vec<UserProfile>> {
        let state = self.read()?;
        Ok(ids
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }

    async fn put_credential(&self, credential: UserCredential) -> Result<()> {
        self.write()?
            .credentials
            .insert(credential.user_id.clone(), credential);
        Ok(())
    }

    async fn find_credential(&self, user_id: &UserId) -> Result<Option<UserCredential>> {
        Ok(self.read()?.credentials.get(user_id).cloned())
    }

    async fn insert_vault(&self, vault: Vault) -> Result<()> {
        let mut state = self.write()?;
        if state.vaults.contains_key(&vault.id) {
            return Err(Error::Validation(format!("Vault {} already exists", vault.id)));
        }
        state.vaults.insert(vault.id.clone(), vault);
        Ok(())
    }

    async fn find_active_vault_for_member(
        &self,
        vault_id: &VaultId,
        user_id: &UserId,
    ) -> Result<Option<Vault>> {
        let state = self.read()?;
        Ok(state
            .vaults
            .get(vault_id)
            .filter(|vault| visible_to_member(vault, vault_id, user_id))
            .cloned())
    }

    async fn add_member(&self, vault_id: &VaultId, user_id: &UserId) -> Result<bool> {
        let mut state = self.write()?;
        let vault = state
            .vaults
            .get_mut(vault_id)
            .filter(|vault| vault.is_active)
            .ok_or(Error::NotFoundOrUnauthorized)?;
        if vault.is_member(user_id) {
            return Ok(false);
        }
        Ok(vault.member_ids.insert(user_id.clone()))
    }

    async fn deactivate_vault(&self, vault_id: &VaultId, entry: HistoryEntry) -> Result<bool> {
        let mut state = self.write()?;
        let deactivated = match state.vaults.get_mut(vault_id) {
            Some(vault) if vault.is_active => {
                vault.is_active = false;
                true
            }
            _ => false,
        };

        if deactivated {
            state.push_history(entry);
        }
        Ok(deactivated)
    }

    async fn swap_lock_state(
        &self,
        vault_id: &VaultId,
        transition: LockTransition,
    ) -> Result<bool> {
        let mut state = self.write()?;
        let swapped = match state.vaults.get_mut(vault_id) {
            Some(vault) if vault.is_active && vault.lock_state == transition.expected => {
                vault.lock_state = transition.next;
                true
            }
            _ => false,
        };

        if swapped {
            if let Some(entry) = transition.entry {
                state.push_history(entry);
            }
            if transition.clear_approvals {
                state.approvals.remove(vault_id);
            }
        }
        Ok(swapped)
    }

    async fn put_vault_pin(&self, pin: VaultPin) -> Result<()> {
        self.write()?
            .pins
            .insert((pin.vault_id.clone(), pin.user_id.clone()), pin);
        Ok(())
    }

    async fn find_vault_pin(
        &self,
        vault_id: &VaultId,
        user_id: &UserId,
    ) -> Result<Option<VaultPin>> {
        Ok(self
            .read()?
            .pins
            .get(&(vault_id.clone(), user_id.clone()))
            .cloned())
    }

    async fn record_unlock_approval(&self, approval: UnlockApproval) -> Result<()> {
        self.write()?
            .approvals
            .entry(approval.vault_id.clone())
            .or_default()
            .insert(approval.user_id.clone(), approval);
        Ok(())
    }

    async fn list_unlock_approvals(&self, vault_id: &VaultId) -> Result<Vec<UnlockApproval>> {
        Ok(self
            .read()?
            .approvals
            .get(vault_id)
            .map(|by_user| by_user.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_file(&self, file: VaultFile) -> Result<()> {
        self.write()?.files.insert(file.id.clone(), file);
        Ok(())
    }

    async fn find_file_in_vault(
        &self,
        vault_id: &VaultId,
        file_id: &FileId,
    ) -> Result<Option<VaultFile>> {
        Ok(self
            .read()?
            .files
            .get(file_id)
            .filter(|file| file.vault_id == *vault_id)
            .cloned())
    }

    async fn find_file_names(
        &self,
        vault_id: &VaultId,
        file_ids: &[FileId],
    ) -> Result<Vec<(FileId, String)>> {
        let state = self.read()?;
        Ok(file_ids
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter_map(|id| state.files.get(id))
            .filter(|file| file.vault_id == *vault_id)
            .map(|file| (file.id.clone(), file.original_name.clone()))
            .collect())
    }

    async fn list_files(&self, vault_id: &VaultId) -> Result<Vec<FileSummary>> {
        let state = self.read()?;
        let mut files: Vec<FileSummary> = state
            .files
            .values()
            .filter(|file| file.vault_id == *vault_id)
            .map(VaultFile::summary)
            .collect();
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(files)
    }

    async fn insert_personal_item(&self, item: PersonalVaultItem) -> Result<()> {
        self.write()?.items.insert(item.id.clone(), item);
        Ok(())
    }

    async fn find_personal_item(
        &self,
        owner_id: &UserId,
        item_id: &ItemId,
    ) -> Result<Option<PersonalVaultItem>> {
        Ok(self
            .read()?
            .items
            .get(item_id)
            .filter(|item| item.owner_id == *owner_id)
            .cloned())
    }

    async fn append_history(&self, entry: HistoryEntry) -> Result<()> {
        self.write()?.push_history(entry);
        Ok(())
    }

    async fn list_history(
        &self,
        vault_id: &VaultId,
        limit: usize,
        offset: usize,
    ) -> Result<HistorySlice> {
        let state = self.read()?;
        let Some(entries) = state.history.get(vault_id) else {
            return Ok(HistorySlice::default());
        };

        let mut ordered: Vec<&(u64, HistoryEntry)> = entries.iter().collect();
        ordered.sort_by(|(seq_a, a), (seq_b, b)| {
            b.timestamp.cmp(&a.timestamp).then(seq_b.cmp(seq_a))
        });

        Ok(HistorySlice {
            entries: ordered
                .into_iter()
                .skip(offset)
                .take(limit)
                .map(|(_, entry)| entry.clone())
                .collect(),
            total: entries.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;

    #[tokio::test]
    async fn test_membership_lookup() {
        conformance::membership_lookup(&MemoryRepository::new()).await;
    }

    #[tokio::test]
    async fn test_lock_swap_is_compare_and_set() {
        conformance::lock_swap_is_compare_and_set(&MemoryRepository::new()).await;
    }

    #[tokio::test]
    async fn test_file_scoping() {
        conformance::file_scoping(&MemoryRepository::new()).await;
    }

    #[tokio::test]
    async fn test_personal_item_scoping() {
        conformance::personal_item_scoping(&MemoryRepository::new()).await;
    }

    #[tokio::test]
    async fn test_history_paging() {
        conformance::history_paging(&MemoryRepository::new()).await;
    }

    #[tokio::test]
    async fn test_batch_lookups() {
        conformance::batch_lookups(&MemoryRepository::new()).await;
    }

    #[tokio::test]
    async fn test_approvals_and_pins() {
        conformance::approvals_and_pins(&MemoryRepository::new()).await;
    }

    #[tokio::test]
    async fn test_deactivate() {
        conformance::deactivate(&MemoryRepository::new()).await;
    }
}
