//! The gate every privileged vault operation passes through.

use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use strongroom_common::{
    ClientMeta, Error, HistoryAction, HistoryEntry, LockState, Result, UserId, Vault, VaultId,
};
use strongroom_storage::{LockTransition, VaultRepository};

/// Resolves membership and lock state for `(vault, user)` pairs.
#[derive(Clone)]
pub struct VaultAccessController {
    repo: Arc<dyn VaultRepository>,
    clock: Arc<dyn Clock>,
}

impl VaultAccessController {
    pub fn new(repo: Arc<dyn VaultRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// Return the vault if `user_id` is its admin or a member.
    ///
    /// A missing vault and a vault the user cannot see both yield
    /// `NotFoundOrUnauthorized`.
    pub async fn check_member(&self, vault_id: &VaultId, user_id: &UserId) -> Result<Vault> {
        self.repo
            .find_active_vault_for_member(vault_id, user_id)
            .await?
            .ok_or(Error::NotFoundOrUnauthorized)
    }

    /// Return the vault if the user is a member and the vault is open.
    ///
    /// An unlocked vault past its TTL is moved to `Locked` with a single
    /// `AUTO_LOCK` entry. Only the caller whose compare-and-set succeeds
    /// writes that entry; every caller sees `Locked`.
    pub async fn check_unlocked(
        &self,
        vault_id: &VaultId,
        user_id: &UserId,
        meta: &ClientMeta,
    ) -> Result<Vault> {
        let vault = self.check_member(vault_id, user_id).await?;
        let now = self.clock.now();

        match &vault.lock_state {
            LockState::Locked => Err(Error::Locked),
            state if state.is_open_at(now) => Ok(vault),
            _ => {
                self.expire(&vault, user_id, meta).await?;
                Err(Error::Locked)
            }
        }
    }

    /// Move an expired vault to `Locked`, recording `AUTO_LOCK`.
    ///
    /// Returns true if this call performed the transition; false if the
    /// stored state had already changed.
    pub(crate) async fn expire(
        &self,
        vault: &Vault,
        user_id: &UserId,
        meta: &ClientMeta,
    ) -> Result<bool> {
        let entry = HistoryEntry::new(
            vault.id.clone(),
            user_id.clone(),
            HistoryAction::AutoLock,
            "Vault auto-locked after its unlock window expired",
            None,
            meta,
            self.clock.now(),
        );
        let won = self
            .repo
            .swap_lock_state(
                &vault.id,
                LockTransition {
                    expected: vault.lock_state.clone(),
                    next: LockState::Locked,
                    entry: Some(entry),
                    clear_approvals: true,
                },
            )
            .await?;

        if won {
            info!(vault_id = %vault.id, "Vault auto-locked");
        } else {
            debug!(vault_id = %vault.id, "Auto-lock already applied by another caller");
        }
        Ok(won)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::{meta, t0, uid, vid, Fixture};
    use chrono::Duration;
    use futures::future::join_all;
    use strongroom_storage::SqliteRepository;

    fn controller(fx: &Fixture) -> VaultAccessController {
        VaultAccessController::new(fx.repo.clone(), fx.clock.clone())
    }

    async fn open_at(fx: &Fixture, id: &str, secs: i64) {
        let swapped = fx
            .repo
            .swap_lock_state(
                &vid(id),
                LockTransition {
                    expected: LockState::Locked,
                    next: LockState::unlocked(t0() + Duration::seconds(secs), 600),
                    entry: None,
                    clear_approvals: false,
                },
            )
            .await
            .unwrap();
        assert!(swapped);
    }

    async fn auto_lock_count(fx: &Fixture, id: &str) -> usize {
        fx.repo
            .list_history(&vid(id), 100, 0)
            .await
            .unwrap()
            .entries
            .iter()
            .filter(|e| e.action == HistoryAction::AutoLock)
            .count()
    }

    #[tokio::test]
    async fn test_non_member_and_missing_vault_are_indistinguishable() {
        let fx = Fixture::new();
        fx.vault("v1", "admin", &["u1"]).await;
        let access = controller(&fx);

        let hidden = access.check_member(&vid("v1"), &uid("mallory")).await.unwrap_err();
        let missing = access.check_member(&vid("nope"), &uid("u1")).await.unwrap_err();

        assert!(matches!(hidden, Error::NotFoundOrUnauthorized));
        assert!(matches!(missing, Error::NotFoundOrUnauthorized));
        assert_eq!(hidden.to_body(), missing.to_body());
        assert_eq!(hidden.status_code(), 404);
    }

    #[tokio::test]
    async fn test_admin_and_member_pass_membership() {
        let fx = Fixture::new();
        fx.vault("v1", "admin", &["u1"]).await;
        let access = controller(&fx);

        assert!(access.check_member(&vid("v1"), &uid("admin")).await.is_ok());
        assert!(access.check_member(&vid("v1"), &uid("u1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_locked_vault_writes_nothing() {
        let fx = Fixture::new();
        fx.vault("v1", "admin", &["u1"]).await;
        let access = controller(&fx);

        let err = access
            .check_unlocked(&vid("v1"), &uid("u1"), &meta())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 423);
        assert_eq!(fx.repo.list_history(&vid("v1"), 10, 0).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_open_vault_passes_until_expiry() {
        let fx = Fixture::new();
        fx.vault("v1", "admin", &["u1"]).await;
        open_at(&fx, "v1", 0).await;
        let access = controller(&fx);

        fx.clock.set(t0() + Duration::seconds(600));
        let vault = access
            .check_unlocked(&vid("v1"), &uid("u1"), &meta())
            .await
            .unwrap();
        assert!(!vault.lock_state.is_locked());
    }

    #[tokio::test]
    async fn test_expired_vault_auto_locks_once() {
        let fx = Fixture::new();
        fx.vault("v1", "admin", &["u1"]).await;
        open_at(&fx, "v1", 0).await;
        let access = controller(&fx);

        fx.clock.set(t0() + Duration::seconds(700));
        let err = access
            .check_unlocked(&vid("v1"), &uid("u1"), &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Locked));
        assert_eq!(auto_lock_count(&fx, "v1").await, 1);

        let page = fx.repo.list_history(&vid("v1"), 10, 0).await.unwrap();
        assert_eq!(page.entries[0].user_id, uid("u1"));
        assert_eq!(page.entries[0].ip_address.as_deref(), Some("10.0.0.7"));

        fx.clock.set(t0() + Duration::seconds(710));
        let err = access
            .check_unlocked(&vid("v1"), &uid("u1"), &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Locked));
        assert_eq!(auto_lock_count(&fx, "v1").await, 1);

        let vault = access.check_member(&vid("v1"), &uid("u1")).await.unwrap();
        assert!(vault.lock_state.is_locked());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_expiry_writes_one_entry() {
        let fx = Fixture::new();
        fx.vault("v1", "admin", &["u1", "u2"]).await;
        open_at(&fx, "v1", 0).await;
        fx.clock.set(t0() + Duration::seconds(700));
        let access = controller(&fx);

        let calls = (0..16).map(|i| {
            let access = access.clone();
            let user = if i % 2 == 0 { uid("u1") } else { uid("u2") };
            tokio::spawn(async move {
                access.check_unlocked(&vid("v1"), &user, &meta()).await
            })
        });

        for result in join_all(calls).await {
            assert!(matches!(result.unwrap(), Err(Error::Locked)));
        }
        assert_eq!(auto_lock_count(&fx, "v1").await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_expiry_on_sqlite_writes_one_entry() {
        let repo = Arc::new(SqliteRepository::in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(t0()));
        let mut vault = Vault::new(vid("v1"), "Team", uid("admin"), 600, t0());
        vault.member_ids = [uid("u1"), uid("u2")].into_iter().collect();
        vault.lock_state = LockState::unlocked(t0(), 600);
        repo.insert_vault(vault).await.unwrap();

        clock.set(t0() + Duration::seconds(700));
        let access = VaultAccessController::new(repo.clone(), clock.clone());

        let calls = (0..16).map(|i| {
            let access = access.clone();
            let user = if i % 2 == 0 { uid("u1") } else { uid("u2") };
            tokio::spawn(async move {
                access.check_unlocked(&vid("v1"), &user, &meta()).await
            })
        });

        for result in join_all(calls).await {
            assert!(matches!(result.unwrap(), Err(Error::Locked)));
        }

        let page = repo.list_history(&vid("v1"), 100, 0).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.entries[0].action, HistoryAction::AutoLock);
        let stored = access.check_member(&vid("v1"), &uid("u1")).await.unwrap();
        assert!(stored.lock_state.is_locked());
    }
}
