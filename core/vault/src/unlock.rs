//! Quorum unlock and explicit lock.
//!
//! Each member of a vault holds a personal PIN for it. A vault opens once
//! `unlock_threshold` distinct members have proven their PIN within the
//! approval window; it then stays open for the vault's TTL.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::access::VaultAccessController;
use crate::audit::AuditLogger;
use crate::clock::Clock;
use crate::config::ServiceConfig;
use crate::run_blocking;
use strongroom_common::{
    ClientMeta, Error, HistoryAction, LockState, Result, UnlockApproval, UserId, Vault, VaultId,
    VaultPin,
};
use strongroom_crypto::CredentialVerifier;
use strongroom_storage::{LockTransition, VaultRepository};

/// Minimum PIN length accepted by [`UnlockCoordinator::set_pin`].
pub const MIN_PIN_LENGTH: usize = 4;

/// Where a vault stands on its way to being unlocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockProgress {
    /// Fresh approvals counted toward the threshold.
    pub approvals: usize,
    pub threshold: u32,
    pub unlocked: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl UnlockProgress {
    fn open(vault: &Vault, state: &LockState) -> Self {
        Self {
            approvals: 0,
            threshold: vault.unlock_threshold,
            unlocked: true,
            expires_at: state.expires_at(),
        }
    }
}

/// Drives lock state transitions requested by members.
#[derive(Clone)]
pub struct UnlockCoordinator {
    repo: Arc<dyn VaultRepository>,
    clock: Arc<dyn Clock>,
    access: VaultAccessController,
    audit: AuditLogger,
    verifier: CredentialVerifier,
    approval_window: Duration,
}

impl UnlockCoordinator {
    pub fn new(
        repo: Arc<dyn VaultRepository>,
        clock: Arc<dyn Clock>,
        config: &ServiceConfig,
    ) -> Result<Self> {
        config.validate()?;
        let approval_window = i64::try_from(config.unlock_approval_window_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                Error::Validation("unlock_approval_window_secs too large".to_string())
            })?;

        Ok(Self {
            access: VaultAccessController::new(repo.clone(), clock.clone()),
            audit: AuditLogger::new(repo.clone(), clock.clone()),
            verifier: CredentialVerifier::new(config.kdf_params)?,
            approval_window,
            repo,
            clock,
        })
    }

    /// Set or replace the caller's unlock PIN for a vault they belong to.
    pub async fn set_pin(&self, vault_id: &VaultId, user_id: &UserId, pin: &str) -> Result<()> {
        let vault = self.access.check_member(vault_id, user_id).await?;
        if pin.chars().count() < MIN_PIN_LENGTH {
            return Err(Error::Validation(format!(
                "pin must be at least {} characters",
                MIN_PIN_LENGTH
            )));
        }

        let verifier = self.verifier.clone();
        let pin = Zeroizing::new(pin.as_bytes().to_vec());
        let pin_hash = run_blocking(move || verifier.hash(&pin)).await?;

        self.repo
            .put_vault_pin(VaultPin {
                vault_id: vault.id.clone(),
                user_id: user_id.clone(),
                pin_hash,
            })
            .await?;
        debug!(vault_id = %vault.id, user_id = %user_id, "Unlock PIN set");
        Ok(())
    }

    /// Current approval count and lock state.
    pub async fn progress(&self, vault_id: &VaultId, user_id: &UserId) -> Result<UnlockProgress> {
        let vault = self.access.check_member(vault_id, user_id).await?;
        let now = self.clock.now();

        if vault.lock_state.is_open_at(now) {
            return Ok(UnlockProgress::open(&vault, &vault.lock_state));
        }
        Ok(UnlockProgress {
            approvals: self.fresh_approvals(&vault, now).await?,
            threshold: vault.unlock_threshold,
            unlocked: false,
            expires_at: None,
        })
    }

    /// Record the caller's approval after checking their PIN, unlocking the
    /// vault once the threshold is met.
    ///
    /// Submitting while the vault is open changes nothing.
    ///
    /// # Errors
    /// - `NotFoundOrUnauthorized` if the caller is not a member
    /// - `InvalidCredential` if the PIN is wrong or none is set
    pub async fn submit_pin(
        &self,
        vault_id: &VaultId,
        user_id: &UserId,
        pin: &str,
        meta: &ClientMeta,
    ) -> Result<UnlockProgress> {
        let mut vault = self.access.check_member(vault_id, user_id).await?;
        let now = self.clock.now();

        if vault.lock_state.is_open_at(now) {
            return Ok(UnlockProgress::open(&vault, &vault.lock_state));
        }

        self.verify_pin(&vault, user_id, pin).await?;

        if vault.lock_state.is_expired_at(now) {
            self.access.expire(&vault, user_id, meta).await?;
            vault.lock_state = LockState::Locked;
        }

        self.repo
            .record_unlock_approval(UnlockApproval {
                vault_id: vault.id.clone(),
                user_id: user_id.clone(),
                approved_at: now,
            })
            .await?;
        self.audit
            .append(
                &vault.id,
                user_id,
                HistoryAction::UnlockApproval,
                "Member approved unlock",
                None,
                meta,
            )
            .await?;

        let approvals = self.fresh_approvals(&vault, now).await?;
        if approvals < vault.unlock_threshold as usize {
            return Ok(UnlockProgress {
                approvals,
                threshold: vault.unlock_threshold,
                unlocked: false,
                expires_at: None,
            });
        }

        let next = LockState::unlocked(now, vault.unlock_ttl_secs);
        let entry = self.audit.entry(
            &vault.id,
            user_id,
            HistoryAction::VaultUnlock,
            format!("Vault unlocked by {} of {} approvals", approvals, vault.unlock_threshold),
            None,
            meta,
        );
        let won = self
            .repo
            .swap_lock_state(
                &vault.id,
                LockTransition {
                    expected: LockState::Locked,
                    next: next.clone(),
                    entry: Some(entry),
                    clear_approvals: true,
                },
            )
            .await?;

        if won {
            info!(vault_id = %vault.id, ttl_secs = vault.unlock_ttl_secs, "Vault unlocked");
            return Ok(UnlockProgress {
                approvals,
                ..UnlockProgress::open(&vault, &next)
            });
        }

        // Another approver completed the quorum first.
        self.progress(&vault.id, user_id).await
    }

    /// Close the vault. Returns false if it was already locked.
    ///
    /// An unlock past its TTL counts as locked; it is recorded as `AUTO_LOCK`.
    pub async fn lock(
        &self,
        vault_id: &VaultId,
        user_id: &UserId,
        meta: &ClientMeta,
    ) -> Result<bool> {
        let vault = self.access.check_member(vault_id, user_id).await?;
        if vault.lock_state.is_locked() {
            return Ok(false);
        }
        if vault.lock_state.is_expired_at(self.clock.now()) {
            self.access.expire(&vault, user_id, meta).await?;
            return Ok(false);
        }

        let entry = self.audit.entry(
            &vault.id,
            user_id,
            HistoryAction::VaultLock,
            "Vault locked",
            None,
            meta,
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
            info!(vault_id = %vault.id, user_id = %user_id, "Vault locked");
        }
        Ok(won)
    }

    async fn verify_pin(&self, vault: &Vault, user_id: &UserId, pin: &str) -> Result<()> {
        let stored = self
            .repo
            .find_vault_pin(&vault.id, user_id)
            .await?
            .ok_or(Error::InvalidCredential)?;

        let verifier = self.verifier.clone();
        let candidate = Zeroizing::new(pin.as_bytes().to_vec());
        let matches =
            run_blocking(move || verifier.verify(&candidate, &stored.pin_hash)).await?;

        if matches {
            Ok(())
        } else {
            debug!(vault_id = %vault.id, user_id = %user_id, "Rejected unlock PIN");
            Err(Error::InvalidCredential)
        }
    }

    async fn fresh_approvals(&self, vault: &Vault, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now
            .checked_sub_signed(self.approval_window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Ok(self
            .repo
            .list_unlock_approvals(&vault.id)
            .await?
            .iter()
            .filter(|a| a.approved_at >= cutoff && vault.is_member(&a.user_id))
            .count())
    }
}
