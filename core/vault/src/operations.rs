//! Vault operations: the entry points the routing layer calls.

use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::access::VaultAccessController;
use crate::audit::{AuditLogger, HistoryPage};
use crate::clock::Clock;
use crate::config::ServiceConfig;
use crate::delivery::{FileDownload, Preview};
use crate::request::{FileAccess, HistoryQuery, NewFile, PersonalItemAccess};
use crate::run_blocking;
use crate::unlock::UnlockCoordinator;
use strongroom_common::{
    ClientMeta, Error, FileId, FileSummary, HistoryAction, ItemId, PersonalVaultItem, Result,
    SensitiveBytes, UserCredential, UserId, Vault, VaultFile, VaultId,
};
use strongroom_crypto::{CredentialVerifier, EncryptionEngine, Sealed};
use strongroom_storage::VaultRepository;

/// Minimum length of a personal vault password.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Settings for a new shared vault.
#[derive(Debug, Clone)]
pub struct NewVault {
    pub name: String,
    pub members: Vec<UserId>,
    /// Approvals needed to unlock. Defaults to 1.
    pub unlock_threshold: Option<u32>,
    /// Unlock window in seconds. Defaults to the service setting.
    pub unlock_ttl_secs: Option<u64>,
}

/// Orchestrates access checks, decryption, and auditing.
///
/// Every operation that decrypts content passes the lock gate first;
/// history and file listings need membership only.
pub struct VaultOperationService {
    repo: Arc<dyn VaultRepository>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
    engine: EncryptionEngine,
    verifier: CredentialVerifier,
    access: VaultAccessController,
    audit: AuditLogger,
    unlock: UnlockCoordinator,
}

impl VaultOperationService {
    /// Create a service over `repo`.
    ///
    /// # Errors
    /// - Validation error if `config` is inconsistent
    pub fn new(
        repo: Arc<dyn VaultRepository>,
        clock: Arc<dyn Clock>,
        config: ServiceConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            engine: EncryptionEngine::new(config.kdf_params)?,
            verifier: CredentialVerifier::new(config.kdf_params)?,
            access: VaultAccessController::new(repo.clone(), clock.clone()),
            audit: AuditLogger::new(repo.clone(), clock.clone()),
            unlock: UnlockCoordinator::new(repo.clone(), clock.clone(), &config)?,
            repo,
            clock,
            config,
        })
    }

    /// Replace the encryption engine, e.g. to read legacy records written
    /// with non-default parameters.
    pub fn with_engine(mut self, engine: EncryptionEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn access(&self) -> &VaultAccessController {
        &self.access
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// PIN-based unlock and explicit lock.
    pub fn unlock(&self) -> &UnlockCoordinator {
        &self.unlock
    }

    // Shared vault files

    /// Decrypt a shared-vault file for download.
    ///
    /// # Preconditions
    /// - Caller is a member of the vault
    /// - Vault is unlocked and within its TTL
    ///
    /// # Postconditions
    /// - A `FILE_DOWNLOAD` entry is recorded, best effort
    ///
    /// # Errors
    /// - `NotFoundOrUnauthorized` for an unknown vault, a non-member, or a
    ///   file that belongs to another vault
    /// - `Locked` if the vault is closed or has just expired
    /// - `Decryption` for a wrong password or corrupted payload
    pub async fn download_file(
        &self,
        user_id: &UserId,
        request: FileAccess,
        meta: &ClientMeta,
    ) -> Result<FileDownload> {
        let (vault, file, content) = self.open_file(user_id, request, meta).await?;

        self.audit
            .record_best_effort(
                &vault.id,
                user_id,
                HistoryAction::FileDownload,
                format!("Downloaded {}", file.original_name),
                Some(&file.id),
                meta,
            )
            .await;
        info!(vault_id = %vault.id, file_id = %file.id, "File downloaded");

        Ok(FileDownload {
            content,
            file_name: file.original_name,
            mime_type: file.mime_type,
        })
    }

    /// Decrypt a shared-vault file for preview.
    ///
    /// Same gate as [`download_file`](Self::download_file). Textual types are
    /// truncated to the configured character cap.
    pub async fn preview_file(
        &self,
        user_id: &UserId,
        request: FileAccess,
        meta: &ClientMeta,
    ) -> Result<Preview> {
        let (vault, file, content) = self.open_file(user_id, request, meta).await?;

        self.audit
            .record_best_effort(
                &vault.id,
                user_id,
                HistoryAction::FilePreview,
                format!("Previewed {}", file.original_name),
                Some(&file.id),
                meta,
            )
            .await;
        debug!(vault_id = %vault.id, file_id = %file.id, "File previewed");

        Ok(Preview::build(
            content,
            file.original_name,
            file.mime_type,
            file.size,
            self.config.preview_max_chars,
        ))
    }

    async fn open_file(
        &self,
        user_id: &UserId,
        request: FileAccess,
        meta: &ClientMeta,
    ) -> Result<(Vault, VaultFile, SensitiveBytes)> {
        let vault = self
            .access
            .check_unlocked(&request.vault_id, user_id, meta)
            .await?;
        let file = self
            .repo
            .find_file_in_vault(&vault.id, &request.file_id)
            .await?
            .ok_or(Error::NotFoundOrUnauthorized)?;

        let content = self
            .decrypt(
                file.encrypted_data.clone(),
                file.iv.clone(),
                request.password,
            )
            .await?;
        Ok((vault, file, content))
    }

    /// Encrypt and store a new file in an unlocked vault.
    ///
    /// # Errors
    /// - `Locked` if the vault is closed
    /// - Validation error for an empty password
    pub async fn upload_file(
        &self,
        user_id: &UserId,
        vault_id: &VaultId,
        password: Zeroizing<String>,
        file: NewFile,
        meta: &ClientMeta,
    ) -> Result<FileSummary> {
        let vault = self.access.check_unlocked(vault_id, user_id, meta).await?;
        let size = file.content.len() as u64;
        let sealed = self.encrypt(file.content, password).await?;

        let record = VaultFile {
            id: FileId::generate(),
            vault_id: vault.id.clone(),
            encrypted_data: sealed.ciphertext,
            iv: Some(sealed.iv),
            original_name: file.original_name,
            mime_type: file.mime_type,
            size,
            created_at: self.clock.now(),
        };
        let summary = record.summary();
        self.repo.insert_file(record).await?;

        self.audit
            .append(
                &vault.id,
                user_id,
                HistoryAction::FileUpload,
                format!("Uploaded {}", summary.original_name),
                Some(&summary.id),
                meta,
            )
            .await?;
        info!(vault_id = %vault.id, file_id = %summary.id, size, "File uploaded");

        Ok(summary)
    }

    /// File metadata for a vault. Membership suffices.
    pub async fn list_files(&self, user_id: &UserId, vault_id: &VaultId) -> Result<Vec<FileSummary>> {
        let vault = self.access.check_member(vault_id, user_id).await?;
        self.repo.list_files(&vault.id).await
    }

    /// Paginated, enriched history. Membership suffices; works while locked.
    pub async fn list_history(&self, user_id: &UserId, query: HistoryQuery) -> Result<HistoryPage> {
        let vault = self.access.check_member(&query.vault_id, user_id).await?;
        self.audit.list(&vault, query.limit, query.offset).await
    }

    // Personal vault

    /// Set the caller's personal vault password.
    ///
    /// Items are encrypted under this password, so it can only be set once.
    pub async fn set_personal_password(&self, user_id: &UserId, password: &str) -> Result<()> {
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(Error::Validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        if self.repo.find_credential(user_id).await?.is_some() {
            return Err(Error::Validation(
                "personal vault password is already set".to_string(),
            ));
        }

        let verifier = self.verifier.clone();
        let secret = Zeroizing::new(password.as_bytes().to_vec());
        let password_hash = run_blocking(move || verifier.hash(&secret)).await?;

        self.repo
            .put_credential(UserCredential {
                user_id: user_id.clone(),
                password_hash,
            })
            .await?;
        info!(user_id = %user_id, "Personal vault password set");
        Ok(())
    }

    /// Encrypt and store an item in the caller's personal vault.
    pub async fn store_personal_item(
        &self,
        user_id: &UserId,
        password: Zeroizing<String>,
        file: NewFile,
    ) -> Result<ItemId> {
        self.verify_personal_password(user_id, &password).await?;

        let size = file.content.len() as u64;
        let sealed = self.encrypt(file.content, password).await?;
        let id = ItemId::generate();

        self.repo
            .insert_personal_item(PersonalVaultItem {
                id: id.clone(),
                owner_id: user_id.clone(),
                encrypted_data: sealed.ciphertext,
                iv: Some(sealed.iv),
                original_name: file.original_name,
                mime_type: file.mime_type,
                size,
                created_at: self.clock.now(),
            })
            .await?;
        debug!(user_id = %user_id, item_id = %id, "Personal item stored");
        Ok(id)
    }

    /// Decrypt an item from the caller's personal vault.
    ///
    /// # Preconditions
    /// - `password` matches the caller's stored password hash
    ///
    /// # Errors
    /// - `NotFoundOrUnauthorized` if no password is set or the item
    ///   belongs to someone else
    /// - `InvalidCredential` if the password does not match
    /// - `Decryption` if the payload cannot be decrypted
    pub async fn download_personal_item(
        &self,
        user_id: &UserId,
        request: PersonalItemAccess,
    ) -> Result<FileDownload> {
        let (item, content) = self.open_personal_item(user_id, request).await?;
        Ok(FileDownload {
            content,
            file_name: item.original_name,
            mime_type: item.mime_type,
        })
    }

    /// Preview an item from the caller's personal vault.
    pub async fn preview_personal_item(
        &self,
        user_id: &UserId,
        request: PersonalItemAccess,
    ) -> Result<Preview> {
        let (item, content) = self.open_personal_item(user_id, request).await?;
        Ok(Preview::build(
            content,
            item.original_name,
            item.mime_type,
            item.size,
            self.config.preview_max_chars,
        ))
    }

    async fn open_personal_item(
        &self,
        user_id: &UserId,
        request: PersonalItemAccess,
    ) -> Result<(PersonalVaultItem, SensitiveBytes)> {
        self.verify_personal_password(user_id, &request.password)
            .await?;

        let item = self
            .repo
            .find_personal_item(user_id, &request.item_id)
            .await?
            .ok_or(Error::NotFoundOrUnauthorized)?;

        let content = self
            .decrypt(item.encrypted_data.clone(), item.iv.clone(), request.password)
            .await?;
        Ok((item, content))
    }

    async fn verify_personal_password(&self, user_id: &UserId, password: &str) -> Result<()> {
        let credential = self
            .repo
            .find_credential(user_id)
            .await?
            .ok_or(Error::NotFoundOrUnauthorized)?;

        let verifier = self.verifier.clone();
        let candidate = Zeroizing::new(password.as_bytes().to_vec());
        let matches =
            run_blocking(move || verifier.verify(&candidate, &credential.password_hash)).await?;

        if matches {
            Ok(())
        } else {
            debug!(user_id = %user_id, "Rejected personal vault password");
            Err(Error::InvalidCredential)
        }
    }

    // Administration

    /// Create a locked vault administered by `admin_id`.
    pub async fn create_vault(&self, admin_id: &UserId, new_vault: NewVault) -> Result<Vault> {
        let name = new_vault.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("vault name is required".to_string()));
        }

        let ttl = new_vault
            .unlock_ttl_secs
            .unwrap_or(self.config.default_unlock_ttl_secs);
        if ttl == 0 {
            return Err(Error::Validation("unlock TTL must be positive".to_string()));
        }

        let mut vault = Vault::new(
            VaultId::generate(),
            name,
            admin_id.clone(),
            ttl,
            self.clock.now(),
        );
        vault.member_ids = new_vault
            .members
            .into_iter()
            .filter(|m| m != admin_id)
            .collect();

        let threshold = new_vault.unlock_threshold.unwrap_or(1);
        if threshold == 0 || threshold as usize > vault.participants().len() {
            return Err(Error::Validation(format!(
                "unlock threshold must be between 1 and {}",
                vault.participants().len()
            )));
        }
        vault.unlock_threshold = threshold;

        self.repo.insert_vault(vault.clone()).await?;
        info!(vault_id = %vault.id, members = vault.member_ids.len(), threshold, "Vault created");
        Ok(vault)
    }

    /// Add a member. Only the admin may do this.
    ///
    /// Returns false if the user was already a member.
    pub async fn add_member(
        &self,
        admin_id: &UserId,
        vault_id: &VaultId,
        member_id: &UserId,
        meta: &ClientMeta,
    ) -> Result<bool> {
        let vault = self.require_admin(vault_id, admin_id).await?;
        if vault.is_member(member_id) {
            return Ok(false);
        }

        let added = self.repo.add_member(&vault.id, member_id).await?;
        if added {
            self.audit
                .append(
                    &vault.id,
                    admin_id,
                    HistoryAction::MemberAdd,
                    format!("Added member {}", member_id),
                    None,
                    meta,
                )
                .await?;
            info!(vault_id = %vault.id, member_id = %member_id, "Member added");
        }
        Ok(added)
    }

    /// Soft-delete a vault. Only the admin may do this.
    pub async fn deactivate_vault(
        &self,
        admin_id: &UserId,
        vault_id: &VaultId,
        meta: &ClientMeta,
    ) -> Result<bool> {
        let vault = self.require_admin(vault_id, admin_id).await?;
        let entry = self.audit.entry(
            &vault.id,
            admin_id,
            HistoryAction::VaultDelete,
            format!("Vault {} deleted", vault.name),
            None,
            meta,
        );

        let deactivated = self.repo.deactivate_vault(&vault.id, entry).await?;
        if deactivated {
            info!(vault_id = %vault.id, "Vault deactivated");
        }
        Ok(deactivated)
    }

    async fn require_admin(&self, vault_id: &VaultId, user_id: &UserId) -> Result<Vault> {
        let vault = self.access.check_member(vault_id, user_id).await?;
        if vault.admin_id != *user_id {
            return Err(Error::NotFoundOrUnauthorized);
        }
        Ok(vault)
    }

    // Crypto on the blocking pool

    async fn encrypt(
        &self,
        plaintext: Zeroizing<Vec<u8>>,
        password: Zeroizing<String>,
    ) -> Result<Sealed> {
        let engine = self.engine.clone();
        run_blocking(move || engine.encrypt(&plaintext, password.as_bytes())).await
    }

    async fn decrypt(
        &self,
        ciphertext: Vec<u8>,
        iv: Option<Vec<u8>>,
        password: Zeroizing<String>,
    ) -> Result<SensitiveBytes> {
        let engine = self.engine.clone();
        let result = run_blocking(move || {
            engine.decrypt(&ciphertext, password.as_bytes(), iv.as_deref())
        })
        .await;

        match result {
            Ok(plaintext) => Ok(SensitiveBytes::new(plaintext)),
            Err(Error::Internal(msg)) => Err(Error::Internal(msg)),
            Err(e) => {
                debug!(error = %e, "Decryption failed");
                Err(Error::Decryption)
            }
        }
    }
}
