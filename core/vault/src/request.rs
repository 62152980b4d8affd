//! Request structs accepted from the routing layer.
//!
//! Raw requests carry optional fields exactly as they arrive. `validate`
//! turns them into typed values before any service is called, so the core
//! never sees a missing parameter.

use serde::Deserialize;
use std::fmt;
use zeroize::Zeroizing;

use crate::config::ServiceConfig;
use strongroom_common::{Error, FileId, ItemId, Result, UserId, VaultId};

/// Fallback MIME type for uploads that do not declare one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Resolve the caller's principal or fail with `Unauthenticated`.
pub fn require_principal(principal: Option<&str>) -> Result<UserId> {
    match principal.map(str::trim) {
        Some(id) if !id.is_empty() => UserId::new(id),
        _ => Err(Error::Unauthenticated),
    }
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Validation(format!("{} is required", name))),
    }
}

fn required_secret(value: Option<String>, name: &str) -> Result<Zeroizing<String>> {
    let value = Zeroizing::new(value.unwrap_or_default());
    if value.is_empty() {
        return Err(Error::Validation(format!("{} is required", name)));
    }
    Ok(value)
}

/// Download or preview of a shared-vault file.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRequest {
    pub vault_id: Option<String>,
    pub file_id: Option<String>,
    pub password: Option<String>,
}

impl FileRequest {
    pub fn validate(self) -> Result<FileAccess> {
        Ok(FileAccess {
            vault_id: VaultId::new(required(self.vault_id, "vaultId")?)?,
            file_id: FileId::new(required(self.file_id, "fileId")?)?,
            password: required_secret(self.password, "password")?,
        })
    }
}

impl fmt::Debug for FileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRequest")
            .field("vault_id", &self.vault_id)
            .field("file_id", &self.file_id)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Validated [`FileRequest`].
pub struct FileAccess {
    pub vault_id: VaultId,
    pub file_id: FileId,
    pub password: Zeroizing<String>,
}

impl fmt::Debug for FileAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileAccess")
            .field("vault_id", &self.vault_id)
            .field("file_id", &self.file_id)
            .finish_non_exhaustive()
    }
}

/// Paginated history listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    pub vault_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl HistoryRequest {
    /// Validate and apply paging defaults and bounds from `config`.
    pub fn validate(self, config: &ServiceConfig) -> Result<HistoryQuery> {
        let limit = self
            .limit
            .unwrap_or(config.history_default_limit)
            .clamp(1, config.history_max_limit);

        Ok(HistoryQuery {
            vault_id: VaultId::new(required(self.vault_id, "vaultId")?)?,
            limit,
            offset: self.offset.unwrap_or(0),
        })
    }
}

/// Validated [`HistoryRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub vault_id: VaultId,
    pub limit: usize,
    pub offset: usize,
}

/// Download or preview of a personal vault item.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalItemRequest {
    pub item_id: Option<String>,
    pub password: Option<String>,
}

impl PersonalItemRequest {
    pub fn validate(self) -> Result<PersonalItemAccess> {
        Ok(PersonalItemAccess {
            item_id: ItemId::new(required(self.item_id, "itemId")?)?,
            password: required_secret(self.password, "password")?,
        })
    }
}

impl fmt::Debug for PersonalItemRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersonalItemRequest")
            .field("item_id", &self.item_id)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Validated [`PersonalItemRequest`].
pub struct PersonalItemAccess {
    pub item_id: ItemId,
    pub password: Zeroizing<String>,
}

/// A member submitting their PIN toward unlocking a vault.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockRequest {
    pub vault_id: Option<String>,
    pub pin: Option<String>,
}

impl UnlockRequest {
    pub fn validate(self) -> Result<UnlockSubmission> {
        Ok(UnlockSubmission {
            vault_id: VaultId::new(required(self.vault_id, "vaultId")?)?,
            pin: required_secret(self.pin, "pin")?,
        })
    }
}

impl fmt::Debug for UnlockRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockRequest")
            .field("vault_id", &self.vault_id)
            .field("pin", &"[REDACTED]")
            .finish()
    }
}

/// Validated [`UnlockRequest`].
pub struct UnlockSubmission {
    pub vault_id: VaultId,
    pub pin: Zeroizing<String>,
}

/// File content supplied for upload.
pub struct NewFile {
    pub original_name: String,
    pub mime_type: String,
    pub content: Zeroizing<Vec<u8>>,
}

impl NewFile {
    /// Validate the name and default the MIME type.
    pub fn new(
        original_name: impl Into<String>,
        mime_type: Option<String>,
        content: Vec<u8>,
    ) -> Result<Self> {
        let original_name = original_name.into();
        if original_name.trim().is_empty() {
            return Err(Error::Validation("file name is required".to_string()));
        }
        if original_name.contains(['/', '\\', '\0']) {
            return Err(Error::Validation(
                "file name cannot contain path separators".to_string(),
            ));
        }

        let mime_type = mime_type
            .map(|m| m.trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

        Ok(Self {
            original_name,
            mime_type,
            content: Zeroizing::new(content),
        })
    }
}

impl fmt::Debug for NewFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewFile")
            .field("original_name", &self.original_name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.content.len())
            .finish()
    }
}
