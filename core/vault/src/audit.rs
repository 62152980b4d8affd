//! Append-only audit trail and its enriched, paginated read view.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::warn;

use crate::clock::Clock;
use strongroom_common::{
    ClientMeta, FileId, HistoryAction, HistoryEntry, HistoryId, Result, UserId, Vault, VaultId,
};
use strongroom_storage::VaultRepository;

/// Acting user as shown in history listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorSummary {
    pub id: UserId,
    /// `None` when no profile is on record.
    pub display_name: Option<String>,
    pub email: Option<String>,
}

/// Related file as shown in history listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub id: FileId,
    pub original_name: Option<String>,
}

/// A history entry joined with user and file display data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: HistoryId,
    pub action: HistoryAction,
    pub details: String,
    pub timestamp: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub user: ActorSummary,
    pub file: Option<FileRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultRef {
    pub id: VaultId,
    pub name: String,
}

/// Response shape of a history listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryPage {
    pub history: Vec<HistoryRecord>,
    pub pagination: Pagination,
    pub vault: VaultRef,
}

/// Writes and reads vault history.
#[derive(Clone)]
pub struct AuditLogger {
    repo: Arc<dyn VaultRepository>,
    clock: Arc<dyn Clock>,
}

impl AuditLogger {
    pub fn new(repo: Arc<dyn VaultRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// Build an entry stamped with the current time without storing it.
    pub fn entry(
        &self,
        vault_id: &VaultId,
        user_id: &UserId,
        action: HistoryAction,
        details: impl Into<String>,
        file_id: Option<&FileId>,
        meta: &ClientMeta,
    ) -> HistoryEntry {
        HistoryEntry::new(
            vault_id.clone(),
            user_id.clone(),
            action,
            details,
            file_id.cloned(),
            meta,
            self.clock.now(),
        )
    }

    /// Append an entry.
    ///
    /// # Errors
    /// - `RepositoryUnavailable` if the store cannot be written
    pub async fn append(
        &self,
        vault_id: &VaultId,
        user_id: &UserId,
        action: HistoryAction,
        details: impl Into<String>,
        file_id: Option<&FileId>,
        meta: &ClientMeta,
    ) -> Result<HistoryEntry> {
        let entry = self.entry(vault_id, user_id, action, details, file_id, meta);
        self.repo.append_history(entry.clone()).await?;
        Ok(entry)
    }

    /// Append an entry, logging and discarding any failure.
    ///
    /// Used on read paths where losing the audit record must not fail
    /// the request.
    pub async fn record_best_effort(
        &self,
        vault_id: &VaultId,
        user_id: &UserId,
        action: HistoryAction,
        details: impl Into<String>,
        file_id: Option<&FileId>,
        meta: &ClientMeta,
    ) -> Option<HistoryEntry> {
        match self
            .append(vault_id, user_id, action, details, file_id, meta)
            .await
        {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(vault_id = %vault_id, action = %action, error = %e, "Failed to record history entry");
                None
            }
        }
    }

    /// List a page of history, newest first, with user and file names.
    ///
    /// Names are fetched with one batch query for users and one for files,
    /// whatever the page size.
    pub async fn list(&self, vault: &Vault, limit: usize, offset: usize) -> Result<HistoryPage> {
        let slice = self.repo.list_history(&vault.id, limit, offset).await?;

        let user_ids: Vec<UserId> = slice
            .entries
            .iter()
            .map(|e| e.user_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let file_ids: Vec<FileId> = slice
            .entries
            .iter()
            .filter_map(|e| e.file_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let profiles: HashMap<UserId, _> = if user_ids.is_empty() {
            HashMap::new()
        } else {
            self.repo
                .find_users(&user_ids)
                .await?
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect()
        };
        let file_names: HashMap<FileId, String> = if file_ids.is_empty() {
            HashMap::new()
        } else {
            self.repo
                .find_file_names(&vault.id, &file_ids)
                .await?
                .into_iter()
                .collect()
        };

        let history = slice
            .entries
            .into_iter()
            .map(|entry| {
                let profile = profiles.get(&entry.user_id);
                HistoryRecord {
                    user: ActorSummary {
                        display_name: profile.map(|p| p.display_name.clone()),
                        email: profile.and_then(|p| p.email.clone()),
                        id: entry.user_id,
                    },
                    file: entry.file_id.map(|id| FileRef {
                        original_name: file_names.get(&id).cloned(),
                        id,
                    }),
                    id: entry.id,
                    action: entry.action,
                    details: entry.details,
                    timestamp: entry.timestamp,
                    ip_address: entry.ip_address,
                    user_agent: entry.user_agent,
                }
            })
            .collect();

        let has_more = (offset as u64).saturating_add(limit as u64) < slice.total;
        Ok(HistoryPage {
            history,
            pagination: Pagination {
                total: slice.total,
                limit,
                offset,
                has_more,
            },
            vault: VaultRef {
                id: vault.id.clone(),
                name: vault.name.clone(),
            },
        })
    }
}
