//! SQLite-backed repository.
//!
//! A single connection is shared behind a mutex; every call runs on the
//! blocking pool so database I/O never stalls the async executor.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::repository::{HistorySlice, LockTransition, VaultRepository};
use strongroom_common::{
    Error, FileId, FileSummary, HistoryEntry, HistoryId, ItemId, LockState, PersonalVaultItem,
    Result, UnlockApproval, UserCredential, UserId, UserProfile, Vault, VaultFile, VaultId,
    VaultPin,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    email TEXT
);

CREATE TABLE IF NOT EXISTS credentials (
    user_id TEXT PRIMARY KEY,
    password_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS vaults (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    admin_id TEXT NOT NULL,
    is_active INTEGER NOT NULL,
    lock_opened_at INTEGER,
    lock_ttl_secs INTEGER,
    unlock_ttl_secs INTEGER NOT NULL,
    unlock_threshold INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS vault_members (
    vault_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    PRIMARY KEY (vault_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_members_user ON vault_members(user_id, vault_id);

CREATE TABLE IF NOT EXISTS vault_pins (
    vault_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    pin_hash TEXT NOT NULL,
    PRIMARY KEY (vault_id, user_id)
);

CREATE TABLE IF NOT EXISTS unlock_approvals (
    vault_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    approved_at INTEGER NOT NULL,
    PRIMARY KEY (vault_id, user_id)
);

CREATE TABLE IF NOT EXISTS vault_files (
    id TEXT PRIMARY KEY,
    vault_id TEXT NOT NULL,
    encrypted_data BLOB NOT NULL,
    iv BLOB,
    original_name TEXT NOT NULL,
    mime_type TEXT NOT NULL,
    size INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_files_vault ON vault_files(vault_id, created_at DESC);

CREATE TABLE IF NOT EXISTS personal_items (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    encrypted_data BLOB NOT NULL,
    iv BLOB,
    original_name TEXT NOT NULL,
    mime_type TEXT NOT NULL,
    size INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_owner ON personal_items(owner_id);

CREATE TABLE IF NOT EXISTS history (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    vault_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    file_id TEXT,
    action TEXT NOT NULL,
    details TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    ip_address TEXT,
    user_agent TEXT
);

CREATE INDEX IF NOT EXISTS idx_history_vault_time ON history(vault_id, timestamp DESC, seq DESC);
"#;

/// Membership predicate over `vaults v`: `?1` is the vault id, `?2` the user id.
const ACTIVE_MEMBER_FILTER: &str = "v.id = ?1 AND v.is_active = 1 AND (v.admin_id = ?2 \
     OR EXISTS (SELECT 1 FROM vault_members m WHERE m.vault_id = v.id AND m.user_id = ?2))";

const VAULT_COLUMNS: &str = "v.id, v.name, v.admin_id, v.is_active, v.lock_opened_at, \
     v.lock_ttl_secs, v.unlock_ttl_secs, v.unlock_threshold, v.created_at";

const FILE_COLUMNS: &str =
    "id, vault_id, encrypted_data, iv, original_name, mime_type, size, created_at";

const HISTORY_COLUMNS: &str =
    "id, vault_id, user_id, file_id, action, details, timestamp, ip_address, user_agent";

/// SQLite repository.
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Create or open a repository database and apply the schema.
    ///
    /// # Errors
    /// - Database creation or migration failure
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(db_err)?;
        Self::init(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        info!("SQLite repository opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| {
                Error::RepositoryUnavailable("sqlite connection poisoned".to_string())
            })?;
            f(&mut *guard).map_err(db_err)
        })
        .await
        .map_err(|e| Error::Internal(format!("database task failed: {}", e)))?
    }
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::RepositoryUnavailable(e.to_string())
}

fn conversion_err(idx: usize, ty: Type, e: Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(e))
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn get_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        conversion_err(
            idx,
            Type::Integer,
            Error::Serialization(format!("timestamp out of range: {}", micros)),
        )
    })
}

fn get_u64(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value).map_err(|_| {
        conversion_err(
            idx,
            Type::Integer,
            Error::Serialization(format!("negative value: {}", value)),
        )
    })
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn get_id<T>(
    row: &Row<'_>,
    idx: usize,
    make: impl FnOnce(String) -> Result<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    make(raw).map_err(|e| conversion_err(idx, Type::Text, e))
}

fn lock_columns(state: &LockState) -> (Option<i64>, Option<i64>) {
    match state {
        LockState::Locked => (None, None),
        LockState::Unlocked {
            opened_at,
            ttl_secs,
        } => (Some(to_micros(*opened_at)), Some(to_i64(*ttl_secs))),
    }
}

fn vault_from_row(row: &Row<'_>) -> rusqlite::Result<Vault> {
    let opened_at: Option<i64> = row.get(4)?;
    let lock_state = match opened_at {
        None => LockState::Locked,
        Some(_) => LockState::Unlocked {
            opened_at: get_time(row, 4)?,
            ttl_secs: get_u64(row, 5)?,
        },
    };
    let threshold = get_u64(row, 7)?;

    Ok(Vault {
        id: get_id(row, 0, VaultId::new)?,
        name: row.get(1)?,
        admin_id: get_id(row, 2, UserId::new)?,
        member_ids: BTreeSet::new(),
        is_active: row.get::<_, i64>(3)? != 0,
        lock_state,
        unlock_ttl_secs: get_u64(row, 6)?,
        unlock_threshold: u32::try_from(threshold).unwrap_or(u32::MAX),
        created_at: get_time(row, 8)?,
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<VaultFile> {
    Ok(VaultFile {
        id: get_id(row, 0, FileId::new)?,
        vault_id: get_id(row, 1, VaultId::new)?,
        encrypted_data: row.get(2)?,
        iv: row.get(3)?,
        original_name: row.get(4)?,
        mime_type: row.get(5)?,
        size: get_u64(row, 6)?,
        created_at: get_time(row, 7)?,
    })
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let file_id: Option<String> = row.get(3)?;
    let action: String = row.get(4)?;

    Ok(HistoryEntry {
        id: get_id(row, 0, HistoryId::new)?,
        vault_id: get_id(row, 1, VaultId::new)?,
        user_id: get_id(row, 2, UserId::new)?,
        file_id: file_id
            .map(FileId::new)
            .transpose()
            .map_err(|e| conversion_err(3, Type::Text, e))?,
        action: action
            .parse()
            .map_err(|e| conversion_err(4, Type::Text, e))?,
        details: row.get(5)?,
        timestamp: get_time(row, 6)?,
        ip_address: row.get(7)?,
        user_agent: row.get(8)?,
    })
}

fn insert_history(conn: &Connection, entry: &HistoryEntry) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO history ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            HISTORY_COLUMNS
        ),
        params![
            entry.id.as_str(),
            entry.vault_id.as_str(),
            entry.user_id.as_str(),
            entry.file_id.as_ref().map(|id| id.as_str()),
            entry.action.as_str(),
            entry.details,
            to_micros(entry.timestamp),
            entry.ip_address,
            entry.user_agent,
        ],
    )?;
    Ok(())
}

fn placeholders(count: usize, first: usize) -> String {
    (first..first + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl VaultRepository for SqliteRepository {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn upsert_user(&self, profile: UserProfile) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO users (id, display_name, email) VALUES (?1, ?2, ?3)",
                params![profile.id.as_str(), profile.display_name, profile.email],
            )?;
            Ok(())
        })
        .await
    }

    async fn find_users(&self, ids: &[UserId]) -> Result<Vec<UserProfile>> {
        let ids: BTreeSet<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT id, display_name, email FROM users WHERE id IN ({})",
                placeholders(ids.len(), 1)
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
                Ok(UserProfile {
                    id: get_id(row, 0, UserId::new)?,
                    display_name: row.get(1)?,
                    email: row.get(2)?,
                })
            })?;
            rows.collect()
        })
        .await
    }

    async fn put_credential(&self, credential: UserCredential) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO credentials (user_id, password_hash) VALUES (?1, ?2)",
                params![credential.user_id.as_str(), credential.password_hash],
            )?;
            Ok(())
        })
        .await
    }

    async fn find_credential(&self, user_id: &UserId) -> Result<Option<UserCredential>> {
        let user_id = user_id.clone();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT password_hash FROM credentials WHERE user_id = ?1",
                [user_id.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map(|hash| {
                hash.map(|password_hash| UserCredential {
                    user_id,
                    password_hash,
                })
            })
        })
        .await
    }

    async fn insert_vault(&self, vault: Vault) -> Result<()> {
        debug!(vault_id = %vault.id, "Inserting vault");
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let (opened_at, ttl) = lock_columns(&vault.lock_state);
            tx.execute(
                "INSERT INTO vaults (id, name, admin_id, is_active, lock_opened_at, lock_ttl_secs, \
                 unlock_ttl_secs, unlock_threshold, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    vault.id.as_str(),
                    vault.name,
                    vault.admin_id.as_str(),
                    vault.is_active as i64,
                    opened_at,
                    ttl,
                    to_i64(vault.unlock_ttl_secs),
                    i64::from(vault.unlock_threshold),
                    to_micros(vault.created_at),
                ],
            )?;
            for member in &vault.member_ids {
                tx.execute(
                    "INSERT OR IGNORE INTO vault_members (vault_id, user_id) VALUES (?1, ?2)",
                    params![vault.id.as_str(), member.as_str()],
                )?;
            }
            tx.commit()
        })
        .await
    }

    async fn find_active_vault_for_member(
        &self,
        vault_id: &VaultId,
        user_id: &UserId,
    ) -> Result<Option<Vault>> {
        let vault_id = vault_id.clone();
        let user_id = user_id.clone();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM vaults v WHERE {}",
                VAULT_COLUMNS, ACTIVE_MEMBER_FILTER
            );
            let vault = conn
                .query_row(
                    &sql,
                    params![vault_id.as_str(), user_id.as_str()],
                    vault_from_row,
                )
                .optional()?;

            let Some(mut vault) = vault else {
                return Ok(None);
            };

            let mut stmt =
                conn.prepare("SELECT user_id FROM vault_members WHERE vault_id = ?1")?;
            let members = stmt.query_map([vault_id.as_str()], |row| {
                get_id(row, 0, UserId::new)
            })?;
            vault.member_ids = members.collect::<rusqlite::Result<_>>()?;
            Ok(Some(vault))
        })
        .await
    }

    async fn add_member(&self, vault_id: &VaultId, user_id: &UserId) -> Result<bool> {
        let vault_id = vault_id.clone();
        let user_id = user_id.clone();
        let outcome = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let admin: Option<String> = tx
                    .query_row(
                        "SELECT admin_id FROM vaults WHERE id = ?1 AND is_active = 1",
                        [vault_id.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;
                let added = match admin {
                    None => None,
                    Some(admin) if admin == user_id.as_str() => Some(false),
                    Some(_) => Some(
                        tx.execute(
                            "INSERT OR IGNORE INTO vault_members (vault_id, user_id) \
                             VALUES (?1, ?2)",
                            params![vault_id.as_str(), user_id.as_str()],
                        )? == 1,
                    ),
                };
                tx.commit()?;
                Ok(added)
            })
            .await?;
        outcome.ok_or(Error::NotFoundOrUnauthorized)
    }

    async fn deactivate_vault(&self, vault_id: &VaultId, entry: HistoryEntry) -> Result<bool> {
        let vault_id = vault_id.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE vaults SET is_active = 0 WHERE id = ?1 AND is_active = 1",
                [vault_id.as_str()],
            )?;
            if changed == 1 {
                insert_history(&tx, &entry)?;
            }
            tx.commit()?;
            Ok(changed == 1)
        })
        .await
    }

    async fn swap_lock_state(
        &self,
        vault_id: &VaultId,
        transition: LockTransition,
    ) -> Result<bool> {
        let vault_id = vault_id.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let (expected_opened, expected_ttl) = lock_columns(&transition.expected);
            let (next_opened, next_ttl) = lock_columns(&transition.next);

            let changed = tx.execute(
                "UPDATE vaults SET lock_opened_at = ?1, lock_ttl_secs = ?2 \
                 WHERE id = ?3 AND is_active = 1 \
                 AND lock_opened_at IS ?4 AND lock_ttl_secs IS ?5",
                params![
                    next_opened,
                    next_ttl,
                    vault_id.as_str(),
                    expected_opened,
                    expected_ttl
                ],
            )?;
            if changed != 1 {
                return Ok(false);
            }

            if let Some(entry) = &transition.entry {
                insert_history(&tx, entry)?;
            }
            if transition.clear_approvals {
                tx.execute(
                    "DELETE FROM unlock_approvals WHERE vault_id = ?1",
                    [vault_id.as_str()],
                )?;
            }
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn put_vault_pin(&self, pin: VaultPin) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO vault_pins (vault_id, user_id, pin_hash) \
                 VALUES (?1, ?2, ?3)",
                params![pin.vault_id.as_str(), pin.user_id.as_str(), pin.pin_hash],
            )?;
            Ok(())
        })
        .await
    }

    async fn find_vault_pin(
        &self,
        vault_id: &VaultId,
        user_id: &UserId,
    ) -> Result<Option<VaultPin>> {
        let vault_id = vault_id.clone();
        let user_id = user_id.clone();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT pin_hash FROM vault_pins WHERE vault_id = ?1 AND user_id = ?2",
                params![vault_id.as_str(), user_id.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map(|hash| {
                hash.map(|pin_hash| VaultPin {
                    vault_id,
                    user_id,
                    pin_hash,
                })
            })
        })
        .await
    }

    async fn record_unlock_approval(&self, approval: UnlockApproval) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO unlock_approvals (vault_id, user_id, approved_at) \
                 VALUES (?1, ?2, ?3)",
                params![
                    approval.vault_id.as_str(),
                    approval.user_id.as_str(),
                    to_micros(approval.approved_at)
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_unlock_approvals(&self, vault_id: &VaultId) -> Result<Vec<UnlockApproval>> {
        let vault_id = vault_id.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT vault_id, user_id, approved_at FROM unlock_approvals WHERE vault_id = ?1",
            )?;
            let rows = stmt.query_map([vault_id.as_str()], |row| {
                Ok(UnlockApproval {
                    vault_id: get_id(row, 0, VaultId::new)?,
                    user_id: get_id(row, 1, UserId::new)?,
                    approved_at: get_time(row, 2)?,
                })
            })?;
            rows.collect()
        })
        .await
    }

    async fn insert_file(&self, file: VaultFile) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO vault_files ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    FILE_COLUMNS
                ),
                params![
                    file.id.as_str(),
                    file.vault_id.as_str(),
                    file.encrypted_data,
                    file.iv,
                    file.original_name,
                    file.mime_type,
                    to_i64(file.size),
                    to_micros(file.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn find_file_in_vault(
        &self,
        vault_id: &VaultId,
        file_id: &FileId,
    ) -> Result<Option<VaultFile>> {
        let vault_id = vault_id.clone();
        let file_id = file_id.clone();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM vault_files WHERE id = ?1 AND vault_id = ?2",
                    FILE_COLUMNS
                ),
                params![file_id.as_str(), vault_id.as_str()],
                file_from_row,
            )
            .optional()
        })
        .await
    }

    async fn find_file_names(
        &self,
        vault_id: &VaultId,
        file_ids: &[FileId],
    ) -> Result<Vec<(FileId, String)>> {
        let ids: BTreeSet<String> = file_ids.iter().map(|id| id.as_str().to_string()).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let vault_id = vault_id.clone();

        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT id, original_name FROM vault_files WHERE vault_id = ?1 AND id IN ({})",
                placeholders(ids.len(), 2)
            );
            let mut bind = vec![vault_id.as_str().to_string()];
            bind.extend(ids);

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(bind.iter()), |row| {
                Ok((get_id(row, 0, FileId::new)?, row.get(1)?))
            })?;
            rows.collect()
        })
        .await
    }

    async fn list_files(&self, vault_id: &VaultId) -> Result<Vec<FileSummary>> {
        let vault_id = vault_id.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, original_name, mime_type, size, created_at FROM vault_files \
                 WHERE vault_id = ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map([vault_id.as_str()], |row| {
                Ok(FileSummary {
                    id: get_id(row, 0, FileId::new)?,
                    original_name: row.get(1)?,
                    mime_type: row.get(2)?,
                    size: get_u64(row, 3)?,
                    created_at: get_time(row, 4)?,
                })
            })?;
            rows.collect()
        })
        .await
    }

    async fn insert_personal_item(&self, item: PersonalVaultItem) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO personal_items (id, owner_id, encrypted_data, iv, original_name, \
                 mime_type, size, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    item.id.as_str(),
                    item.owner_id.as_str(),
                    item.encrypted_data,
                    item.iv,
                    item.original_name,
                    item.mime_type,
                    to_i64(item.size),
                    to_micros(item.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn find_personal_item(
        &self,
        owner_id: &UserId,
        item_id: &ItemId,
    ) -> Result<Option<PersonalVaultItem>> {
        let owner_id = owner_id.clone();
        let item_id = item_id.clone();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, owner_id, encrypted_data, iv, original_name, mime_type, size, \
                 created_at FROM personal_items WHERE id = ?1 AND owner_id = ?2",
                params![item_id.as_str(), owner_id.as_str()],
                |row| {
                    Ok(PersonalVaultItem {
                        id: get_id(row, 0, ItemId::new)?,
                        owner_id: get_id(row, 1, UserId::new)?,
                        encrypted_data: row.get(2)?,
                        iv: row.get(3)?,
                        original_name: row.get(4)?,
                        mime_type: row.get(5)?,
                        size: get_u64(row, 6)?,
                        created_at: get_time(row, 7)?,
                    })
                },
            )
            .optional()
        })
        .await
    }

    async fn append_history(&self, entry: HistoryEntry) -> Result<()> {
        self.with_conn(move |conn| insert_history(conn, &entry)).await
    }

    async fn list_history(
        &self,
        vault_id: &VaultId,
        limit: usize,
        offset: usize,
    ) -> Result<HistorySlice> {
        let vault_id = vault_id.clone();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);

        self.with_conn(move |conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM history WHERE vault_id = ?1",
                [vault_id.as_str()],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM history WHERE vault_id = ?1 \
                 ORDER BY timestamp DESC, seq DESC LIMIT ?2 OFFSET ?3",
                HISTORY_COLUMNS
            ))?;
            let entries = stmt
                .query_map(params![vault_id.as_str(), limit, offset], history_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(HistorySlice {
                entries,
                total: u64::try_from(total).unwrap_or(0),
            })
        })
        .await
    }
}
