//! Vault access-control and encryption core for Strongroom.
//!
//! This module provides:
//! - The lock gate every privileged operation passes through, including
//!   auto-lock on TTL expiry
//! - Quorum unlock by member PINs, and explicit lock
//! - Download, preview, and upload of encrypted files
//! - Personal vault items gated by the owner's password
//! - An append-only, paginated audit trail
//!
//! # Architecture
//! The routing layer validates requests into typed values, resolves the
//! principal, and calls [`VaultOperationService`]. The service owns no
//! state of its own; persistence goes through an injected
//! [`VaultRepository`](strongroom_storage::VaultRepository) and time through
//! an injected [`Clock`].

pub mod access;
pub mod audit;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod operations;
pub mod request;
pub mod unlock;

#[cfg(test)]
mod testing;

pub use access::VaultAccessController;
pub use audit::{AuditLogger, HistoryPage, HistoryRecord, Pagination};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ServiceConfig;
pub use delivery::{FileDownload, Preview, TextPreview};
pub use operations::{NewVault, VaultOperationService};
pub use request::{
    require_principal, FileAccess, FileRequest, HistoryQuery, HistoryRequest, NewFile,
    PersonalItemAccess, PersonalItemRequest, UnlockRequest, UnlockSubmission,
};
pub use unlock::{UnlockCoordinator, UnlockProgress};

use strongroom_common::{Error, Result};

/// Run CPU-bound work (key derivation, AEAD) on the blocking pool.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Internal(format!("blocking task failed: {}", e)))?
}
