//! Repository abstraction for Strongroom.
//!
//! The vault services talk to persistence only through the
//! [`VaultRepository`] trait, injected at construction.
//!
//! # Design Principles
//! - Typed queries: the membership predicate lives in one named place
//!   per backend, never rebuilt at call sites
//! - Atomic lock transitions: state change and audit entry commit together
//! - Async operations: backends may block only on the blocking pool

pub mod memory;
pub mod repository;
pub mod sqlite;

#[cfg(test)]
mod conformance;

pub use memory::MemoryRepository;
pub use repository::{HistorySlice, LockTransition, VaultRepository};
pub use sqlite::SqliteRepository;
