//! Storage back-ends for sessions and revocations
//!
//! A back-end keeps two disjoint sets: active sessions bucketed per user and
//! the flat revocation set. A session is in exactly one of three states from
//! the store's point of view: active, revoked, or absent (never seen or
//! garbage-collected). Revoked records carry the session body only, never the
//! agent info.
//!
//! Two implementations share the contract:
//! - [`InMemoryBackend`]: plain maps behind a reader/writer lock, no
//!   durability; enough for verify-only peers that just mirror revocations
//! - [`RedbBackend`]: a single-file embedded B+tree for signing instances

pub mod memory;
pub mod redb;

pub use memory::InMemoryBackend;
pub use self::redb::RedbBackend;

use async_trait::async_trait;
use std::fmt::Debug;

use sso_core::{Session, SessionFull, SessionFullList, SessionId, SessionList};

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An expected table is missing from the database file
    #[error("store schema is corrupt: {0}")]
    CorruptSchema(String),

    /// `save` collided on a session id
    #[error("session '{0}' already exists")]
    DuplicateId(SessionId),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Underlying storage failure
    #[error("storage error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Storage back-end contract for session state
///
/// Implementations must be safe for concurrent callers: reads may run in
/// parallel, writes are serialized.
#[async_trait]
pub trait SessionBackend: Send + Sync + Debug {
    /// Human-readable back-end identifier, used in logs.
    fn name(&self) -> String;

    /// Insert a freshly minted session into the user's active bucket.
    /// Fails with [`StorageError::DuplicateId`] if the id is already taken
    /// for that user.
    async fn save(&self, session: SessionFull) -> Result<(), StorageError>;

    /// All non-expired active sessions of `username`, in creation order.
    async fn list_user(&self, username: &str) -> Result<SessionFullList, StorageError>;

    /// Move a session into the revoked set. The session need not be in the
    /// active bucket; revocations received from peers land here too.
    async fn revoke(&self, session: Session) -> Result<(), StorageError>;

    /// Revoke by id, sourcing the session body from the current active
    /// record. The stored agent info is dropped in the process. A miss is
    /// not an error.
    async fn revoke_id(&self, username: &str, id: SessionId) -> Result<(), StorageError>;

    /// Whether the session's id is in the revoked set.
    async fn is_revoked(&self, session: &Session) -> Result<bool, StorageError>;

    /// All non-expired revoked sessions, in creation order.
    async fn list_revoked(&self) -> Result<SessionList, StorageError>;

    /// Merge an externally sourced revocation list; returns how many entries
    /// were previously unknown.
    async fn load_revocations(&self, list: SessionList) -> Result<usize, StorageError>;

    /// Delete all expired entries from both sets; returns the number of
    /// active sessions removed.
    async fn collect_garbage(&self) -> Result<usize, StorageError>;
}
