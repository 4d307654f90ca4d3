//! Embedded storage back-end on top of redb
//!
//! One database file, exclusively locked while the process runs. Two tables:
//!
//! - `sessions`: `(username, session-id bytes)` → JSON session body + agent
//! - `revoked`: session-id bytes → JSON session body
//!
//! Keys embed the raw 16-byte session id, so ordered iteration yields
//! sessions in creation order. Values stay JSON so the file can be inspected
//! with standard tooling.

use async_trait::async_trait;
use redb::{Database, DatabaseError, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sso_core::{AgentInfo, Session, SessionBase, SessionFull, SessionFullList, SessionId, SessionList};

use super::{SessionBackend, StorageError};

const SESSIONS_TABLE: TableDefinition<(&str, &[u8; 16]), &[u8]> = TableDefinition::new("sessions");
const REVOKED_TABLE: TableDefinition<&[u8; 16], &[u8]> = TableDefinition::new("revoked");

const MIN_ID: [u8; 16] = [0x00; 16];
const MAX_ID: [u8; 16] = [0xff; 16];

/// How long to retry acquiring the exclusive file lock before giving up.
const LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Stored form of an active session; the revoked table stores the bare
/// [`SessionBase`] instead.
#[derive(Serialize, Deserialize)]
struct StoredSession {
    #[serde(flatten)]
    base: SessionBase,
    agent: AgentInfo,
}

/// Embedded session store implementation
pub struct RedbBackend {
    db: Database,
    path: PathBuf,
}

impl fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish()
    }
}

impl From<redb::TransactionError> for StorageError {
    fn from(err: redb::TransactionError) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<redb::TableError> for StorageError {
    fn from(err: redb::TableError) -> Self {
        match err {
            redb::TableError::TableDoesNotExist(name) => {
                StorageError::CorruptSchema(format!("table '{}' does not exist", name))
            }
            other => StorageError::Io(other.to_string()),
        }
    }
}

impl From<redb::StorageError> for StorageError {
    fn from(err: redb::StorageError) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<redb::CommitError> for StorageError {
    fn from(err: redb::CommitError) -> Self {
        StorageError::Io(err.to_string())
    }
}

fn is_lock_contention(err: &DatabaseError) -> bool {
    match err {
        DatabaseError::DatabaseAlreadyOpen => true,
        DatabaseError::Storage(redb::StorageError::Io(err)) => err.kind() == ErrorKind::WouldBlock,
        _ => false,
    }
}

impl RedbBackend {
    /// Open (or create) the database file and make sure both tables exist.
    /// The file is locked exclusively; contention is retried for up to one
    /// second and is fatal after that.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let deadline = Instant::now() + LOCK_TIMEOUT;
        let db = loop {
            match Database::create(path) {
                Ok(db) => break db,
                Err(err) if is_lock_contention(&err) => {
                    if Instant::now() >= deadline {
                        return Err(StorageError::Io(format!(
                            "failed to acquire exclusive lock for session database '{}'",
                            path.display()
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(err) => return Err(StorageError::Io(err.to_string())),
            }
        };

        let txn = db.begin_write()?;
        {
            txn.open_table(SESSIONS_TABLE)?;
            txn.open_table(REVOKED_TABLE)?;
        }
        txn.commit()?;

        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }
}

#[async_trait]
impl SessionBackend for RedbBackend {
    fn name(&self) -> String {
        format!("redb({})", self.path.display())
    }

    async fn save(&self, session: SessionFull) -> Result<(), StorageError> {
        let id = session.session.id;
        let id_bytes = id.to_bytes();
        let username = session.session.base.username.clone();
        let value = serde_json::to_vec(&StoredSession {
            base: session.session.base,
            agent: session.agent,
        })?;

        let txn = self.db.begin_write()?;
        {
            let mut sessions = txn.open_table(SESSIONS_TABLE)?;
            let key = (username.as_str(), &id_bytes);
            if sessions.get(key)?.is_some() {
                return Err(StorageError::DuplicateId(id));
            }
            sessions.insert(key, value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    async fn list_user(&self, username: &str) -> Result<SessionFullList, StorageError> {
        let txn = self.db.begin_read()?;
        let sessions = txn.open_table(SESSIONS_TABLE)?;

        let mut list = SessionFullList::new();
        for entry in sessions.range((username, &MIN_ID)..=(username, &MAX_ID))? {
            let (key, value) = entry?;
            let stored: StoredSession = serde_json::from_slice(value.value())?;
            if !stored.base.is_expired() {
                let (_, id_bytes) = key.value();
                list.push(SessionFull {
                    session: Session {
                        id: SessionId::from_bytes(*id_bytes),
                        base: stored.base,
                    },
                    agent: stored.agent,
                });
            }
        }
        Ok(list)
    }

    async fn revoke(&self, session: Session) -> Result<(), StorageError> {
        let id_bytes = session.id.to_bytes();
        let value = serde_json::to_vec(&session.base)?;

        let txn = self.db.begin_write()?;
        {
            let mut sessions = txn.open_table(SESSIONS_TABLE)?;
            sessions.remove((session.base.username.as_str(), &id_bytes))?;
            let mut revoked = txn.open_table(REVOKED_TABLE)?;
            revoked.insert(&id_bytes, value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    async fn revoke_id(&self, username: &str, id: SessionId) -> Result<(), StorageError> {
        let id_bytes = id.to_bytes();

        let txn = self.db.begin_write()?;
        {
            let mut sessions = txn.open_table(SESSIONS_TABLE)?;
            let key = (username, &id_bytes);
            let stored = match sessions.get(key)? {
                Some(guard) => guard.value().to_vec(),
                None => return Ok(()),
            };
            // decode only the session body so the revocation entry drops the
            // agent info
            let base: SessionBase = serde_json::from_slice(&stored)?;
            sessions.remove(key)?;
            let mut revoked = txn.open_table(REVOKED_TABLE)?;
            revoked.insert(&id_bytes, serde_json::to_vec(&base)?.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    async fn is_revoked(&self, session: &Session) -> Result<bool, StorageError> {
        let txn = self.db.begin_read()?;
        let revoked = txn.open_table(REVOKED_TABLE)?;
        Ok(revoked.get(&session.id.to_bytes())?.is_some())
    }

    async fn list_revoked(&self) -> Result<SessionList, StorageError> {
        let txn = self.db.begin_read()?;
        let revoked = txn.open_table(REVOKED_TABLE)?;

        let mut list = SessionList::new();
        for entry in revoked.iter()? {
            let (key, value) = entry?;
            let base: SessionBase = serde_json::from_slice(value.value())?;
            if !base.is_expired() {
                list.push(Session {
                    id: SessionId::from_bytes(*key.value()),
                    base,
                });
            }
        }
        Ok(list)
    }

    async fn load_revocations(&self, list: SessionList) -> Result<usize, StorageError> {
        let mut added = 0;
        let txn = self.db.begin_write()?;
        {
            let mut revoked = txn.open_table(REVOKED_TABLE)?;
            for session in list {
                let id_bytes = session.id.to_bytes();
                if revoked.get(&id_bytes)?.is_none() {
                    revoked.insert(&id_bytes, serde_json::to_vec(&session.base)?.as_slice())?;
                    added += 1;
                }
            }
        }
        txn.commit()?;
        Ok(added)
    }

    async fn collect_garbage(&self) -> Result<usize, StorageError> {
        let removed;
        let txn = self.db.begin_write()?;
        {
            let mut sessions = txn.open_table(SESSIONS_TABLE)?;
            let mut expired = Vec::new();
            for entry in sessions.iter()? {
                let (key, value) = entry?;
                // values in both tables start with the session body, which is
                // all expiry needs
                let base: SessionBase = serde_json::from_slice(value.value())?;
                if base.is_expired() {
                    let (username, id_bytes) = key.value();
                    expired.push((username.to_string(), *id_bytes));
                }
            }
            for (username, id_bytes) in &expired {
                sessions.remove((username.as_str(), id_bytes))?;
            }
            removed = expired.len();

            let mut revoked = txn.open_table(REVOKED_TABLE)?;
            let mut expired_revoked = Vec::new();
            for entry in revoked.iter()? {
                let (key, value) = entry?;
                let base: SessionBase = serde_json::from_slice(value.value())?;
                if base.is_expired() {
                    expired_revoked.push(*key.value());
                }
            }
            for id_bytes in &expired_revoked {
                revoked.remove(id_bytes)?;
            }
        }
        txn.commit()?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sso_core::DeviceType;
    use std::time::Duration;
    use tempfile::TempDir;

    fn full_session(username: &str, lifetime_secs: i64) -> SessionFull {
        let mut base = SessionBase::new(username, Duration::from_secs(0));
        base.expires += lifetime_secs;
        SessionFull {
            session: Session {
                id: SessionId::new(),
                base,
            },
            agent: AgentInfo {
                name: "Firefox".into(),
                os: "Linux".into(),
                device_type: DeviceType::Desktop,
            },
        }
    }

    fn open_backend(dir: &TempDir) -> RedbBackend {
        RedbBackend::open(dir.path().join("sessions.redb")).unwrap()
    }

    #[tokio::test]
    async fn save_list_and_duplicate_detection() {
        let dir = TempDir::new().unwrap();
        let backend = open_backend(&dir);
        let session = full_session("alice", 3600);

        backend.save(session.clone()).await.unwrap();
        assert_eq!(backend.list_user("alice").await.unwrap(), vec![session.clone()]);
        assert!(backend.list_user("bob").await.unwrap().is_empty());

        match backend.save(session).await {
            Err(StorageError::DuplicateId(_)) => {}
            other => panic!("expected duplicate-id error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn sessions_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let session = full_session("alice", 3600);
        {
            let backend = open_backend(&dir);
            backend.save(session.clone()).await.unwrap();
        }
        let backend = open_backend(&dir);
        assert_eq!(backend.list_user("alice").await.unwrap(), vec![session]);
    }

    #[tokio::test]
    async fn list_user_is_in_creation_order() {
        let dir = TempDir::new().unwrap();
        let backend = open_backend(&dir);

        let mut ids = Vec::new();
        for n in 0u8..5 {
            let mut raw = [0u8; 16];
            raw[0] = 0x10 + n;
            let id = SessionId::from_bytes(raw);
            ids.push(id);
            let mut session = full_session("alice", 3600);
            session.session.id = id;
            backend.save(session).await.unwrap();
        }
        // interleave another user to prove the range stays per-user
        backend.save(full_session("bob", 3600)).await.unwrap();

        let listed: Vec<_> = backend
            .list_user("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.session.id)
            .collect();
        assert_eq!(listed, ids);
    }

    #[tokio::test]
    async fn revoke_and_revoke_id() {
        let dir = TempDir::new().unwrap();
        let backend = open_backend(&dir);

        let by_session = full_session("alice", 3600);
        let by_id = full_session("alice", 3600);
        backend.save(by_session.clone()).await.unwrap();
        backend.save(by_id.clone()).await.unwrap();

        backend.revoke(by_session.session.clone()).await.unwrap();
        backend.revoke_id("alice", by_id.session.id).await.unwrap();

        assert!(backend.is_revoked(&by_session.session).await.unwrap());
        assert!(backend.is_revoked(&by_id.session).await.unwrap());
        assert!(backend.list_user("alice").await.unwrap().is_empty());

        let mut revoked = backend.list_revoked().await.unwrap();
        revoked.sort_by_key(|s| s.id);
        let mut expected = vec![by_session.session, by_id.session];
        expected.sort_by_key(|s| s.id);
        assert_eq!(revoked, expected);

        // a miss is not an error
        backend.revoke_id("alice", SessionId::new()).await.unwrap();
        backend.revoke_id("bob", SessionId::new()).await.unwrap();
    }

    #[tokio::test]
    async fn revoking_unknown_session_still_lands_in_revoked_set() {
        let dir = TempDir::new().unwrap();
        let backend = open_backend(&dir);
        let session = full_session("alice", 3600).session;

        backend.revoke(session.clone()).await.unwrap();
        assert!(backend.is_revoked(&session).await.unwrap());
    }

    #[tokio::test]
    async fn load_revocations_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let backend = open_backend(&dir);
        let list = vec![
            full_session("alice", 3600).session,
            full_session("bob", 3600).session,
        ];

        assert_eq!(backend.load_revocations(list.clone()).await.unwrap(), 2);
        assert_eq!(backend.load_revocations(list).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn collect_garbage_removes_expired_entries() {
        let dir = TempDir::new().unwrap();
        let backend = open_backend(&dir);

        backend.save(full_session("alice", -10)).await.unwrap();
        backend.save(full_session("alice", 3600)).await.unwrap();
        backend
            .revoke(full_session("bob", -10).session)
            .await
            .unwrap();
        backend
            .revoke(full_session("bob", 3600).session)
            .await
            .unwrap();

        assert_eq!(backend.collect_garbage().await.unwrap(), 1);
        assert_eq!(backend.list_user("alice").await.unwrap().len(), 1);
        assert_eq!(backend.list_revoked().await.unwrap().len(), 1);
        assert_eq!(backend.collect_garbage().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn second_open_fails_on_lock_contention() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.redb");
        let _backend = RedbBackend::open(&path).unwrap();

        match RedbBackend::open(&path) {
            Err(StorageError::Io(msg)) => assert!(msg.contains("exclusive lock")),
            other => panic!("expected lock error, got {:?}", other),
        }
    }
}
