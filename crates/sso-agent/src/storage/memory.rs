//! In-memory storage back-end
//!
//! Nested maps behind a single reader/writer lock. Data is lost on restart,
//! which is fine for verify-only peers: their revocation set is rebuilt by
//! the next sync pass anyway.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use sso_core::{AgentInfo, Session, SessionBase, SessionFull, SessionFullList, SessionId, SessionList};

use super::{SessionBackend, StorageError};

#[derive(Debug, Clone)]
struct StoredSession {
    base: SessionBase,
    agent: AgentInfo,
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<String, HashMap<SessionId, StoredSession>>,
    revoked: HashMap<SessionId, SessionBase>,
}

/// In-memory session store implementation
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    inner: RwLock<Inner>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionBackend for InMemoryBackend {
    fn name(&self) -> String {
        "in-memory".into()
    }

    async fn save(&self, session: SessionFull) -> Result<(), StorageError> {
        let mut inner = self.inner.write().unwrap();
        let user = inner
            .sessions
            .entry(session.session.base.username.clone())
            .or_default();
        if user.contains_key(&session.session.id) {
            return Err(StorageError::DuplicateId(session.session.id));
        }
        user.insert(
            session.session.id,
            StoredSession {
                base: session.session.base,
                agent: session.agent,
            },
        );
        Ok(())
    }

    async fn list_user(&self, username: &str) -> Result<SessionFullList, StorageError> {
        let inner = self.inner.read().unwrap();
        let mut list: SessionFullList = match inner.sessions.get(username) {
            Some(user) => user
                .iter()
                .filter(|(_, stored)| !stored.base.is_expired())
                .map(|(id, stored)| SessionFull {
                    session: Session {
                        id: *id,
                        base: stored.base.clone(),
                    },
                    agent: stored.agent.clone(),
                })
                .collect(),
            None => Vec::new(),
        };
        list.sort_by_key(|s| s.session.id);
        Ok(list)
    }

    async fn revoke(&self, session: Session) -> Result<(), StorageError> {
        let mut inner = self.inner.write().unwrap();
        if let Some(user) = inner.sessions.get_mut(&session.base.username) {
            user.remove(&session.id);
        }
        inner.revoked.insert(session.id, session.base);
        Ok(())
    }

    async fn revoke_id(&self, username: &str, id: SessionId) -> Result<(), StorageError> {
        let mut inner = self.inner.write().unwrap();
        let Some(user) = inner.sessions.get_mut(username) else {
            return Ok(());
        };
        let Some(stored) = user.remove(&id) else {
            return Ok(());
        };
        inner.revoked.insert(id, stored.base);
        Ok(())
    }

    async fn is_revoked(&self, session: &Session) -> Result<bool, StorageError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.revoked.contains_key(&session.id))
    }

    async fn list_revoked(&self) -> Result<SessionList, StorageError> {
        let inner = self.inner.read().unwrap();
        let mut list: SessionList = inner
            .revoked
            .iter()
            .filter(|(_, base)| !base.is_expired())
            .map(|(id, base)| Session {
                id: *id,
                base: base.clone(),
            })
            .collect();
        list.sort_by_key(|s| s.id);
        Ok(list)
    }

    async fn load_revocations(&self, list: SessionList) -> Result<usize, StorageError> {
        let mut inner = self.inner.write().unwrap();
        let mut added = 0;
        for session in list {
            if !inner.revoked.contains_key(&session.id) {
                inner.revoked.insert(session.id, session.base);
                added += 1;
            }
        }
        Ok(added)
    }

    async fn collect_garbage(&self) -> Result<usize, StorageError> {
        let mut inner = self.inner.write().unwrap();
        let mut removed = 0;
        for user in inner.sessions.values_mut() {
            user.retain(|_, stored| {
                let keep = !stored.base.is_expired();
                if !keep {
                    removed += 1;
                }
                keep
            });
        }
        inner.revoked.retain(|_, base| !base.is_expired());
        Ok(removed)
    }
}
