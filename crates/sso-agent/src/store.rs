//! Session store facade
//!
//! [`SessionStore`] composes the key set, the cookie codec and a storage
//! back-end into the public surface the front-end calls: mint, verify, list,
//! revoke. It also owns the two background loops (garbage collection and,
//! when configured, revocation sync) which run for as long as the store is
//! alive and never abort on transient errors.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use sso_core::{
    AgentInfo, CookieError, CookieValue, KeySet, Session, SessionBase, SessionFull,
    SessionFullList, SessionId, SignedRevocationList,
};

use crate::config::CookieConfig;
use crate::storage::{InMemoryBackend, RedbBackend, SessionBackend, StorageError};
use crate::sync::SyncClient;

pub const DEFAULT_COOKIE_NAME: &str = "whawty-nginx-sso";
pub const DEFAULT_EXPIRE: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(10);

/// Cookie transport attributes handed to the HTTP layer along with a minted
/// cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub name: String,
    pub max_age: u64,
    pub domain: String,
    pub secure: bool,
}

/// Error type for session store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Invalid or contradictory configuration; fatal at initialization
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Mint was called on a verify-only instance
    #[error("no signing key loaded")]
    NoSigningKey,

    /// The cookie value does not decode
    #[error("invalid cookie value: {0}")]
    MalformedCookie(String),

    /// No key in the set accepted the cookie signature
    #[error("cookie signature is not valid")]
    BadSignature,

    /// The signature checked out but the payload does not parse
    #[error("unable to decode cookie: {0}")]
    MalformedPayload(String),

    #[error("cookie is expired")]
    Expired,

    #[error("cookie is revoked")]
    Revoked,

    #[error("session store backend error: {0}")]
    Backend(#[from] StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// The session store. Cheap to share behind an [`Arc`]; all operations take
/// `&self` and are safe for concurrent use.
pub struct SessionStore {
    options: CookieOptions,
    expire: Duration,
    keys: Arc<KeySet>,
    backend: Arc<dyn SessionBackend>,
    gc_task: JoinHandle<()>,
    sync_task: Option<JoinHandle<()>>,
}

impl SessionStore {
    /// Initialize keys and back-end from the configuration and start the
    /// background loops. Must run inside a tokio runtime.
    pub fn new(conf: &CookieConfig) -> Result<Self, StoreError> {
        let name = match conf.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => DEFAULT_COOKIE_NAME.to_string(),
        };
        let expire = match conf.expire {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => DEFAULT_EXPIRE,
        };

        let keys = Arc::new(
            KeySet::from_configs(&name, &conf.keys)
                .map_err(|err| StoreError::Config(err.to_string()))?,
        );

        let backend: Arc<dyn SessionBackend> = match (&conf.backend.in_memory, &conf.backend.redb)
        {
            (Some(_), None) => Arc::new(InMemoryBackend::new()),
            (None, Some(redb)) => Arc::new(RedbBackend::open(&redb.path)?),
            (Some(_), Some(_)) => {
                return Err(StoreError::Config(
                    "'in-memory' and 'redb' back-ends are mutually exclusive".into(),
                ))
            }
            (None, None) => {
                return Err(StoreError::Config(
                    "no valid backend configuration found".into(),
                ))
            }
        };

        info!(
            keys = keys.len(),
            backend = %backend.name(),
            "session store initialized"
        );
        if !keys.can_sign() {
            info!("no signing key has been loaded - this instance can only verify cookies");
        }

        let gc_interval = gc_interval_from(conf.backend.gc_interval);

        // the sync configuration must be validated before any loop is spawned
        let sync = match &conf.backend.sync {
            Some(sync_conf) => {
                let interval = sync_interval_from(sync_conf.interval);
                Some((SyncClient::from_config(sync_conf)?, interval))
            }
            None => None,
        };

        let gc_task = tokio::spawn(run_gc(Arc::clone(&backend), gc_interval));
        let sync_task = sync.map(|(client, interval)| {
            tokio::spawn(run_sync(
                client,
                Arc::clone(&keys),
                Arc::clone(&backend),
                interval,
            ))
        });

        Ok(Self {
            options: CookieOptions {
                name,
                max_age: expire.as_secs(),
                domain: conf.domain.clone(),
                secure: conf.secure,
            },
            expire,
            keys,
            backend,
            gc_task,
            sync_task,
        })
    }

    /// Snapshot of the cookie transport attributes. Pure, never touches the
    /// back-end.
    pub fn options(&self) -> CookieOptions {
        self.options.clone()
    }

    /// Mint a session cookie for `username`. Requires a signing key.
    pub async fn mint(
        &self,
        username: &str,
        agent: AgentInfo,
    ) -> Result<(String, CookieOptions), StoreError> {
        if !self.keys.can_sign() {
            return Err(StoreError::NoSigningKey);
        }

        let base = SessionBase::new(username, self.expire);
        let id = SessionId::new();
        let mut value =
            CookieValue::new(id, &base).map_err(|err| StoreError::Internal(err.to_string()))?;
        let signature = self.keys.sign(value.payload()).map_err(|err| match err {
            CookieError::NoSigningKey => StoreError::NoSigningKey,
            other => StoreError::Internal(other.to_string()),
        })?;
        value.set_signature(signature);

        self.backend
            .save(SessionFull {
                session: Session { id, base },
                agent,
            })
            .await?;
        debug!(session = %id, username, "successfully generated new session");

        Ok((value.to_string(), self.options()))
    }

    /// Verify a cookie value: decode, check the signature against every key,
    /// check expiry, check the revocation set.
    pub async fn verify(&self, value: &str) -> Result<Session, StoreError> {
        let decoded: CookieValue = value
            .parse()
            .map_err(|err: CookieError| StoreError::MalformedCookie(err.to_string()))?;
        self.keys
            .verify(decoded.payload(), decoded.signature())
            .map_err(|_| StoreError::BadSignature)?;
        let base = decoded
            .session()
            .map_err(|err| StoreError::MalformedPayload(err.to_string()))?;

        let session = Session {
            id: decoded.id(),
            base,
        };
        if session.is_expired() {
            return Err(StoreError::Expired);
        }
        if self.backend.is_revoked(&session).await? {
            return Err(StoreError::Revoked);
        }

        debug!(session = %session.id, username = %session.base.username, "successfully verified session");
        Ok(session)
    }

    pub async fn list_user(&self, username: &str) -> Result<SessionFullList, StoreError> {
        Ok(self.backend.list_user(username).await?)
    }

    pub async fn revoke(&self, session: Session) -> Result<(), StoreError> {
        let id = session.id;
        self.backend.revoke(session).await?;
        debug!(session = %id, "successfully revoked session");
        Ok(())
    }

    pub async fn revoke_id(&self, username: &str, id: SessionId) -> Result<(), StoreError> {
        self.backend.revoke_id(username, id).await?;
        debug!(session = %id, "successfully revoked session");
        Ok(())
    }

    /// The current revocation list, signed when a signing key is loaded.
    /// This is what peers pull via the `/revocations` endpoint.
    pub async fn list_revoked(&self) -> Result<SignedRevocationList, StoreError> {
        let revoked = self.backend.list_revoked().await?;
        SignedRevocationList::new(&revoked, &self.keys)
            .map_err(|err| StoreError::Internal(err.to_string()))
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.gc_task.abort();
        if let Some(task) = &self.sync_task {
            task.abort();
        }
    }
}

/// The configured GC cadence. Unset intervals and intervals at or below one
/// second are overridden to the default.
fn gc_interval_from(secs: Option<u64>) -> Duration {
    match secs {
        Some(secs) if secs > 1 => Duration::from_secs(secs),
        _ => {
            info!("overriding invalid/unset GC interval to 5 minutes");
            DEFAULT_GC_INTERVAL
        }
    }
}

/// The configured sync cadence, with the same one-second floor as GC.
fn sync_interval_from(secs: Option<u64>) -> Duration {
    match secs {
        Some(secs) if secs > 1 => Duration::from_secs(secs),
        _ => {
            info!("overriding invalid/unset sync interval to 10 seconds");
            DEFAULT_SYNC_INTERVAL
        }
    }
}

async fn run_gc(backend: Arc<dyn SessionBackend>, interval: Duration) {
    debug!(interval_secs = interval.as_secs(), "running GC");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick of a tokio interval fires immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match backend.collect_garbage().await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "GC removed expired sessions"),
            Err(err) => warn!(%err, "failed to collect garbage"),
        }
    }
}

async fn run_sync(
    client: SyncClient,
    keys: Arc<KeySet>,
    backend: Arc<dyn SessionBackend>,
    interval: Duration,
) {
    debug!(interval_secs = interval.as_secs(), "running revocation sync");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let start = Instant::now();
        let success = client.sync_revocations(&keys, backend.as_ref()).await;
        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            success, "revocation sync finished"
        );
    }
}
