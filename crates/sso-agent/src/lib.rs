//! SSO Agent
//!
//! A cookie-based single-sign-on agent meant to run behind a reverse proxy
//! with sub-request authorization. Signing instances mint and revoke session
//! cookies; verify-only peers hold just the public keys and mirror the
//! revocation list from a signing peer over HTTP.
//!
//! The pieces:
//!
//! - [`store::SessionStore`]: the facade: mint, verify, list, revoke; owns
//!   the garbage-collection and revocation-sync background loops
//! - [`storage`]: the pluggable session+revocation store: an in-memory map
//!   for verify-only peers and a redb file for signing instances
//! - [`sync`]: the client half of revocation synchronization
//! - [`api`]: the server half: the bearer-token gated `/revocations`
//!   endpoint a signing peer exposes
//!
//! ## HTTP surface
//!
//! - `GET /health` - liveness check
//! - `GET /revocations` - current signed revocation list (bearer token)

pub mod api;
pub mod config;
pub mod storage;
pub mod store;
pub mod sync;

pub use api::{create_router, AppState};
pub use config::Config;
pub use storage::{InMemoryBackend, RedbBackend, SessionBackend, StorageError};
pub use store::{CookieOptions, SessionStore, StoreError};
pub use sync::SyncClient;
