//! # SSO Core
//!
//! Session model, cookie codec and signing primitives for the cookie-based
//! SSO agent. This crate is the pure half of the system: everything here is
//! usable without a running store or any network I/O.
//!
//! ## Key Concepts
//!
//! - **Session**: a short-lived login session, identified by a 128-bit
//!   time-prefixed id and bound to a username and an expiry timestamp
//! - **Cookie value**: `base64url(payload) "." base64url(signature)` where the
//!   payload is the raw session id followed by the compact JSON session body
//! - **Signer/verifier set**: an ordered list of Ed25519 keys; the first key
//!   with private material signs, every key may verify
//! - **Signed revocation list**: the envelope a signing instance publishes so
//!   that verify-only peers can mirror revocations
//!
//! Signatures are domain-separated: every key signs under a context string
//! derived from the cookie name and the key name, so a signature for one
//! cookie deployment is never valid for another even if key material is
//! shared.

pub mod crypto;
pub mod error;
pub mod session;
pub mod value;

pub use crypto::{Ed25519KeyConfig, Ed25519SignerVerifier, KeySet, SignerVerifier, SignerVerifierConfig};
pub use error::{CookieError, Result};
pub use session::{
    AgentInfo, DeviceType, Session, SessionBase, SessionFull, SessionFullList, SessionId,
    SessionList, SignedRevocationList, SESSION_ID_LEN,
};
pub use value::CookieValue;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
