//! Session records and their wire forms
//!
//! A session lives in three shapes depending on where it travels:
//!
//! - [`SessionBase`] is what gets baked into the cookie payload: username and
//!   expiry only, with single-letter JSON keys to keep the cookie small
//! - [`Session`] adds the session id and is what listings and revocations
//!   carry
//! - [`SessionFull`] adds the [`AgentInfo`] captured at login; only active
//!   sessions carry it, revoked records deliberately drop it so revocation
//!   lists can be shared without leaking browser fingerprints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::time::Duration;

use crate::crypto::KeySet;
use crate::error::Result;

pub use ulid::Ulid as SessionId;

/// Length of the binary session id prefix in the cookie payload
pub const SESSION_ID_LEN: usize = 16;

/// The part of a session that is embedded in the cookie payload.
///
/// Field names are deliberately short: this struct is serialized into every
/// cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBase {
    /// Username the session was issued for
    #[serde(rename = "u")]
    pub username: String,

    /// Expiry as Unix seconds
    #[serde(rename = "e")]
    pub expires: i64,
}

impl SessionBase {
    /// Create a session body expiring `lifetime` from now.
    pub fn new(username: impl Into<String>, lifetime: Duration) -> Self {
        let mut s = Self {
            username: username.into(),
            expires: 0,
        };
        s.set_expiry(lifetime);
        s
    }

    /// Set the expiry to `lifetime` from now, rounded to seconds.
    pub fn set_expiry(&mut self, lifetime: Duration) {
        self.expires = Utc::now().timestamp() + lifetime.as_secs() as i64;
    }

    pub fn is_expired(&self) -> bool {
        self.expires < Utc::now().timestamp()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.expires, 0).unwrap_or_default()
    }
}

/// A session as listed or revoked: the body plus its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session id, rendered as its Crockford base-32 form in JSON
    pub id: SessionId,

    #[serde(flatten)]
    pub base: SessionBase,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.base.is_expired()
    }

    /// Creation time, recovered from the id's millisecond timestamp prefix.
    pub fn created_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.id.datetime())
    }
}

/// Device class derived from the user agent at login time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
    Bot,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Opaque user-agent triple supplied by the caller at mint time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    pub os: String,
    #[serde(rename = "device-type")]
    pub device_type: DeviceType,
}

/// An active session including the agent info captured at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFull {
    #[serde(flatten)]
    pub session: Session,

    pub agent: AgentInfo,
}

impl SessionFull {
    pub fn is_expired(&self) -> bool {
        self.session.is_expired()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.session.created_at()
    }
}

/// Sessions as listed or synced; serializes to `[]` when empty, never `null`.
pub type SessionList = Vec<Session>;

/// Active sessions of a single user.
pub type SessionFullList = Vec<SessionFull>;

/// The envelope a signing instance publishes under `/revocations`.
///
/// The signature covers the exact bytes of the `revoked` field as they appear
/// on the wire, so the field is kept as raw JSON end to end. Re-encoding the
/// array would invalidate the signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedRevocationList {
    pub revoked: Box<RawValue>,

    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

impl SignedRevocationList {
    /// Serialize `revoked` and sign the resulting bytes with the set's
    /// signing key. On a verify-only set the signature is left empty.
    pub fn new(revoked: &SessionList, keys: &KeySet) -> Result<Self> {
        let raw = serde_json::to_string(revoked)?;
        let signature = if keys.can_sign() {
            keys.sign(raw.as_bytes())?
        } else {
            Vec::new()
        };
        Ok(Self {
            revoked: RawValue::from_string(raw)?,
            signature,
        })
    }

    /// Check the signature against the raw `revoked` bytes and parse the
    /// inner array. Any key in the set may accept the signature.
    pub fn verify_and_decode(&self, keys: &KeySet) -> Result<SessionList> {
        keys.verify(self.revoked.get().as_bytes(), &self.signature)?;
        Ok(serde_json::from_str(self.revoked.get())?)
    }
}

/// Base64 (standard alphabet) serialization for byte fields in JSON
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Ed25519SignerVerifier, KeySet};
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    fn test_keys(context: &str) -> KeySet {
        let mut keys = KeySet::new();
        keys.push(Box::new(Ed25519SignerVerifier::new(
            context,
            SigningKey::generate(&mut OsRng),
        )));
        keys
    }

    #[test]
    fn empty_lists_serialize_as_empty_array() {
        let sessions: SessionList = Vec::new();
        assert_eq!(serde_json::to_string(&sessions).unwrap(), "[]");

        let full: SessionFullList = Vec::new();
        assert_eq!(serde_json::to_string(&full).unwrap(), "[]");
    }

    #[test]
    fn session_base_wire_form() {
        let base = SessionBase {
            username: "test".into(),
            expires: 1000,
        };
        assert_eq!(
            serde_json::to_string(&base).unwrap(),
            r#"{"u":"test","e":1000}"#
        );
    }

    #[test]
    fn session_wire_form_includes_id() {
        let id = SessionId::new();
        let session = Session {
            id,
            base: SessionBase {
                username: "alice".into(),
                expires: 1732000000,
            },
        };
        let json = serde_json::to_string(&session).unwrap();
        assert_eq!(
            json,
            format!(r#"{{"id":"{}","u":"alice","e":1732000000}}"#, id)
        );

        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn session_full_carries_agent() {
        let full = SessionFull {
            session: Session {
                id: SessionId::new(),
                base: SessionBase::new("alice", Duration::from_secs(3600)),
            },
            agent: AgentInfo {
                name: "Firefox".into(),
                os: "Linux".into(),
                device_type: DeviceType::Desktop,
            },
        };
        let json = serde_json::to_string(&full).unwrap();
        assert!(json.contains(r#""agent":{"name":"Firefox","os":"Linux","device-type":"Desktop"}"#));

        let back: SessionFull = serde_json::from_str(&json).unwrap();
        assert_eq!(back, full);
    }

    #[test]
    fn unknown_device_type_is_tolerated() {
        let agent: AgentInfo =
            serde_json::from_str(r#"{"name":"x","os":"y","device-type":"Fridge"}"#).unwrap();
        assert_eq!(agent.device_type, DeviceType::Unknown);
    }

    #[test]
    fn expiry_helpers() {
        let mut base = SessionBase::new("alice", Duration::from_secs(3600));
        assert!(!base.is_expired());
        let expected = Utc::now().timestamp() + 3600;
        assert!((base.expires - expected).abs() <= 1);

        base.expires = Utc::now().timestamp() - 1;
        assert!(base.is_expired());
    }

    #[test]
    fn created_at_comes_from_the_id() {
        let session = Session {
            id: SessionId::new(),
            base: SessionBase::new("alice", Duration::from_secs(60)),
        };
        let age = Utc::now() - session.created_at();
        assert!(age.num_seconds() >= 0 && age.num_seconds() < 5);
    }

    #[test]
    fn empty_revocation_list_is_signed_brackets() {
        let keys = test_keys("sso_k1");
        let signed = SignedRevocationList::new(&Vec::new(), &keys).unwrap();
        assert_eq!(signed.revoked.get(), "[]");
        assert!(!signed.signature.is_empty());
        assert!(signed.verify_and_decode(&keys).unwrap().is_empty());
    }

    #[test]
    fn revocation_list_round_trip_preserves_raw_bytes() {
        let keys = test_keys("sso_k1");
        let list = vec![Session {
            id: SessionId::new(),
            base: SessionBase {
                username: "alice".into(),
                expires: 1732000000,
            },
        }];
        let signed = SignedRevocationList::new(&list, &keys).unwrap();

        // through JSON and back, the inner bytes must survive untouched
        let wire = serde_json::to_string(&signed).unwrap();
        let received: SignedRevocationList = serde_json::from_str(&wire).unwrap();
        assert_eq!(received.revoked.get(), signed.revoked.get());
        assert_eq!(received.verify_and_decode(&keys).unwrap(), list);
    }

    #[test]
    fn tampered_revocation_list_fails_verification() {
        let keys = test_keys("sso_k1");
        let list = vec![Session {
            id: SessionId::new(),
            base: SessionBase {
                username: "alice".into(),
                expires: 1732000000,
            },
        }];
        let mut signed = SignedRevocationList::new(&list, &keys).unwrap();
        signed.revoked = RawValue::from_string("[]".into()).unwrap();
        assert!(signed.verify_and_decode(&keys).is_err());
    }
}
