//! Error types for the SSO core

use thiserror::Error;

/// Result type alias using CookieError
pub type Result<T> = std::result::Result<T, CookieError>;

/// Errors that can occur while encoding, decoding, signing or verifying
/// session cookies.
#[derive(Error, Debug)]
pub enum CookieError {
    /// Cookie value does not parse (wrong shape, bad base64, short payload)
    #[error("invalid cookie value: {0}")]
    MalformedValue(String),

    /// No key in the set accepted the signature
    #[error("cookie signature is not valid")]
    BadSignature,

    /// Signing was requested but no private key material is loaded
    #[error("no signing key loaded")]
    NoSigningKey,

    /// Key material failed to load or is unusable
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// Signing or verification failed for a reason other than rejection
    #[error("cryptographic error: {0}")]
    Crypto(String),

    /// JSON encoding or decoding failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CookieError {
    fn from(err: serde_json::Error) -> Self {
        CookieError::Serialization(err.to_string())
    }
}
