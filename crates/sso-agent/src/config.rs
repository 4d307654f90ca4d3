//! Agent configuration
//!
//! Mirrors the TOML config file. Durations are integer seconds; unknown
//! fields are rejected so typos fail loudly at startup instead of silently
//! running with defaults.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use sso_core::SignerVerifierConfig;

use crate::store::StoreError;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    pub cookie: CookieConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct WebConfig {
    /// Address the HTTP server binds to
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default)]
    pub revocations: RevocationsConfig,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            revocations: RevocationsConfig::default(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8080".into()
}

/// Access control for the `/revocations` endpoint: any token from the set is
/// accepted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RevocationsConfig {
    #[serde(default)]
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct CookieConfig {
    /// Cookie transport name; defaults to `whawty-nginx-sso`
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub domain: String,

    #[serde(default)]
    pub secure: bool,

    /// Session lifetime in seconds; defaults to 24 hours
    #[serde(default)]
    pub expire: Option<u64>,

    #[serde(default)]
    pub keys: Vec<SignerVerifierConfig>,

    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct BackendConfig {
    /// Garbage-collection cadence in seconds; defaults to 5 minutes
    #[serde(default)]
    pub gc_interval: Option<u64>,

    #[serde(default)]
    pub sync: Option<SyncConfig>,

    #[serde(default)]
    pub in_memory: Option<InMemoryBackendConfig>,

    #[serde(default)]
    pub redb: Option<RedbBackendConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InMemoryBackendConfig {}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedbBackendConfig {
    /// Path of the session database file
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct SyncConfig {
    /// Sync cadence in seconds; defaults to 10 seconds
    #[serde(default)]
    pub interval: Option<u64>,

    /// Base URL of the signing peer, `http` or `https`
    pub base_url: String,

    /// Optional `Host:` header override
    #[serde(default)]
    pub http_host: Option<String>,

    #[serde(default)]
    pub tls: Option<TlsConfig>,

    /// Bearer token presented to the signing peer
    pub token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct TlsConfig {
    /// Extra root certificate (PEM) to trust for the sync connection
    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    #[serde(default)]
    pub insecure_skip_verify: bool,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            StoreError::Config(format!(
                "unable to read config file '{}': {}",
                path.display(),
                err
            ))
        })?;
        toml::from_str(&raw).map_err(|err| {
            StoreError::Config(format!(
                "unable to parse config file '{}': {}",
                path.display(),
                err
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [web]
            listen = "127.0.0.1:1234"

            [web.revocations]
            tokens = ["secret-a", "secret-b"]

            [cookie]
            name = "some-cookie"
            domain = "example.com"
            secure = true
            expire = 3600

            [[cookie.keys]]
            name = "k1"
            ed25519 = { public-key-file = "/etc/sso-agent/k1.pub.pem" }

            [cookie.backend]
            gc-interval = 60

            [cookie.backend.sync]
            interval = 10
            base-url = "https://signer.example.com"
            http-host = "sso.example.com"
            token = "secret-a"
            tls = { ca-file = "/etc/ssl/internal-ca.pem" }

            [cookie.backend.in-memory]
            "#,
        )
        .unwrap();

        assert_eq!(config.web.listen, "127.0.0.1:1234");
        assert_eq!(config.web.revocations.tokens.len(), 2);
        assert_eq!(config.cookie.name.as_deref(), Some("some-cookie"));
        assert_eq!(config.cookie.expire, Some(3600));
        assert_eq!(config.cookie.keys.len(), 1);
        assert_eq!(config.cookie.keys[0].name, "k1");
        assert!(config.cookie.backend.in_memory.is_some());
        assert!(config.cookie.backend.redb.is_none());

        let sync = config.cookie.backend.sync.unwrap();
        assert_eq!(sync.base_url, "https://signer.example.com");
        assert_eq!(sync.http_host.as_deref(), Some("sso.example.com"));
        assert_eq!(sync.tls.unwrap().ca_file.unwrap().to_str().unwrap(), "/etc/ssl/internal-ca.pem");
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config: Config = toml::from_str(
            r#"
            [cookie.backend.redb]
            path = "/var/lib/sso-agent/sessions.redb"
            "#,
        )
        .unwrap();
        assert_eq!(config.web.listen, "127.0.0.1:8080");
        assert!(config.web.revocations.tokens.is_empty());
        assert_eq!(config.cookie.name, None);
        assert_eq!(config.cookie.expire, None);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<Config>(
            r#"
            [cookie]
            naem = "typo"
            "#,
        )
        .is_err());
    }
}
