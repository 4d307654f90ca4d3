//! Revocation sync client
//!
//! Verify-only peers pull the signed revocation list from a signing peer and
//! merge it into their local back-end. The response signature is checked with
//! the same key set used for cookies, over the exact bytes of the `revoked`
//! field as received. The raw JSON is never re-encoded.
//!
//! Sync is fire-and-forget: a pass either succeeds or is logged and counted
//! as a failure, and the next tick tries again. It never blocks `verify` or
//! `mint` and holds no store lock while the request is in flight.

use reqwest::header::{HeaderValue, AUTHORIZATION, HOST};
use reqwest::{Certificate, Client, StatusCode, Url};
use std::fs;
use tracing::{debug, warn};

use sso_core::{KeySet, SignedRevocationList};

use crate::config::SyncConfig;
use crate::storage::SessionBackend;
use crate::store::StoreError;

pub struct SyncClient {
    client: Client,
    url: Url,
    host: Option<HeaderValue>,
    token: String,
}

impl SyncClient {
    pub fn from_config(conf: &SyncConfig) -> Result<Self, StoreError> {
        let mut url = Url::parse(&conf.base_url).map_err(|err| {
            StoreError::Config(format!("sync base-url '{}' is invalid: {}", conf.base_url, err))
        })?;
        match url.scheme() {
            "http" => warn!(url = %url, "using insecure url for sync"),
            "https" => {}
            _ => {
                return Err(StoreError::Config(format!(
                    "sync base-url '{}' is invalid",
                    conf.base_url
                )))
            }
        }
        url.path_segments_mut()
            .map_err(|_| {
                StoreError::Config(format!("sync base-url '{}' is invalid", conf.base_url))
            })?
            .pop_if_empty()
            .push("revocations");

        let mut builder = Client::builder();
        if let Some(tls) = &conf.tls {
            if let Some(ca_file) = &tls.ca_file {
                let pem = fs::read(ca_file).map_err(|err| {
                    StoreError::Config(format!(
                        "unable to read '{}': {}",
                        ca_file.display(),
                        err
                    ))
                })?;
                let cert = Certificate::from_pem(&pem)
                    .map_err(|err| StoreError::Config(err.to_string()))?;
                builder = builder.add_root_certificate(cert);
            }
            if tls.insecure_skip_verify {
                warn!("certificate checks for sync are disabled!");
                builder = builder.danger_accept_invalid_certs(true);
            }
        }
        let client = builder
            .build()
            .map_err(|err| StoreError::Config(err.to_string()))?;

        let host = match &conf.http_host {
            Some(host) => Some(HeaderValue::from_str(host).map_err(|err| {
                StoreError::Config(format!("sync http-host '{}' is invalid: {}", host, err))
            })?),
            None => None,
        };

        Ok(Self {
            client,
            url,
            host,
            token: conf.token.clone(),
        })
    }

    /// One sync pass: fetch, check the signature, merge. Returns whether the
    /// pass succeeded. The back-end is left untouched unless the signature
    /// verifies.
    pub async fn sync_revocations(&self, keys: &KeySet, backend: &dyn SessionBackend) -> bool {
        let mut request = self
            .client
            .get(self.url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", self.token));
        if let Some(host) = &self.host {
            request = request.header(HOST, host.clone());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(%err, "error sending sync request");
                return false;
            }
        };
        if response.status() != StatusCode::OK {
            warn!(status = %response.status(), "sync request was rejected");
            return false;
        }

        let signed: SignedRevocationList = match response.json().await {
            Ok(signed) => signed,
            Err(err) => {
                warn!(%err, "error parsing sync response");
                return false;
            }
        };
        let list = match signed.verify_and_decode(keys) {
            Ok(list) => list,
            Err(err) => {
                warn!(%err, "revocation list is invalid");
                return false;
            }
        };

        match backend.load_revocations(list).await {
            Ok(0) => true,
            Ok(added) => {
                debug!(added, "successfully synced revocations");
                true
            }
            Err(err) => {
                warn!(%err, "error loading revocations");
                false
            }
        }
    }
}
