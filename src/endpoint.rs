//! Endpoint descriptor (spec §3) and credential loading (spec §6's
//! "Configuration file layout" external collaborator, kept minimal per
//! SPEC_FULL §1.A).

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Something that yields a credential for the Basic auth header on each
/// `connect` (spec §6 "Credential producer"). A plain password is the
/// common case; a Kerberos token producer is an external collaborator
/// this crate only consumes through this trait.
pub trait CredentialProducer: Send + Sync + fmt::Debug {
    /// Returns the value to use verbatim as the password half of
    /// `user:password` in the Basic auth header. May be a plain password
    /// or a `_KERBEROSAUTH_`-prefixed base64 token.
    fn credential(&self) -> Result<String>;
}

/// A `CredentialProducer` that always returns the same password.
#[derive(Debug, Clone)]
pub struct StaticPassword(pub String);

impl CredentialProducer for StaticPassword {
    fn credential(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Endpoint descriptor (spec §3). Identity for TLS-level caching uses only
/// `host`, `port`, `verify_peer`, and a hash of `ca_pem` — credentials are
/// never part of a cache key.
#[derive(Clone)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub credential: Arc<dyn CredentialProducer>,
    pub ca_pem: Option<String>,
    pub verify_peer: bool,
    pub ssl_cache_enabled: Option<bool>,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("verify_peer", &self.verify_peer)
            .field("ssl_cache_enabled", &self.ssl_cache_enabled)
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>, password: impl Into<String>) -> Self {
        Endpoint {
            host: host.into(),
            port,
            user: user.into(),
            credential: Arc::new(StaticPassword(password.into())),
            ca_pem: None,
            verify_peer: true,
            ssl_cache_enabled: None,
        }
    }

    pub fn with_credential_producer(mut self, producer: Arc<dyn CredentialProducer>) -> Self {
        self.credential = producer;
        self
    }

    pub fn with_ca_pem(mut self, ca_pem: impl Into<String>) -> Self {
        self.ca_pem = Some(ca_pem.into());
        self
    }

    pub fn with_verify_peer(mut self, verify_peer: bool) -> Self {
        self.verify_peer = verify_peer;
        self
    }

    pub fn with_ssl_cache_enabled(mut self, enabled: bool) -> Self {
        self.ssl_cache_enabled = Some(enabled);
        self
    }

    /// Cache key for [`crate::TlsContextCache::get_context`] (spec §4.A).
    pub(crate) fn tls_context_key(&self) -> String {
        format!(
            "ssl:{}:{}:{}:{}",
            self.host,
            self.port,
            self.verify_peer,
            self.ca_hash_prefix()
        )
    }

    /// Cache key for [`crate::TlsContextCache::get_certificate`] (spec §4.A)
    /// — depends only on host/port, not credentials or verify mode.
    pub(crate) fn certificate_key(&self) -> String {
        format!("cert:{}:{}", self.host, self.port)
    }

    fn ca_hash_prefix(&self) -> String {
        match &self.ca_pem {
            Some(ca) => {
                let digest = Sha256::digest(ca.as_bytes());
                let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
                hex.chars().take(16).collect()
            }
            None => String::new(),
        }
    }

    /// Whether TLS caching should be used for this endpoint: explicit flag
    /// wins, otherwise the `IBMIGW_SSL_CACHE` environment switch (spec §6).
    pub fn should_use_tls_cache(&self) -> bool {
        if let Some(enabled) = self.ssl_cache_enabled {
            return enabled;
        }
        std::env::var("IBMIGW_SSL_CACHE")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Loads an endpoint from an INI-style config file (spec §6), one
    /// section per endpoint. `section` selects the section by name;
    /// `None` falls back to the first section in the file, matching
    /// `base_job.py`'s `_parse_connection_input`.
    pub fn from_ini_path(path: impl AsRef<Path>, section: Option<&str>) -> Result<Endpoint> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        Self::from_ini_str(&contents, section)
    }

    pub fn from_ini_str(contents: &str, section: Option<&str>) -> Result<Endpoint> {
        let conf = ini::Ini::load_from_str(contents)
            .map_err(|e| Error::Handshake(format!("invalid config file: {e}")))?;

        let props = match section {
            Some(name) => conf
                .section(Some(name))
                .ok_or_else(|| Error::Handshake(format!("no such config section: {name}")))?,
            None => conf
                .sections()
                .flatten()
                .next()
                .and_then(|name| conf.section(Some(name)))
                .ok_or_else(|| Error::Handshake("config file has no sections".to_string()))?,
        };

        let get = |key: &str| props.get(key).map(str::to_string);

        let host = get("host").ok_or_else(|| Error::Handshake("missing 'host'".to_string()))?;
        let port = get("port")
            .ok_or_else(|| Error::Handshake("missing 'port'".to_string()))?
            .parse::<u16>()
            .map_err(|e| Error::Handshake(format!("invalid 'port': {e}")))?;
        let user = get("user").ok_or_else(|| Error::Handshake("missing 'user'".to_string()))?;
        let password = get("password").unwrap_or_default();

        let mut endpoint = Endpoint::new(host, port, user, password);
        if let Some(ca) = get("ca") {
            endpoint = endpoint.with_ca_pem(ca);
        }
        if let Some(v) = get("verify_peer") {
            endpoint = endpoint.with_verify_peer(v.eq_ignore_ascii_case("true"));
        }
        if let Some(v) = get("ssl_cache_enabled") {
            endpoint = endpoint.with_ssl_cache_enabled(v.eq_ignore_ascii_case("true"));
        }

        Ok(endpoint)
    }

    /// The value to send as the password half of the Basic auth header.
    pub(crate) fn auth_credential(&self) -> Result<String> {
        self.credential.credential()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_context_key_ignores_credentials() {
        let a = Endpoint::new("host", 8076, "alice", "secret1");
        let b = Endpoint::new("host", 8076, "bob", "secret2");
        assert_eq!(a.tls_context_key(), b.tls_context_key());
    }

    #[test]
    fn tls_context_key_differs_on_verify_peer() {
        let a = Endpoint::new("host", 8076, "alice", "secret1");
        let b = a.clone().with_verify_peer(false);
        assert_ne!(a.tls_context_key(), b.tls_context_key());
    }

    #[test]
    fn tls_context_key_differs_on_ca_material() {
        let a = Endpoint::new("host", 8076, "alice", "secret1").with_ca_pem("ca-one");
        let b = Endpoint::new("host", 8076, "alice", "secret1").with_ca_pem("ca-two");
        assert_ne!(a.tls_context_key(), b.tls_context_key());
    }

    #[test]
    fn from_ini_str_reads_named_section() {
        let ini = "[prod]\nhost = example.com\nport = 8076\nuser = alice\npassword = hunter2\n";
        let ep = Endpoint::from_ini_str(ini, Some("prod")).unwrap();
        assert_eq!(ep.host, "example.com");
        assert_eq!(ep.port, 8076);
        assert_eq!(ep.user, "alice");
    }

    #[test]
    fn from_ini_str_falls_back_to_first_section() {
        let ini = "[dev]\nhost = localhost\nport = 8076\nuser = dev\n";
        let ep = Endpoint::from_ini_str(ini, None).unwrap();
        assert_eq!(ep.host, "localhost");
    }
}
