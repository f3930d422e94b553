//! TLS context and server-certificate cache (spec §4.A).
//!
//! Verification contexts are cached per `(host, port, verify_peer,
//! ca_sha256_prefix)`; certificates fetched by a bare handshake are cached
//! per `(host, port)`. Both caches are process-wide singletons with a
//! documented reset hook (spec §9 "Global caches").

mod cache;
mod pem;

#[cfg(feature = "rustls")]
mod rustls_backend;

#[cfg(all(not(feature = "rustls"), feature = "native-tls"))]
mod native_backend;

use std::sync::Arc;
use std::time::Duration;

pub use cache::{CacheStats, CacheStatsSnapshot};
use cache::TtlLruCache;

use crate::endpoint::Endpoint;
use crate::error::Result;

const DEFAULT_CONTEXT_CAPACITY: usize = 100;
const DEFAULT_CERTIFICATE_CAPACITY: usize = 50;
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// A verification context ready to hand to the transport layer, regardless
/// of which TLS backend this crate was built with.
#[derive(Clone)]
pub enum TlsContext {
    #[cfg(feature = "rustls")]
    Rustls(Arc<rustls::ClientConfig>),
    #[cfg(all(not(feature = "rustls"), feature = "native-tls"))]
    Native(native_tls::TlsConnector),
}

/// The certificate cache half of §4.A, kept as its own type since it has
/// independent capacity/TTL defaults from the context cache.
pub struct CertificateCache {
    inner: TtlLruCache<String>,
}

impl CertificateCache {
    pub fn new() -> Self {
        CertificateCache::with_capacity(DEFAULT_CERTIFICATE_CAPACITY, DEFAULT_TTL)
    }

    pub fn with_capacity(capacity: usize, ttl: Duration) -> Self {
        CertificateCache { inner: TtlLruCache::new(capacity, ttl) }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    pub fn put(&self, key: String, pem: String) {
        self.inner.put(key, pem);
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.inner.stats()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }
}

impl Default for CertificateCache {
    fn default() -> Self {
        CertificateCache::new()
    }
}

/// Owns both caches of spec §4.A and performs the live construction /
/// bare-handshake probe that backs a cache miss.
pub struct TlsContextCache {
    contexts: TtlLruCache<TlsContext>,
    certificates: CertificateCache,
}

impl TlsContextCache {
    pub fn new() -> Self {
        TlsContextCache {
            contexts: TtlLruCache::new(DEFAULT_CONTEXT_CAPACITY, DEFAULT_TTL),
            certificates: CertificateCache::new(),
        }
    }

    /// Returns a verification context for `endpoint`, building and (if
    /// caching is enabled for this endpoint) caching one on a miss.
    pub fn get_context(&self, endpoint: &Endpoint) -> Result<TlsContext> {
        let use_cache = endpoint.should_use_tls_cache();
        let key = endpoint.tls_context_key();

        if use_cache {
            if let Some(context) = self.contexts.get(&key) {
                return Ok(context);
            }
        }

        let context = build_context(endpoint)?;

        if use_cache {
            self.contexts.put(key, context.clone());
        }

        Ok(context)
    }

    /// Fetches (and, if caching is enabled, caches) the server's PEM
    /// certificate via a short verification-disabled handshake.
    pub async fn get_certificate(&self, endpoint: &Endpoint) -> Result<String> {
        let use_cache = endpoint.should_use_tls_cache();
        let key = endpoint.certificate_key();

        if use_cache {
            if let Some(pem) = self.certificates.get(&key) {
                return Ok(pem);
            }
        }

        let pem = fetch_certificate(endpoint).await?;

        if use_cache {
            self.certificates.put(key, pem.clone());
        }

        Ok(pem)
    }

    pub fn context_stats(&self) -> CacheStatsSnapshot {
        self.contexts.stats()
    }

    pub fn certificate_stats(&self) -> CacheStatsSnapshot {
        self.certificates.stats()
    }

    pub fn clear(&self) {
        self.contexts.clear();
        self.certificates.clear();
    }
}

impl Default for TlsContextCache {
    fn default() -> Self {
        TlsContextCache::new()
    }
}

#[cfg(feature = "rustls")]
fn build_context(endpoint: &Endpoint) -> Result<TlsContext> {
    rustls_backend::build_context(endpoint)
}

#[cfg(all(not(feature = "rustls"), feature = "native-tls"))]
fn build_context(endpoint: &Endpoint) -> Result<TlsContext> {
    native_backend::build_context(endpoint)
}

#[cfg(feature = "rustls")]
async fn fetch_certificate(endpoint: &Endpoint) -> Result<String> {
    rustls_backend::fetch_certificate(endpoint).await
}

#[cfg(all(not(feature = "rustls"), feature = "native-tls"))]
async fn fetch_certificate(endpoint: &Endpoint) -> Result<String> {
    native_backend::fetch_certificate(endpoint).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_cache_reuses_identical_endpoints() {
        let cache = TlsContextCache::new();
        let a = Endpoint::new("host", 8076, "alice", "secret1")
            .with_verify_peer(false)
            .with_ssl_cache_enabled(true);
        let b = Endpoint::new("host", 8076, "bob", "secret2")
            .with_verify_peer(false)
            .with_ssl_cache_enabled(true);

        let _ = cache.get_context(&a).unwrap();
        let _ = cache.get_context(&b).unwrap();

        // Second endpoint only differs by credentials, so this is a cache hit.
        assert_eq!(cache.context_stats().hits, 1);
    }

    #[test]
    fn context_cache_misses_on_differing_verify_peer() {
        let cache = TlsContextCache::new();
        let a = Endpoint::new("host", 8076, "alice", "secret1")
            .with_verify_peer(false)
            .with_ssl_cache_enabled(true);
        let b = a.clone().with_verify_peer(true).with_ca_pem(String::new());

        let _ = cache.get_context(&a).unwrap();
        let _ = cache.get_context(&b);

        assert_eq!(cache.context_stats().hits, 0);
    }

    #[test]
    fn disabled_caching_never_hits() {
        let cache = TlsContextCache::new();
        let endpoint = Endpoint::new("host", 8076, "alice", "secret1")
            .with_verify_peer(false)
            .with_ssl_cache_enabled(false);

        let _ = cache.get_context(&endpoint).unwrap();
        let _ = cache.get_context(&endpoint).unwrap();

        assert_eq!(cache.context_stats().hits, 0);
        assert_eq!(cache.context_stats().misses, 0);
    }
}
