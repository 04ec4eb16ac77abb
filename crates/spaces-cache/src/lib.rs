//! # spaces-cache
//!
//! Best-effort revisioned cache over Valkey/Redis.
//!
//! Keys embed a per-tenant-per-kind revision counter so a single `INCR`
//! invalidates every matching entry at once:
//!
//! ```text
//! v{schema}:rev{rev}:{kind}:{user_id}:{space_id}:{top_k}:{fingerprint}
//! ```
//!
//! where `fingerprint = sha256(normalized_query | filters | backend | model)`.
//! Any backend error is logged and treated as a miss; a down cache never
//! fails a request. A failure-counting circuit breaker short-circuits to
//! bypass for a cooldown window once errors accumulate.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use spaces_core::{defaults, Settings, Tenant};

/// Cache namespaces; each has an independent revision counter per tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// Chunk retrieval results.
    Text,
    /// Image search results.
    Image,
    /// Generated answers.
    Llm,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Text => "text",
            CacheKind::Image => "image",
            CacheKind::Llm => "llm",
        }
    }
}

/// Fingerprint of the variable parts of a cacheable request.
pub fn fingerprint(query: &str, filters: &[&str], backend: &str, model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.trim().to_lowercase().as_bytes());
    for f in filters {
        hasher.update(b"|");
        hasher.update(f.as_bytes());
    }
    hasher.update(b"|");
    hasher.update(backend.as_bytes());
    hasher.update(b"|");
    hasher.update(model.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..24].to_string()
}

#[derive(Debug, Default)]
struct BreakerState {
    failures: u32,
    open_until: Option<Instant>,
}

struct CacheInner {
    connection: Option<ConnectionManager>,
    schema: String,
    failure_threshold: u32,
    cooldown: Duration,
    breaker: Mutex<BreakerState>,
}

/// Revisioned KV cache. Cheap to clone.
#[derive(Clone)]
pub struct RevisionedCache {
    inner: Arc<CacheInner>,
    /// TTL for retrieval results.
    pub ttl_results: Duration,
    /// TTL for generated answers.
    pub ttl_answers: Duration,
}

impl RevisionedCache {
    /// Connect using [`Settings`]. A missing `VALKEY_URL` or a failed
    /// connection yields a disabled cache (every get is a miss).
    pub async fn from_settings(settings: &Settings) -> Self {
        let connection = match settings.valkey_url.as_deref() {
            None => {
                info!(
                    subsystem = "cache",
                    op = "init",
                    "VALKEY_URL not set; cache disabled"
                );
                None
            }
            Some(url) => match redis::Client::open(url) {
                Ok(client) => match ConnectionManager::new(client).await {
                    Ok(conn) => {
                        info!(
                            subsystem = "cache",
                            op = "init",
                            ttl_results = settings.cache_ttl_semantic_secs,
                            ttl_answers = settings.cache_ttl_llm_secs,
                            "Cache connected"
                        );
                        Some(conn)
                    }
                    Err(e) => {
                        warn!(subsystem = "cache", error = %e, "Cache connect failed; disabled");
                        None
                    }
                },
                Err(e) => {
                    warn!(subsystem = "cache", error = %e, "Invalid cache URL; disabled");
                    None
                }
            },
        };

        Self {
            inner: Arc::new(CacheInner {
                connection,
                schema: settings.cache_schema_version.clone(),
                failure_threshold: settings.cache_failure_threshold,
                cooldown: Duration::from_secs(settings.cache_cooldown_secs),
                breaker: Mutex::new(BreakerState::default()),
            }),
            ttl_results: Duration::from_secs(settings.cache_ttl_semantic_secs),
            ttl_answers: Duration::from_secs(settings.cache_ttl_llm_secs),
        }
    }

    /// A cache that never hits (tests, cacheless deployments).
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(CacheInner {
                connection: None,
                schema: defaults::CACHE_SCHEMA_VERSION.to_string(),
                failure_threshold: defaults::CACHE_FAILURE_THRESHOLD,
                cooldown: Duration::from_secs(defaults::CACHE_COOLDOWN_SECS),
                breaker: Mutex::new(BreakerState::default()),
            }),
            ttl_results: Duration::from_secs(defaults::CACHE_TTL_SEMANTIC_SECS),
            ttl_answers: Duration::from_secs(defaults::CACHE_TTL_LLM_SECS),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.connection.is_some()
    }

    /// Whether the circuit breaker currently bypasses the cache.
    fn is_open(&self) -> bool {
        let mut state = self.inner.breaker.lock().unwrap();
        if let Some(until) = state.open_until {
            if Instant::now() < until {
                return true;
            }
            // Cooldown elapsed; half-open and try again.
            state.open_until = None;
            state.failures = 0;
        }
        false
    }

    fn record_failure(&self) {
        let mut state = self.inner.breaker.lock().unwrap();
        state.failures += 1;
        if state.failures >= self.inner.failure_threshold && state.open_until.is_none() {
            state.open_until = Some(Instant::now() + self.inner.cooldown);
            warn!(
                subsystem = "cache",
                failures = state.failures,
                cooldown_secs = self.inner.cooldown.as_secs(),
                "Cache circuit breaker opened"
            );
        }
    }

    fn record_success(&self) {
        let mut state = self.inner.breaker.lock().unwrap();
        state.failures = 0;
    }

    fn conn(&self) -> Option<ConnectionManager> {
        if self.is_open() {
            return None;
        }
        self.inner.connection.clone()
    }

    /// Current revision for a tenant/kind; 0 when unset or unreachable.
    pub async fn revision(&self, kind: CacheKind, tenant: Tenant) -> u64 {
        let Some(mut conn) = self.conn() else {
            return 0;
        };
        let key = self.revision_key(kind, tenant);
        match conn.get::<_, Option<u64>>(&key).await {
            Ok(v) => {
                self.record_success();
                v.unwrap_or(0)
            }
            Err(e) => {
                debug!(subsystem = "cache", op = "revision", error = %e, "treating as rev 0");
                self.record_failure();
                0
            }
        }
    }

    /// Invalidate all entries for a tenant/kind by bumping the revision.
    pub async fn bump(&self, tenant: Tenant, kind: CacheKind) {
        let Some(mut conn) = self.conn() else {
            return;
        };
        let key = self.revision_key(kind, tenant);
        match conn.incr::<_, _, u64>(&key, 1).await {
            Ok(rev) => {
                self.record_success();
                debug!(
                    subsystem = "cache",
                    op = "bump",
                    kind = kind.as_str(),
                    user_id = tenant.user_id,
                    rev,
                    "Revision bumped"
                );
            }
            Err(e) => {
                warn!(subsystem = "cache", op = "bump", error = %e, "Revision bump failed");
                self.record_failure();
            }
        }
    }

    /// Full revisioned key for a request. `None` means "bypass the cache"
    /// (disabled or breaker open), distinct from a miss.
    pub async fn build_key(
        &self,
        kind: CacheKind,
        tenant: Tenant,
        top_k: usize,
        fingerprint: &str,
    ) -> Option<String> {
        if self.conn().is_none() {
            return None;
        }
        let rev = self.revision(kind, tenant).await;
        Some(format!(
            "v{schema}:rev{rev}:{kind}:{tenant}:{top_k}:{fingerprint}",
            schema = self.inner.schema,
            kind = kind.as_str(),
            tenant = tenant.key_fragment(),
        ))
    }

    /// Get a JSON payload. Every failure path is a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn()?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(data)) => {
                self.record_success();
                match serde_json::from_str(&data) {
                    Ok(v) => {
                        debug!(subsystem = "cache", op = "get", key, "Cache hit");
                        Some(v)
                    }
                    Err(e) => {
                        warn!(subsystem = "cache", key, error = %e, "Cache payload corrupt");
                        None
                    }
                }
            }
            Ok(None) => {
                self.record_success();
                None
            }
            Err(e) => {
                debug!(subsystem = "cache", op = "get", key, error = %e, "Cache error as miss");
                self.record_failure();
                None
            }
        }
    }

    /// Store a JSON payload with a TTL. Best-effort.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Some(mut conn) = self.conn() else {
            return;
        };
        let payload = match serde_json::to_string(value) {
            Ok(p) => p,
            Err(e) => {
                warn!(subsystem = "cache", key, error = %e, "Cache serialize failed");
                return;
            }
        };
        match conn
            .set_ex::<_, _, ()>(key, payload, ttl.as_secs().max(1))
            .await
        {
            Ok(()) => self.record_success(),
            Err(e) => {
                debug!(subsystem = "cache", op = "set", key, error = %e, "Cache set failed");
                self.record_failure();
            }
        }
    }

    fn revision_key(&self, kind: CacheKind, tenant: Tenant) -> String {
        format!(
            "rev:{}:{}",
            kind.as_str(),
            tenant.key_fragment()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic_and_normalized() {
        let a = fingerprint("Cross-Border Transfers ", &["42"], "searchindex", "all-minilm");
        let b = fingerprint("cross-border transfers", &["42"], "searchindex", "all-minilm");
        assert_eq!(a, b);
        assert_eq!(a.len(), 24);
    }

    #[test]
    fn fingerprint_varies_with_inputs() {
        let base = fingerprint("q", &[], "searchindex", "m");
        assert_ne!(base, fingerprint("q2", &[], "searchindex", "m"));
        assert_ne!(base, fingerprint("q", &["f"], "searchindex", "m"));
        assert_ne!(base, fingerprint("q", &[], "metastore", "m"));
        assert_ne!(base, fingerprint("q", &[], "searchindex", "m2"));
    }

    #[tokio::test]
    async fn disabled_cache_misses_and_ignores_writes() {
        let cache = RevisionedCache::disabled();
        assert!(!cache.is_enabled());
        assert_eq!(cache.revision(CacheKind::Text, Tenant::new(1, None)).await, 0);
        assert!(cache
            .build_key(CacheKind::Text, Tenant::new(1, None), 5, "abc")
            .await
            .is_none());
        cache.bump(Tenant::new(1, None), CacheKind::Text).await;
        let got: Option<String> = cache.get_json("anything").await;
        assert!(got.is_none());
    }

    #[test]
    fn breaker_opens_after_threshold_and_recovers() {
        let cache = RevisionedCache::disabled();
        for _ in 0..defaults::CACHE_FAILURE_THRESHOLD {
            cache.record_failure();
        }
        assert!(cache.is_open());

        // Force the cooldown to lapse.
        {
            let mut state = cache.inner.breaker.lock().unwrap();
            state.open_until = Some(Instant::now() - Duration::from_secs(1));
        }
        assert!(!cache.is_open());
        // Half-open reset clears the failure count.
        assert_eq!(cache.inner.breaker.lock().unwrap().failures, 0);
    }

    #[test]
    fn success_resets_failure_count() {
        let cache = RevisionedCache::disabled();
        cache.record_failure();
        cache.record_failure();
        cache.record_success();
        assert_eq!(cache.inner.breaker.lock().unwrap().failures, 0);
    }

    #[test]
    fn key_shape_matches_contract() {
        // Exercise the formatting path directly (no backend needed).
        let tenant = Tenant::new(7, Some(42));
        let key = format!(
            "v{}:rev{}:{}:{}:{}:{}",
            defaults::CACHE_SCHEMA_VERSION,
            3,
            CacheKind::Text.as_str(),
            tenant.key_fragment(),
            10,
            "deadbeef"
        );
        assert_eq!(key, "v1:rev3:text:7:42:10:deadbeef");
    }
}
