//! Credential cache and single-flight coalescer.
//!
//! Secrets are cached by `(tenant, reference, version)` with a hard TTL:
//! expiry behaves as a miss, never as a stale value, because a stale
//! credential may have been revoked. A side index remembers the latest
//! version seen per `(tenant, reference)` so a repeat lookup can hit the
//! cache without knowing the version up front.
//!
//! Concurrent resolutions for the same `(tenant, reference)` collapse into
//! one upstream flight. The flight runs in its own task, so an abandoned
//! caller never cancels it for the others, and its ticket is dropped the
//! instant it completes so failures are retried rather than replayed.

use crate::error::{ResolveError, UpstreamError};
use crate::model::CredentialMaterial;
use crate::transport::OrchestratorApi;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

type FlightKey = (String, String);
type FlightResult = Result<CredentialMaterial, ResolveError>;

/// Cache + coalescer for resolved secret material.
pub struct CredentialStore {
    cache: moka::sync::Cache<(String, String, String), CredentialMaterial>,
    versions: DashMap<FlightKey, String>,
    inflight: DashMap<FlightKey, watch::Receiver<Option<FlightResult>>>,
    coalesced_waits: AtomicU64,
}

impl CredentialStore {
    /// Create a store holding at most `capacity` secrets for `ttl` each.
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            cache: moka::sync::Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
            versions: DashMap::new(),
            inflight: DashMap::new(),
            coalesced_waits: AtomicU64::new(0),
        }
    }

    /// Cached material for a known version, if still live.
    pub fn get_cached(
        &self,
        tenant: &str,
        reference: &str,
        version: &str,
    ) -> Option<CredentialMaterial> {
        self.cache
            .get(&(tenant.to_string(), reference.to_string(), version.to_string()))
    }

    /// Latest known version for a `(tenant, reference)` pair.
    pub fn latest_version(&self, tenant: &str, reference: &str) -> Option<String> {
        self.versions
            .get(&(tenant.to_string(), reference.to_string()))
            .map(|v| v.clone())
    }

    /// Number of callers that attached to an already-outstanding flight.
    pub fn coalesced_waits(&self) -> u64 {
        self.coalesced_waits.load(Ordering::Relaxed)
    }

    /// Resolve a credential reference, serving from cache when the latest
    /// known version is still live and coalescing concurrent misses into a
    /// single upstream call.
    pub async fn get_or_resolve(
        self: &Arc<Self>,
        api: Arc<dyn OrchestratorApi>,
        tenant: &str,
        reference: &str,
        request_id: Option<String>,
    ) -> FlightResult {
        if let Some(version) = self.latest_version(tenant, reference) {
            if let Some(material) = self.get_cached(tenant, reference, &version) {
                debug!(tenant, reference, version, "credential cache hit");
                return Ok(material);
            }
        }

        let key: FlightKey = (tenant.to_string(), reference.to_string());
        let mut rx = match self.inflight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                self.coalesced_waits.fetch_add(1, Ordering::Relaxed);
                debug!(tenant, reference, "attaching to in-flight credential resolution");
                entry.get().clone()
            }
            Entry::Vacant(slot) => {
                let (tx, rx) = watch::channel(None);
                slot.insert(rx.clone());
                let store = Arc::clone(self);
                let (tenant, reference) = key.clone();
                tokio::spawn(async move {
                    let result = store
                        .resolve_upstream(api, &tenant, &reference, request_id.as_deref())
                        .await;
                    // Ticket goes away before the result is published, so a
                    // caller arriving after a failure starts a new flight.
                    store.inflight.remove(&(tenant, reference));
                    let _ = tx.send(Some(result));
                });
                rx
            }
        };

        loop {
            if let Some(result) = rx.borrow().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                let final_value = rx.borrow().clone();
                return match final_value {
                    Some(result) => result,
                    None => Err(ResolveError::Unavailable(
                        "credential resolution aborted".to_string(),
                    )),
                };
            }
        }
    }

    async fn resolve_upstream(
        &self,
        api: Arc<dyn OrchestratorApi>,
        tenant: &str,
        reference: &str,
        request_id: Option<&str>,
    ) -> FlightResult {
        match api.resolve_credential(tenant, reference, request_id).await {
            Ok(doc) => {
                self.cache.insert(
                    (tenant.to_string(), reference.to_string(), doc.version.clone()),
                    doc.material.clone(),
                );
                self.versions
                    .insert((tenant.to_string(), reference.to_string()), doc.version);
                Ok(doc.material)
            }
            Err(UpstreamError::Unavailable(detail)) => {
                warn!(tenant, reference, %detail, "credential endpoint unavailable");
                Err(ResolveError::Unavailable(detail))
            }
            Err(err) => {
                warn!(tenant, reference, %err, "credential resolution rejected");
                Err(ResolveError::Credential {
                    reference: reference.to_string(),
                    detail: err.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CredentialDocument, RuntimeEnvelope};
    use std::sync::atomic::AtomicUsize;

    /// Scripted orchestrator double for credential flows.
    struct ScriptedApi {
        calls: AtomicUsize,
        fail_first: bool,
        delay: Duration,
    }

    impl ScriptedApi {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_first: false,
                delay: Duration::ZERO,
            })
        }

        fn failing_first() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_first: true,
                delay: Duration::ZERO,
            })
        }

        fn slow() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_first: false,
                delay: Duration::from_millis(50),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl OrchestratorApi for ScriptedApi {
        async fn fetch_runtime_by_host(
            &self,
            _host: &str,
            _request_id: Option<&str>,
        ) -> Result<RuntimeEnvelope, UpstreamError> {
            unreachable!("credential tests never look up runtime config")
        }

        async fn resolve_credential(
            &self,
            _tenant: &str,
            reference: &str,
            _request_id: Option<&str>,
        ) -> Result<CredentialDocument, UpstreamError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay > Duration::ZERO {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail_first && n == 0 {
                return Err(UpstreamError::NotFound);
            }
            Ok(CredentialDocument {
                version: format!("v{}", n + 1),
                material: CredentialMaterial::ApiKey {
                    key: format!("{reference}-key"),
                },
            })
        }
    }

    #[tokio::test]
    async fn test_cached_version_skips_network() {
        let store = Arc::new(CredentialStore::new(64, Duration::from_secs(60)));
        let api = ScriptedApi::new();

        store
            .get_or_resolve(api.clone(), "studio", "gd-studio", None)
            .await
            .unwrap();
        store
            .get_or_resolve(api.clone(), "studio", "gd-studio", None)
            .await
            .unwrap();
        assert_eq!(api.call_count(), 1);
        assert_eq!(store.latest_version("studio", "gd-studio").unwrap(), "v1");
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let store = Arc::new(CredentialStore::new(64, Duration::from_millis(20)));
        let api = ScriptedApi::new();

        store
            .get_or_resolve(api.clone(), "studio", "gd-studio", None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get_cached("studio", "gd-studio", "v1").is_none());

        store
            .get_or_resolve(api.clone(), "studio", "gd-studio", None)
            .await
            .unwrap();
        assert_eq!(api.call_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_resolutions_coalesce_to_one_call() {
        let store = Arc::new(CredentialStore::new(64, Duration::from_secs(60)));
        let api = ScriptedApi::slow();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let api = api.clone();
            handles.push(tokio::spawn(async move {
                store
                    .get_or_resolve(api, "studio", "gd-studio", None)
                    .await
            }));
        }
        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap().unwrap());
        }

        assert_eq!(api.call_count(), 1);
        for r in &results {
            assert!(matches!(r, CredentialMaterial::ApiKey { key } if key == "gd-studio-key"));
        }
        assert!(store.coalesced_waits() >= 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_coalesced_into_negative_cache() {
        let store = Arc::new(CredentialStore::new(64, Duration::from_secs(60)));
        let api = ScriptedApi::failing_first();

        let err = store
            .get_or_resolve(api.clone(), "studio", "gd-studio", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Credential { .. }));

        // Second caller starts a fresh flight instead of replaying the error.
        store
            .get_or_resolve(api.clone(), "studio", "gd-studio", None)
            .await
            .unwrap();
        assert_eq!(api.call_count(), 2);
    }

    #[tokio::test]
    async fn test_abandoned_caller_does_not_cancel_flight() {
        let store = Arc::new(CredentialStore::new(64, Duration::from_secs(60)));
        let api = ScriptedApi::slow();

        let first = {
            let store = store.clone();
            let api = api.clone();
            tokio::spawn(async move {
                store
                    .get_or_resolve(api, "studio", "gd-studio", None)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        first.abort();

        // The flight keeps running; its result lands in the cache.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(store.get_cached("studio", "gd-studio", "v1").is_some());
        assert_eq!(api.call_count(), 1);
    }
}
