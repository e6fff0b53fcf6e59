//! Bounded, time-boxed cache for assembled runtime contexts.
//!
//! Unlike the credential cache, expiry here does not evict: an expired
//! entry stays resident and is handed back with `fresh = false`, which is
//! what lets the resolver serve stale configuration when the orchestrator
//! is down. Eviction happens only under capacity pressure, least recently
//! touched first.

use crate::model::RuntimeContext;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

struct Slot {
    value: RuntimeContext,
    expires_at: Instant,
    touched: u64,
}

/// LRU + TTL store keyed by normalized host.
pub struct RuntimeConfigCache {
    inner: Mutex<Inner>,
    stale_served: AtomicU64,
}

struct Inner {
    entries: HashMap<String, Slot>,
    capacity: usize,
    clock: u64,
}

impl RuntimeConfigCache {
    /// Create a cache holding at most `capacity` hosts.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                capacity: capacity.max(1),
                clock: 0,
            }),
            stale_served: AtomicU64::new(0),
        }
    }

    /// Look up a host. Returns the cached context together with a
    /// freshness flag; an expired entry is returned, not discarded.
    pub fn get(&self, host: &str) -> Option<(RuntimeContext, bool)> {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let clock = inner.clock;
        let slot = inner.entries.get_mut(host)?;
        slot.touched = clock;
        let fresh = slot.expires_at > Instant::now();
        Some((slot.value.clone(), fresh))
    }

    /// Insert or replace a host's context with the given freshness window,
    /// evicting the least recently touched entry on overflow.
    pub fn set(&self, host: &str, value: RuntimeContext, ttl: Duration) {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let clock = inner.clock;
        inner.entries.insert(
            host.to_string(),
            Slot {
                value,
                expires_at: Instant::now() + ttl,
                touched: clock,
            },
        );
        if inner.entries.len() > inner.capacity {
            if let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, s)| s.touched)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&oldest);
            }
        }
    }

    /// Record that a stale entry was handed to a caller. Counter only.
    pub fn mark_stale_served(&self) {
        self.stale_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of stale serves since startup.
    pub fn stale_served(&self) -> u64 {
        self.stale_served.load(Ordering::Relaxed)
    }

    /// Current entry count.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewind a host's deadline so the entry reads as expired.
    #[cfg(test)]
    pub(crate) fn force_expire(&self, host: &str) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.entries.get_mut(host) {
            slot.expires_at = Instant::now() - Duration::from_secs(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(host: &str) -> RuntimeContext {
        RuntimeContext {
            host: host.to_string(),
            tenant: host.split('.').next().unwrap().to_string(),
            schema_version: 2,
            config_version: "cfg-1".to_string(),
            ttl_seconds: 600,
            config: serde_json::Value::Null,
            credentials: Default::default(),
        }
    }

    #[test]
    fn test_fresh_within_ttl() {
        let cache = RuntimeConfigCache::new(8);
        cache.set("a.shibari.photo", ctx("a.shibari.photo"), Duration::from_secs(60));
        let (value, fresh) = cache.get("a.shibari.photo").unwrap();
        assert!(fresh);
        assert_eq!(value.tenant, "a");
    }

    #[test]
    fn test_expired_entry_served_stale_not_absent() {
        let cache = RuntimeConfigCache::new(8);
        cache.set("a.shibari.photo", ctx("a.shibari.photo"), Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(25));
        let (value, fresh) = cache.get("a.shibari.photo").unwrap();
        assert!(!fresh);
        assert_eq!(value.config_version, "cfg-1");
        // Still resident afterwards.
        assert!(cache.get("a.shibari.photo").is_some());
    }

    #[test]
    fn test_capacity_evicts_least_recently_touched() {
        let cache = RuntimeConfigCache::new(2);
        cache.set("a.s.p", ctx("a.s.p"), Duration::from_secs(60));
        cache.set("b.s.p", ctx("b.s.p"), Duration::from_secs(60));
        // Touch "a" so "b" becomes the eviction candidate.
        cache.get("a.s.p").unwrap();
        cache.set("c.s.p", ctx("c.s.p"), Duration::from_secs(60));

        assert!(cache.get("b.s.p").is_none());
        assert!(cache.get("a.s.p").is_some());
        assert!(cache.get("c.s.p").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_stale_counter() {
        let cache = RuntimeConfigCache::new(2);
        assert_eq!(cache.stale_served(), 0);
        cache.mark_stale_served();
        cache.mark_stale_served();
        assert_eq!(cache.stale_served(), 2);
    }
}
