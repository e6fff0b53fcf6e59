//! Tenant resolution orchestration.
//!
//! Per request: validate the host, consult the runtime config cache, fetch
//! from the orchestrator on a miss, resolve the credential references the
//! envelope points at, and fall back to a stale cache entry when the
//! upstream is down. This is the only place allowed to turn "upstream
//! unavailable" into a successful-but-stale answer.

use crate::config::Settings;
use crate::credentials::CredentialStore;
use crate::error::{ResolveError, UpstreamError};
use crate::host;
use crate::model::{RuntimeContext, RuntimeEnvelope};
use crate::runtime_cache::RuntimeConfigCache;
use crate::transport::OrchestratorApi;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Read-only view of resolver counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatsSnapshot {
    /// Fresh runtime-cache hits.
    pub cache_hits: u64,
    /// Runtime lookups that went upstream.
    pub upstream_fetches: u64,
    /// Stale cache entries served under outage.
    pub stale_served: u64,
    /// Credential callers that attached to an in-flight resolution.
    pub coalesced_waits: u64,
}

/// Coordinates host validation, caching, transport and credential fetch.
pub struct TenantResolver {
    api: Arc<dyn OrchestratorApi>,
    runtime_cache: RuntimeConfigCache,
    credentials: Arc<CredentialStore>,
    base_domain: String,
    app_type: String,
    cache_hits: AtomicU64,
    upstream_fetches: AtomicU64,
}

impl TenantResolver {
    /// Build a resolver over the given orchestrator client.
    pub fn new(api: Arc<dyn OrchestratorApi>, settings: &Settings) -> Self {
        Self {
            api,
            runtime_cache: RuntimeConfigCache::new(settings.runtime_cache_capacity),
            credentials: Arc::new(CredentialStore::new(
                settings.credential_cache_capacity,
                settings.credential_ttl,
            )),
            base_domain: settings.base_domain.clone(),
            app_type: settings.app_type.clone(),
            cache_hits: AtomicU64::new(0),
            upstream_fetches: AtomicU64::new(0),
        }
    }

    /// Resolve the full runtime context for an inbound host.
    pub async fn resolve_runtime(
        &self,
        raw_host: &str,
        request_id: Option<&str>,
    ) -> Result<RuntimeContext, ResolveError> {
        if !host::validate(raw_host) {
            debug!(host = raw_host, "rejected host shape");
            return Err(ResolveError::InvalidHost(raw_host.to_string()));
        }
        let normalized = host::normalize(raw_host);
        let request_id = correlation_id(request_id);

        let stale = match self.runtime_cache.get(&normalized) {
            Some((ctx, true)) => {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                debug!(host = %normalized, "runtime cache hit");
                return Ok(ctx);
            }
            Some((ctx, false)) => Some(ctx),
            None => None,
        };

        self.upstream_fetches.fetch_add(1, Ordering::Relaxed);
        let envelope = match self
            .api
            .fetch_runtime_by_host(&normalized, Some(&request_id))
            .await
        {
            Ok(envelope) => envelope,
            Err(UpstreamError::NotFound) => {
                return Err(ResolveError::TenantNotFound(normalized));
            }
            Err(err @ UpstreamError::Forbidden) => {
                // A rejected service token is not an outage; stale entries
                // must not mask it.
                warn!(host = %normalized, "runtime lookup rejected the service token");
                return Err(ResolveError::Unavailable(err.to_string()));
            }
            Err(err) => return self.degrade(&normalized, stale, err),
        };

        if envelope.schema_version == 0 {
            return Err(ResolveError::TenantNotFound(normalized));
        }
        if !envelope.app_type.is_empty() && envelope.app_type != self.app_type {
            debug!(host = %normalized, app_type = %envelope.app_type, "app type mismatch");
            return Err(ResolveError::TenantNotFound(normalized));
        }

        let tenant = if envelope.tenant.is_empty() {
            host::extract_tenant(&normalized, &self.base_domain)
        } else {
            envelope.tenant.clone()
        };

        let ctx = self
            .assemble(&normalized, &tenant, envelope, &request_id)
            .await?;
        self.runtime_cache.set(
            &normalized,
            ctx.clone(),
            Duration::from_secs(ctx.ttl_seconds),
        );
        info!(host = %normalized, tenant = %ctx.tenant, version = %ctx.config_version, "runtime context resolved");
        Ok(ctx)
    }

    /// Resolve one named credential on behalf of a host.
    pub async fn resolve_credential_for_host(
        &self,
        raw_host: &str,
        reference: &str,
        request_id: Option<&str>,
    ) -> Result<crate::model::CredentialMaterial, ResolveError> {
        if !host::validate(raw_host) {
            return Err(ResolveError::InvalidHost(raw_host.to_string()));
        }
        let normalized = host::normalize(raw_host);
        let tenant = host::extract_tenant(&normalized, &self.base_domain);
        self.credentials
            .get_or_resolve(
                self.api.clone(),
                &tenant,
                reference,
                Some(correlation_id(request_id)),
            )
            .await
    }

    /// Counter snapshot.
    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            upstream_fetches: self.upstream_fetches.load(Ordering::Relaxed),
            stale_served: self.runtime_cache.stale_served(),
            coalesced_waits: self.credentials.coalesced_waits(),
        }
    }

    async fn assemble(
        &self,
        normalized: &str,
        tenant: &str,
        envelope: RuntimeEnvelope,
        request_id: &str,
    ) -> Result<RuntimeContext, ResolveError> {
        let refs = collect_credential_refs(&envelope.config, envelope.schema_version);
        let mut credentials = HashMap::new();
        for reference in refs {
            let material = self
                .credentials
                .get_or_resolve(
                    self.api.clone(),
                    tenant,
                    &reference,
                    Some(request_id.to_string()),
                )
                .await?;
            credentials.insert(reference, material);
        }
        Ok(RuntimeContext {
            host: normalized.to_string(),
            tenant: tenant.to_string(),
            schema_version: envelope.schema_version,
            config_version: envelope.config_version,
            ttl_seconds: envelope.ttl_seconds,
            config: envelope.config,
            credentials,
        })
    }

    fn degrade(
        &self,
        normalized: &str,
        stale: Option<RuntimeContext>,
        err: UpstreamError,
    ) -> Result<RuntimeContext, ResolveError> {
        match stale {
            Some(ctx) => {
                self.runtime_cache.mark_stale_served();
                warn!(host = %normalized, %err, "serving stale runtime context");
                Ok(ctx)
            }
            None => Err(ResolveError::Unavailable(err.to_string())),
        }
    }

    #[cfg(test)]
    pub(crate) fn expire_cached(&self, normalized_host: &str) {
        self.runtime_cache.force_expire(normalized_host);
    }
}

/// Caller-supplied correlation id, or a fresh one.
fn correlation_id(supplied: Option<&str>) -> String {
    match supplied {
        Some(id) => id.to_string(),
        None => uuid::Uuid::new_v4().to_string(),
    }
}

/// Pull every credential reference out of the opaque config document.
///
/// `storage.credentials_ref` exists in every schema version; the
/// publisher/AI/email locations only exist from version 2 on, and a v1
/// document is never probed for them.
fn collect_credential_refs(config: &Value, schema_version: u32) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    let mut push = |r: Option<&str>, refs: &mut Vec<String>| {
        if let Some(r) = r {
            if !r.is_empty() && !refs.iter().any(|existing| existing == r) {
                refs.push(r.to_string());
            }
        }
    };

    push(
        config.pointer("/storage/credentials_ref").and_then(Value::as_str),
        &mut refs,
    );
    if schema_version >= 2 {
        if let Some(publishers) = config.pointer("/publishers").and_then(Value::as_array) {
            for publisher in publishers {
                push(
                    publisher.get("credentials_ref").and_then(Value::as_str),
                    &mut refs,
                );
            }
        }
        push(config.pointer("/ai/credentials_ref").and_then(Value::as_str), &mut refs);
        push(
            config.pointer("/email/credentials_ref").and_then(Value::as_str),
            &mut refs,
        );
    }
    refs
}
