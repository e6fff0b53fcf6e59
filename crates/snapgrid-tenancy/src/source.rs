//! Config source seam and composition-root factory.
//!
//! The rest of the application talks to a `ConfigSource`, not to the
//! resolver directly. Two implementations exist: the orchestrator-backed
//! resolver, and a single-tenant source fed entirely from the environment
//! (no caching, no network). The factory picks one explicitly; there is
//! no ambient singleton.

use crate::config::Settings;
use crate::error::{ConfigError, ResolveError};
use crate::host;
use crate::model::{CredentialMaterial, RuntimeContext};
use crate::resolver::TenantResolver;
use crate::transport::HttpOrchestratorClient;
use std::sync::Arc;

/// What the application consumes: runtime context and named credentials
/// for a host, with the four-kind failure taxonomy.
#[async_trait::async_trait]
pub trait ConfigSource: Send + Sync {
    /// Resolve the runtime context for an inbound host.
    async fn runtime_for_host(
        &self,
        host: &str,
        request_id: Option<&str>,
    ) -> Result<RuntimeContext, ResolveError>;

    /// Resolve one named credential for an inbound host.
    async fn credential_for_host(
        &self,
        host: &str,
        reference: &str,
        request_id: Option<&str>,
    ) -> Result<CredentialMaterial, ResolveError>;
}

#[async_trait::async_trait]
impl ConfigSource for TenantResolver {
    async fn runtime_for_host(
        &self,
        host: &str,
        request_id: Option<&str>,
    ) -> Result<RuntimeContext, ResolveError> {
        self.resolve_runtime(host, request_id).await
    }

    async fn credential_for_host(
        &self,
        host: &str,
        reference: &str,
        request_id: Option<&str>,
    ) -> Result<CredentialMaterial, ResolveError> {
        self.resolve_credential_for_host(host, reference, request_id)
            .await
    }
}

/// Single-tenant source with a fixed context. Serves one tenant for every
/// valid host; never touches the network.
pub struct EnvConfigSource {
    context: RuntimeContext,
}

impl EnvConfigSource {
    /// Build from a fixed tenant label and config document.
    pub fn new(tenant: &str, config: serde_json::Value) -> Self {
        Self {
            context: RuntimeContext {
                host: String::new(),
                tenant: tenant.to_string(),
                schema_version: 2,
                config_version: "env".to_string(),
                ttl_seconds: 0,
                config,
                credentials: Default::default(),
            },
        }
    }

    /// Build from `SNAPGRID_TENANT` and optional `SNAPGRID_CONFIG_JSON`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let tenant = std::env::var("SNAPGRID_TENANT")
            .map_err(|_| ConfigError::Missing("SNAPGRID_TENANT"))?;
        let config = match std::env::var("SNAPGRID_CONFIG_JSON") {
            Ok(raw) => serde_json::from_str(&raw).map_err(|_| ConfigError::Invalid {
                name: "SNAPGRID_CONFIG_JSON",
                value: raw,
            })?,
            Err(_) => serde_json::Value::Object(Default::default()),
        };
        Ok(Self::new(&tenant, config))
    }
}

#[async_trait::async_trait]
impl ConfigSource for EnvConfigSource {
    async fn runtime_for_host(
        &self,
        raw_host: &str,
        _request_id: Option<&str>,
    ) -> Result<RuntimeContext, ResolveError> {
        if !host::validate(raw_host) {
            return Err(ResolveError::InvalidHost(raw_host.to_string()));
        }
        let mut ctx = self.context.clone();
        ctx.host = host::normalize(raw_host);
        Ok(ctx)
    }

    async fn credential_for_host(
        &self,
        _host: &str,
        reference: &str,
        _request_id: Option<&str>,
    ) -> Result<CredentialMaterial, ResolveError> {
        Err(ResolveError::Credential {
            reference: reference.to_string(),
            detail: "env-first source carries no credential references".to_string(),
        })
    }
}

/// Build the orchestrator-backed source a process holds for its lifetime.
pub fn build_source(settings: &Settings) -> Arc<dyn ConfigSource> {
    let api = Arc::new(HttpOrchestratorClient::new(
        &settings.orchestrator_url,
        &settings.service_token,
        settings.prefer_body_lookup,
    ));
    Arc::new(TenantResolver::new(api, settings))
}
