//! Process-level settings for the tenancy subsystem.

use crate::error::ConfigError;
use std::time::Duration;

/// Everything the owning process supplies: orchestrator endpoint and
/// token, tenant-extraction base domain, cache sizing, and the lookup
/// method preference.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Base URL of the orchestrator service.
    pub orchestrator_url: String,
    /// Bearer token presented on every orchestrator call.
    pub service_token: String,
    /// Base domain tenant labels are derived against.
    pub base_domain: String,
    /// Application type this process serves; envelopes for anything else
    /// are treated as unknown tenants.
    pub app_type: String,
    /// Runtime config cache capacity, in hosts.
    pub runtime_cache_capacity: usize,
    /// Credential cache capacity, in secrets.
    pub credential_cache_capacity: u64,
    /// Credential time-to-live. Independent of runtime-config TTLs.
    pub credential_ttl: Duration,
    /// Whether runtime lookup starts on the POST-body form.
    pub prefer_body_lookup: bool,
}

impl Settings {
    /// Load settings from the environment.
    ///
    /// `SNAPGRID_ORCHESTRATOR_URL`, `SNAPGRID_SERVICE_TOKEN` and
    /// `SNAPGRID_BASE_DOMAIN` are required; the rest default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            orchestrator_url: required("SNAPGRID_ORCHESTRATOR_URL")?,
            service_token: required("SNAPGRID_SERVICE_TOKEN")?,
            base_domain: required("SNAPGRID_BASE_DOMAIN")?,
            app_type: optional("SNAPGRID_APP_TYPE", "gallery"),
            runtime_cache_capacity: parsed("SNAPGRID_RUNTIME_CACHE_CAPACITY", 256)?,
            credential_cache_capacity: parsed("SNAPGRID_CREDENTIAL_CACHE_CAPACITY", 512)?,
            credential_ttl: Duration::from_secs(parsed("SNAPGRID_CREDENTIAL_TTL_SECS", 300)?),
            prefer_body_lookup: parsed("SNAPGRID_PREFER_BODY_LOOKUP", true)?,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn optional(name: &'static str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(v) => v.parse().map_err(|_| ConfigError::Invalid { name, value: v }),
        Err(_) => Ok(default),
    }
}
