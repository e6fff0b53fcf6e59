//! Wire model for the orchestrator service and the assembled runtime
//! context handed back to callers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Versioned envelope returned by the runtime-lookup endpoint.
///
/// `config` is treated as an opaque structured document; this subsystem
/// only reads the fixed credential-reference locations out of it and
/// passes the rest through untouched.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeEnvelope {
    /// Envelope schema version. 1 is the reduced feature set, 2 the full
    /// publisher/AI/email block; later versions pass through unmodified.
    #[serde(default)]
    pub schema_version: u32,
    /// Tenant label the orchestrator resolved the host to.
    pub tenant: String,
    /// Application type this configuration belongs to.
    #[serde(default)]
    pub app_type: String,
    /// Opaque version of the configuration document.
    #[serde(default)]
    pub config_version: String,
    /// Freshness window for the runtime config cache, in seconds.
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// The configuration document itself.
    #[serde(default)]
    pub config: serde_json::Value,
}

fn default_ttl() -> u64 {
    300
}

/// Response of the credential-resolution endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CredentialDocument {
    /// Opaque version of the secret material. Part of the cache key.
    pub version: String,
    /// The secret payload.
    #[serde(flatten)]
    pub material: CredentialMaterial,
}

/// Provider-tagged secret payload. Closed set.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum CredentialMaterial {
    /// Storage backend refresh token (photo library access).
    Storage {
        /// OAuth refresh token.
        refresh_token: String,
        /// OAuth client the token was minted for, when the backend needs it.
        #[serde(default)]
        client_id: Option<String>,
    },
    /// Plain API key (captioning / AI providers).
    ApiKey {
        /// The key value.
        key: String,
    },
    /// Messaging bot token (publisher channels).
    Bot {
        /// The bot token.
        token: String,
    },
}

/// Fully assembled per-tenant runtime context.
///
/// This is what the rest of the application consumes: the envelope
/// metadata, the opaque config document, and every credential reference
/// that was resolved while assembling it.
#[derive(Clone, Debug)]
pub struct RuntimeContext {
    /// Normalized host the context was resolved for.
    pub host: String,
    /// Tenant label.
    pub tenant: String,
    /// Raw envelope schema version, passed through unmodified.
    pub schema_version: u32,
    /// Opaque config document version.
    pub config_version: String,
    /// Freshness window the orchestrator granted, in seconds.
    pub ttl_seconds: u64,
    /// The opaque configuration document.
    pub config: serde_json::Value,
    /// Resolved credentials, keyed by the reference string found in the
    /// config document.
    pub credentials: HashMap<String, CredentialMaterial>,
}
