//! Failure taxonomy for tenant resolution.
//!
//! Four caller-visible kinds, plus the transport-level result kinds they
//! are derived from. All variants carry owned strings so results can be
//! cloned across coalesced waiters.

/// Caller-visible resolution failure.
///
/// The kinds are distinct and non-overlapping: a caller can always tell a
/// bad host from a missing tenant from an upstream outage from a secret
/// that could not be resolved.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    /// Host failed shape validation. Raised before any network call.
    #[error("invalid host: {0}")]
    InvalidHost(String),

    /// The orchestrator does not know this tenant, or the envelope's
    /// schema/app-type did not match. Terminal, non-retryable.
    #[error("tenant not found for host {0}")]
    TenantNotFound(String),

    /// Retries exhausted or the response shape was unusable. The resolver
    /// may convert this into a stale cache hit; nothing else may.
    #[error("orchestrator unavailable: {0}")]
    Unavailable(String),

    /// Credential endpoint said not-found/forbidden, or returned an
    /// unusable document. Never served from stale cache.
    #[error("credential resolution failed for {reference}: {detail}")]
    Credential {
        /// The credential reference that failed to resolve.
        reference: String,
        /// Upstream detail.
        detail: String,
    },
}

/// Transport-level outcome kinds.
///
/// Retry handling in the client is a plain match over these instead of
/// status-code sniffing at every call site.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    /// 404 from the orchestrator. Terminal.
    #[error("not found")]
    NotFound,

    /// 403 from the orchestrator. Terminal.
    #[error("authorization failed")]
    Forbidden,

    /// Connection failure, retryable status after budget exhaustion, or
    /// any unexpected status.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    /// 200 with a body that did not decode to the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Configuration loading failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable was absent or empty.
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    /// A setting was present but unparsable.
    #[error("invalid value for {name}: {value}")]
    Invalid {
        /// Setting name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}
