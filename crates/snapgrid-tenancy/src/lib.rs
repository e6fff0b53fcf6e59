//! Snapgrid Tenancy Core
//!
//! Resolves, caches and refreshes per-tenant runtime configuration and
//! secret material against the platform orchestrator service.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     TENANT RESOLUTION PIPELINE                  │
//! │                                                                 │
//! │  inbound host                                                   │
//! │       │                                                         │
//! │  ┌────▼─────┐   ┌──────────────┐   ┌───────────────────────┐   │
//! │  │   Host   │──▶│ Runtime Cfg  │──▶│      Transport        │   │
//! │  │ Resolver │   │ Cache (LRU,  │   │  (retry + method      │   │
//! │  └──────────┘   │ stale-aware) │   │   negotiation)        │   │
//! │                 └──────┬───────┘   └──────────┬────────────┘   │
//! │                        │                      │                 │
//! │                 ┌──────▼──────────────────────▼────────────┐   │
//! │                 │        Credential Store                   │   │
//! │                 │  (TTL cache + version index +             │   │
//! │                 │   single-flight coalescer)                │   │
//! │                 └──────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod credentials;
pub mod error;
pub mod host;
pub mod model;
pub mod resolver;
pub mod runtime_cache;
pub mod source;
pub mod transport;

pub use config::Settings;
pub use credentials::CredentialStore;
pub use error::{ConfigError, ResolveError, UpstreamError};
pub use model::{CredentialMaterial, RuntimeContext, RuntimeEnvelope};
pub use resolver::{StatsSnapshot, TenantResolver};
pub use runtime_cache::RuntimeConfigCache;
pub use source::{build_source, ConfigSource, EnvConfigSource};
pub use transport::{HttpOrchestratorClient, OrchestratorApi, RetryPolicy};
