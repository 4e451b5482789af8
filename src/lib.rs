//! PMP Fetch Cache
//!
//! Cached, coalesced fetching of remote JSON resources:
//! - A process-wide cache keyed by endpoint and canonical parameters
//! - At most one in-flight request per key, shared by every caller
//! - Per-consumer loading/data/error state with stale-response fencing
//! - Failures are reported but never cached

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::{
    DomainError, Endpoint, FetchError, FetchOptions, FetchParams, FetchState, FetchStatus,
    Transport,
};
pub use infrastructure::cache::CacheStore;
pub use infrastructure::http::HttpTransport;
pub use infrastructure::services::FetchCoordinator;
