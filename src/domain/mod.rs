//! Domain layer - Core types for cached, coalesced fetching

pub mod cache;
pub mod error;
pub mod fetch;
pub mod transport;

pub use cache::{CacheKey, CacheKeyGenerator};
pub use error::DomainError;
pub use fetch::{
    canonicalize, params_equal, values_equal, Endpoint, FetchError, FetchOptions, FetchParams,
    FetchState, FetchStatus,
};
pub use transport::Transport;
