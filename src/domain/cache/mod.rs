//! Cache domain - key derivation for the shared fetch cache

mod key;

pub use key::{CacheKey, CacheKeyGenerator};
