//! Cache infrastructure - the shared fetch cache store

mod entry;
mod store;

pub use entry::{
    CacheEntry, FetchFailure, FetchOutcome, PendingFetch, ResolvedValue, Subscription,
};
pub use store::{Acquired, CacheStore, FetchComputation};
