//! Infrastructure services

mod fetch_coordinator;

pub use fetch_coordinator::FetchCoordinator;
