//! Fetch domain - endpoints, parameters and consumer view state

mod endpoint;
mod params;
mod state;

pub use endpoint::Endpoint;
pub use params::{canonicalize, params_equal, values_equal, FetchParams};
pub use state::{FetchError, FetchOptions, FetchState, FetchStatus};
