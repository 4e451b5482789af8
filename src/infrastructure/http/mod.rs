//! HTTP infrastructure - reqwest-backed transport

mod transport;

pub use transport::HttpTransport;
