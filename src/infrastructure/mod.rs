//! Infrastructure layer - Cache store, transport and coordinator implementations

pub mod cache;
pub mod http;
pub mod logging;
pub mod observability;
pub mod services;
