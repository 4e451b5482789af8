//! Observability infrastructure - Metrics

mod metrics;

pub use metrics::{
    init_metrics, record_cache_lookup, record_transport_request, CacheOutcome, PrometheusMetrics,
};
