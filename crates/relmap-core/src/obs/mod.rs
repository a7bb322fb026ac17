//! Observability: metrics events and sink implementations.
//!
//! Logging goes through `tracing` at the call sites; this module only
//! carries counters.

mod counters;
mod sink;


pub use counters::{
    CacheCounters, CounterSink, EntityCounters, MetricsCounters, OperationCounters,
    StatementCounters,
};
pub use sink::{CacheTier, MetricsEvent, MetricsSink, NoopSink, OperationKind, StatementKind};
