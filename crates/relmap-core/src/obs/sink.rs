//! Metrics sink boundary.
//!
//! Repositories never touch counters directly. All instrumentation flows
//! through `MetricsEvent` into the sink the entity manager was built with.

///
/// OperationKind
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OperationKind {
    Get,
    Find,
    Persist,
    Delete,
    Refresh,
}

///
/// CacheTier
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CacheTier {
    Identity,
    Result,
}

///
/// StatementKind
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent<'a> {
    Operation {
        kind: OperationKind,
        entity: &'a str,
    },
    CacheHit {
        tier: CacheTier,
        entity: &'a str,
    },
    CacheMiss {
        tier: CacheTier,
        entity: &'a str,
    },
    Statement {
        kind: StatementKind,
        table: &'a str,
    },
    RowsDecoded {
        entity: &'a str,
        rows: u64,
    },
    Invalidated {
        entity: &'a str,
    },
    Rollback {
        kind: OperationKind,
        entity: &'a str,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent<'_>);
}

///
/// NoopSink
/// Default sink; discards every event.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn record(&self, _: MetricsEvent<'_>) {}
}
