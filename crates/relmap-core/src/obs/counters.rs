use crate::obs::sink::{CacheTier, MetricsEvent, MetricsSink, OperationKind, StatementKind};
use std::{
    collections::BTreeMap,
    sync::{Mutex, PoisonError},
};

///
/// OperationCounters
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct OperationCounters {
    pub get_calls: u64,
    pub find_calls: u64,
    pub persist_calls: u64,
    pub delete_calls: u64,
    pub refresh_calls: u64,
    pub rollbacks: u64,
}

///
/// CacheCounters
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CacheCounters {
    pub identity_hits: u64,
    pub identity_misses: u64,
    pub result_hits: u64,
    pub result_misses: u64,
    pub invalidations: u64,
}

///
/// StatementCounters
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StatementCounters {
    pub selects: u64,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
}

impl StatementCounters {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.selects + self.inserts + self.updates + self.deletes
    }
}

///
/// MetricsCounters
/// Point-in-time snapshot of a `CounterSink`.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MetricsCounters {
    pub ops: OperationCounters,
    pub cache: CacheCounters,
    pub statements: StatementCounters,
    pub rows_decoded: u64,
    pub entities: BTreeMap<String, EntityCounters>,
}

///
/// EntityCounters
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EntityCounters {
    pub operations: u64,
    pub rows_decoded: u64,
    pub invalidations: u64,
}

///
/// CounterSink
///
/// Aggregating sink for tests and diagnostics.
///

#[derive(Debug, Default)]
pub struct CounterSink {
    state: Mutex<MetricsCounters>,
}

impl CounterSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsCounters {
        self.with_state(|state| state.clone())
    }

    pub fn reset(&self) {
        self.with_state(|state| *state = MetricsCounters::default());
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MetricsCounters) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

fn bump(counter: &mut u64, by: u64) {
    *counter = counter.saturating_add(by);
}

impl MetricsSink for CounterSink {
    fn record(&self, event: MetricsEvent<'_>) {
        self.with_state(|m| match event {
            MetricsEvent::Operation { kind, entity } => {
                let ops = &mut m.ops;
                match kind {
                    OperationKind::Get => bump(&mut ops.get_calls, 1),
                    OperationKind::Find => bump(&mut ops.find_calls, 1),
                    OperationKind::Persist => bump(&mut ops.persist_calls, 1),
                    OperationKind::Delete => bump(&mut ops.delete_calls, 1),
                    OperationKind::Refresh => bump(&mut ops.refresh_calls, 1),
                }

                let entry = m.entities.entry(entity.to_string()).or_default();
                bump(&mut entry.operations, 1);
            }

            MetricsEvent::CacheHit { tier, .. } => match tier {
                CacheTier::Identity => bump(&mut m.cache.identity_hits, 1),
                CacheTier::Result => bump(&mut m.cache.result_hits, 1),
            },

            MetricsEvent::CacheMiss { tier, .. } => match tier {
                CacheTier::Identity => bump(&mut m.cache.identity_misses, 1),
                CacheTier::Result => bump(&mut m.cache.result_misses, 1),
            },

            MetricsEvent::Statement { kind, .. } => match kind {
                StatementKind::Select => bump(&mut m.statements.selects, 1),
                StatementKind::Insert => bump(&mut m.statements.inserts, 1),
                StatementKind::Update => bump(&mut m.statements.updates, 1),
                StatementKind::Delete => bump(&mut m.statements.deletes, 1),
            },

            MetricsEvent::RowsDecoded { entity, rows } => {
                bump(&mut m.rows_decoded, rows);
                let entry = m.entities.entry(entity.to_string()).or_default();
                bump(&mut entry.rows_decoded, rows);
            }

            MetricsEvent::Invalidated { entity } => {
                bump(&mut m.cache.invalidations, 1);
                let entry = m.entities.entry(entity.to_string()).or_default();
                bump(&mut entry.invalidations, 1);
            }

            MetricsEvent::Rollback { .. } => bump(&mut m.ops.rollbacks, 1),
        });
    }
}
