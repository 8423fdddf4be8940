//! Metrics sink used by the reconcile core.
//!
//! The Prometheus registry in [`crate::health::Metrics`] is the production
//! sink; [`NoopMetrics`] discards everything.

use std::fmt;

use crate::controller::kinds::ChildKind;

/// Mutating verb applied to a child object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verb {
    Create,
    Update,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Delete => "delete",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters and gauges written during reconciliation.
pub trait MetricsSink: Send + Sync {
    /// A create, update or delete that changed cluster state.
    fn record_child(&self, kind: ChildKind, verb: Verb);

    /// A status subresource write.
    fn record_status_update(&self);

    /// Pod counts last written to a record's status.
    fn record_pods(&self, namespace: &str, name: &str, pods: i64, ready: i64);

    fn record_reconcile(&self, namespace: &str, name: &str, duration_secs: f64);

    fn record_error(&self, namespace: &str, name: &str);
}

/// Sink that records nothing.
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_child(&self, _kind: ChildKind, _verb: Verb) {}
    fn record_status_update(&self) {}
    fn record_pods(&self, _namespace: &str, _name: &str, _pods: i64, _ready: i64) {}
    fn record_reconcile(&self, _namespace: &str, _name: &str, _duration_secs: f64) {}
    fn record_error(&self, _namespace: &str, _name: &str) {}
}
