//! The trace/observer interface (spec §4.9, §9): hosts can register one
//! or more [`Trace`] implementations to observe graph lifecycle and
//! evaluation events without participating in them.
//!
//! Every method has a default no-op body, so a trace only needs to
//! override the events it cares about — the same shape as the teacher
//! crate's `Observer` hooks.

use crate::identity::AttributeId;

/// Observes graph lifecycle and evaluation events. Traces are called in
/// reverse registration order (spec §4.9: most-recently-added first),
/// and are never given a chance to mutate the graph — every method takes
/// `&self`.
pub trait Trace: Send + Sync {
    fn created(&self, _node: AttributeId) {}
    fn destroyed(&self, _node: AttributeId) {}

    fn begin_update(&self, _node: AttributeId) {}
    fn end_update(&self, _node: AttributeId, _changed: bool) {}

    fn added_edge(&self, _node: AttributeId, _input: AttributeId) {}
    fn removed_edge(&self, _node: AttributeId, _input: AttributeId) {}

    fn set_dirty(&self, _node: AttributeId) {}
    fn set_pending(&self, _node: AttributeId) {}
    fn mark_value(&self, _node: AttributeId) {}

    /// Fired when the value-layout comparator (spec §4.7) rejects two
    /// values as unequal and `ValueCompareOptions::REPORT_FAILURES` was
    /// set.
    fn compare_failed(&self, _node: AttributeId) {}

    /// Escape hatch for host-defined instrumentation events that don't
    /// fit the fixed hooks above.
    fn custom_event(&self, _label: &str) {}
}

/// A [`Trace`] that only counts how many times each hook fired. Useful
/// in tests and as a starting point for hosts that want basic
/// instrumentation without writing their own implementation (SPEC_FULL
/// §10).
#[derive(Debug, Default)]
pub struct CountingTrace {
    pub updates_begun: std::sync::atomic::AtomicU64,
    pub updates_ended: std::sync::atomic::AtomicU64,
    pub changes: std::sync::atomic::AtomicU64,
    pub edges_added: std::sync::atomic::AtomicU64,
    pub edges_removed: std::sync::atomic::AtomicU64,
    pub compare_failures: std::sync::atomic::AtomicU64,
}

impl CountingTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates_begun(&self) -> u64 {
        self.updates_begun.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn changes(&self) -> u64 {
        self.changes.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl Trace for CountingTrace {
    fn begin_update(&self, _node: AttributeId) {
        self.updates_begun.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    fn end_update(&self, _node: AttributeId, changed: bool) {
        self.updates_ended.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        if changed {
            self.changes.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }

    fn added_edge(&self, _node: AttributeId, _input: AttributeId) {
        self.edges_added.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    fn removed_edge(&self, _node: AttributeId, _input: AttributeId) {
        self.edges_removed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    fn compare_failed(&self, _node: AttributeId) {
        self.compare_failures.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::AttributeId;

    #[test]
    fn counting_trace_tracks_updates_and_changes() {
        let trace = CountingTrace::new();
        let id = AttributeId::direct(1);
        trace.begin_update(id);
        trace.end_update(id, true);
        trace.begin_update(id);
        trace.end_update(id, false);
        assert_eq!(trace.updates_begun(), 2);
        assert_eq!(trace.changes(), 1);
    }
}
