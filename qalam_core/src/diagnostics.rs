//! Execution statistics. No `tracing`/log crate is pulled in here —
//! plain atomic counters sampled at the end of a run beat a structured
//! logging pipeline for this, and the evaluator has no use for
//! per-event logs at this layer (a host embedding this crate is
//! expected to log at its own boundary). `#![deny(clippy::print_stderr)]`
//! at the crate root keeps this module honest: nothing in here ever
//! prints directly.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ExecutionStats {
    pub nodes_evaluated: AtomicU64,
    pub function_calls: AtomicU64,
    pub host_invocations: AtomicU64,
    pub contexts_created: AtomicU64,
    pub contexts_retired: AtomicU64,
    pub tasks_spawned: AtomicU64,
    pub loop_iterations: AtomicU64,
    pub numeric_promotions: AtomicU64,
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_node(&self) {
        self.nodes_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_function_call(&self) {
        self.function_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_host_invocation(&self) {
        self.host_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_context_created(&self) {
        self.contexts_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_context_retired(&self) {
        self.contexts_retired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_spawned(&self) {
        self.tasks_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_loop_iteration(&self) {
        self.loop_iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_numeric_promotion(&self) {
        self.numeric_promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ExecutionStatsSnapshot {
        ExecutionStatsSnapshot {
            nodes_evaluated: self.nodes_evaluated.load(Ordering::Relaxed),
            function_calls: self.function_calls.load(Ordering::Relaxed),
            host_invocations: self.host_invocations.load(Ordering::Relaxed),
            contexts_created: self.contexts_created.load(Ordering::Relaxed),
            contexts_retired: self.contexts_retired.load(Ordering::Relaxed),
            tasks_spawned: self.tasks_spawned.load(Ordering::Relaxed),
            loop_iterations: self.loop_iterations.load(Ordering::Relaxed),
            numeric_promotions: self.numeric_promotions.load(Ordering::Relaxed),
        }
    }
}

/// A plain-data copy of `ExecutionStats` for reporting; serializable so
/// a host can emit it as structured output if it wants to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ExecutionStatsSnapshot {
    pub nodes_evaluated: u64,
    pub function_calls: u64,
    pub host_invocations: u64,
    pub contexts_created: u64,
    pub contexts_retired: u64,
    pub tasks_spawned: u64,
    pub loop_iterations: u64,
    pub numeric_promotions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_increment() {
        let stats = ExecutionStats::new();
        stats.record_node();
        stats.record_node();
        stats.record_function_call();
        let snap = stats.snapshot();
        assert_eq!(snap.nodes_evaluated, 2);
        assert_eq!(snap.function_calls, 1);
        assert_eq!(snap.contexts_created, 0);
    }
}
