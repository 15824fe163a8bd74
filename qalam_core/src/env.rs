//! `ExecutionEnv`: per-OS-thread state container. Everything a single
//! evaluating thread needs that must NOT be shared across threads —
//! the call stack, the loop stack, its current context pointer — lives
//! here; everything that genuinely is shared (the context tree,
//! execution stats, the host service) is handed in by reference/`Arc`.
//! A single-interpreter call-stack design split into "one
//! `ExecutionEnv` per cooperative thread" to give OS-thread-level
//! parallelism across spawned tasks.

use crate::config::RuntimeConfig;
use crate::context::ContextId;
use crate::diagnostics::ExecutionStats;
use crate::host::HostInvocationService;
use crate::imports::{CycleGuard, ImportResolver};
use crate::stacks::{CallStack, LoopStack};
use crate::value::TaskHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// A task-collection frame opened by a `scope` block: tasks
/// spawned while this frame is on top of `ExecutionEnv::scope_stack`
/// register here instead of (or in addition to) running free, so the
/// enclosing `scope` can await all of them together when its body ends.
#[derive(Default)]
pub struct ScopeFrame {
    pub ordered: bool,
    pub tasks: Vec<TaskHandle>,
}

pub struct ExecutionEnv {
    pub current_context: ContextId,
    pub call_stack: CallStack,
    pub loop_stack: LoopStack,
    /// Per-thread stack of in-flight `scope` frames, each holding the
    /// tasks spawned inside it; `spawn` registers its handle into the
    /// innermost open frame, if any.
    pub scope_stack: Vec<ScopeFrame>,
    pub config: Arc<RuntimeConfig>,
    pub stats: Arc<ExecutionStats>,
    pub host: Arc<dyn HostInvocationService>,
    pub imports: Arc<ImportResolver>,
    pub import_cycle_guard: Arc<CycleGuard>,
    /// Evaluator-node boundaries crossed since the last cooperative
    /// yield check; reset each time the scheduler polls this thread's
    /// cancellation flag.
    pub nodes_since_yield_check: usize,
    /// Set only for an `ExecutionEnv` running a spawned task's body —
    /// the same `Arc` backing that task's `TaskHandle::cancel`. Checked
    /// at every node boundary in `evaluator::eval`; `None` on the
    /// program's own thread and on scopes that never cross a `spawn`.
    pub cancel_flag: Option<Arc<AtomicBool>>,
}

impl ExecutionEnv {
    pub fn new(
        root_context: ContextId,
        config: Arc<RuntimeConfig>,
        stats: Arc<ExecutionStats>,
        host: Arc<dyn HostInvocationService>,
    ) -> Self {
        Self {
            current_context: root_context,
            call_stack: CallStack::new(),
            loop_stack: LoopStack::new(),
            scope_stack: Vec::new(),
            config,
            stats,
            host,
            imports: Arc::new(ImportResolver::new()),
            import_cycle_guard: Arc::new(CycleGuard::new()),
            nodes_since_yield_check: 0,
            cancel_flag: None,
        }
    }

    /// Forks a child `ExecutionEnv` for a spawned task, snapshotting
    /// the per-thread state at spawn time. The call stack starts empty
    /// (a task's body is a fresh call, not a continuation of the
    /// spawning frame) but the loop stack is *copied*, not reset: the
    /// loop stack is part of the state a task inherits from its
    /// spawning thread, so a labeled `break`/`continue` inside a task
    /// body can still target a loop the spawn expression sits inside of.
    /// Mutations to the copy never propagate back to the parent thread.
    /// `cancel_flag` is the same `Arc` the caller hands to the new
    /// task's `TaskHandle`, so cancellation requested through the handle
    /// is visible inside the forked env's own `eval` loop.
    pub fn fork_for_task(&self, task_root_context: ContextId, cancel_flag: Arc<AtomicBool>) -> Self {
        Self {
            current_context: task_root_context,
            call_stack: CallStack::new(),
            loop_stack: self.loop_stack.clone(),
            scope_stack: Vec::new(),
            config: self.config.clone(),
            stats: self.stats.clone(),
            host: self.host.clone(),
            imports: self.imports.clone(),
            import_cycle_guard: self.import_cycle_guard.clone(),
            nodes_since_yield_check: 0,
            cancel_flag: Some(cancel_flag),
        }
    }

    /// Call this at every evaluator-node boundary; returns `true` when
    /// it's time for the scheduler to check for a cooperative yield.
    pub fn tick(&mut self) -> bool {
        self.stats.record_node();
        self.nodes_since_yield_check += 1;
        if self.nodes_since_yield_check >= self.config.cooperative_yield_every {
            self.nodes_since_yield_check = 0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Invocable;
    use crate::error::RuntimeResult;
    use crate::value::Value;

    struct NullHost;
    impl HostInvocationService for NullHost {
        fn candidates(&self, _name: &str) -> Vec<Invocable> {
            vec![]
        }
        fn invoke(&self, _invocable: &Invocable, _args: &[Value]) -> RuntimeResult<Value> {
            unimplemented!()
        }
        fn construct(&self, _qualified_type: &str, _args: &[Value]) -> RuntimeResult<Value> {
            unimplemented!()
        }
    }

    #[test]
    fn tick_signals_yield_after_configured_count() {
        let mut cfg = RuntimeConfig::default();
        cfg.cooperative_yield_every = 3;
        let mut env = ExecutionEnv::new(
            ContextId(1),
            Arc::new(cfg),
            Arc::new(ExecutionStats::new()),
            Arc::new(NullHost),
        );
        assert!(!env.tick());
        assert!(!env.tick());
        assert!(env.tick());
    }
}
