//! Task Scheduler: cooperative concurrency over real OS threads. A
//! `spawn` starts a new thread running the given closure (built by the
//! evaluator from an `async` body); threads only suspend —
//! conceptually — at evaluator-node boundaries, where
//! `ExecutionEnv::tick` reports it's time to check the task's
//! cancellation flag. There's no green-thread runtime here:
//! "cooperative" describes when a task *checks in*, not how it's
//! scheduled onto CPUs, which is left entirely to the OS.

use crate::context::{registry, ContextId};
use crate::diagnostics::ExecutionStats;
use crate::error::RuntimeResult;
use crate::value::{TaskHandle, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Spawns `body` on a new OS thread, registering a fresh child context
/// under `owner_context` for it to run in. `cancel` is the flag shared
/// with the `ExecutionEnv` forked for `body` (see
/// `ExecutionEnv::fork_for_task`) — this is the same `Arc` the returned
/// handle's `TaskHandle::cancel` exposes, so `cancel::request_cancel`
/// called on the handle is what `body`'s own `eval` loop observes at
/// its next node boundary. The returned `TaskHandle` is the
/// `Value::Task` the evaluator hands back to the `spawn` expression's
/// caller.
pub fn spawn<F>(
    owner_context: ContextId,
    stats: Arc<ExecutionStats>,
    cancel: Arc<AtomicBool>,
    body: F,
) -> TaskHandle
where
    F: FnOnce(ContextId) -> RuntimeResult<Value> + Send + 'static,
{
    let task_context = registry::register(Some(owner_context));
    if let Some(owner) = registry::get(owner_context) {
        owner.inc_pending_tasks();
    }
    stats.record_task_spawned();

    let handle = TaskHandle {
        id: NEXT_TASK_ID.fetch_add(1, Ordering::SeqCst),
        owner_context,
        result: Arc::new(parking_lot::Mutex::new(None)),
        done: Arc::new((parking_lot::Mutex::new(false), parking_lot::Condvar::new())),
        cancel,
    };

    let result_slot = handle.result.clone();
    let done_signal = handle.done.clone();

    thread::spawn(move || {
        let outcome = {
            let _gil = crate::gil::acquire();
            body(task_context)
        };
        *result_slot.lock() = Some(outcome);

        let (lock, cvar) = &*done_signal;
        *lock.lock() = true;
        cvar.notify_all();

        registry::deregister(task_context);
        if let Some(owner) = registry::get(owner_context) {
            if owner.dec_pending_tasks() {
                registry::finish_pending_removal(owner_context);
            }
        }
    });

    handle
}

/// Blocks the current thread until `task` completes.
pub fn await_task(task: &TaskHandle) -> RuntimeResult<Value> {
    task.join()
}

/// Requests cooperative cancellation. The target task only actually
/// stops the next time its own `ExecutionEnv::tick` crosses a yield
/// boundary and observes `cancel_requested()` — there is no preemption.
pub fn cancel(task: &TaskHandle) {
    task.request_cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::registry;

    fn no_cancel() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    #[test]
    fn spawned_task_completes_and_can_be_awaited() {
        let root = registry::register(None);
        let stats = Arc::new(ExecutionStats::new());
        let handle = spawn(root, stats, no_cancel(), |_ctx| Ok(Value::int(42)));
        let result = await_task(&handle).unwrap();
        assert_eq!(result.to_string(), "42");
    }

    #[test]
    fn owner_context_pending_count_drains_after_task_completes() {
        let root = registry::register(None);
        let stats = Arc::new(ExecutionStats::new());
        let handle = spawn(root, stats, no_cancel(), |_ctx| Ok(Value::None));
        let _ = await_task(&handle);
        // give the spawning thread's post-join bookkeeping a moment
        std::thread::sleep(std::time::Duration::from_millis(10));
        let ctx = registry::get(root).unwrap();
        assert_eq!(ctx.pending_task_count(), 0);
    }

    #[test]
    fn cancellation_flag_is_observable_from_the_handle() {
        let root = registry::register(None);
        let stats = Arc::new(ExecutionStats::new());
        let handle = spawn(root, stats, no_cancel(), |_ctx| Ok(Value::None));
        cancel(&handle);
        assert!(handle.cancel_requested());
        let _ = await_task(&handle);
    }
}
