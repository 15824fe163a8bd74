//! A process-wide lock serializing evaluation across tasks: tasks are
//! cooperative at evaluator-node boundaries, not truly parallel.
//!
//! `Value`'s collection variants use `Rc<RefCell<..>>` for cheap
//! single-threaded shared mutability (see `value` module docs), which
//! makes `Value` itself `!Send`. A spawned task still needs to hand a
//! `Value` result back across the OS thread boundary (`TaskHandle`), so
//! evaluation threads take this lock while actively walking the parse
//! tree and release it at the same yield boundaries `ExecutionEnv::tick`
//! already reports, so no two threads ever touch interpreter state at
//! once. Only one thread ever dereferences a `Value`'s `Rc` at a time
//! as a result, which is what makes the `unsafe impl Send`/`Sync` on
//! `Value` sound in practice.
//!
//! The lock is held for a thread's entire walk of the parse tree, which
//! means any genuine suspension point (`await`, channel
//! receive/send-full) must release it first — otherwise the awaiting
//! thread would hold the lock while blocked, and the task it's waiting
//! on could never acquire it to make progress. `with_released` is that
//! escape hatch; everything that blocks on another thread's evaluation
//! must go through it.
use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};
use std::cell::RefCell;

static GIL: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

thread_local! {
    static CURRENT: RefCell<Option<MutexGuard<'static, ()>>> = RefCell::new(None);
}

/// Holds the process-wide interpreter lock for as long as it's alive.
/// The actual `MutexGuard` lives in this thread's `CURRENT` slot (not
/// inside this struct) so `with_released` can take it out temporarily.
pub struct GilGuard {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl Drop for GilGuard {
    fn drop(&mut self) {
        CURRENT.with(|c| {
            c.borrow_mut().take();
        });
    }
}

/// Acquires the lock, blocking until the currently-running thread (if
/// any) yields it at its next tick boundary.
pub fn acquire() -> GilGuard {
    let guard = GIL.lock();
    CURRENT.with(|c| *c.borrow_mut() = Some(guard));
    GilGuard {
        _not_send: std::marker::PhantomData,
    }
}

/// Releases this thread's hold on the GIL for the duration of `f`, then
/// reacquires it before returning. Call this around every blocking wait
/// on another thread's evaluation (`await`, `scope`'s join, channel
/// receive) — never call a blocking primitive while still holding the
/// lock.
pub fn with_released<T>(f: impl FnOnce() -> T) -> T {
    let held = CURRENT.with(|c| c.borrow_mut().take());
    let result = f();
    if held.is_some() {
        let guard = GIL.lock();
        CURRENT.with(|c| *c.borrow_mut() = Some(guard));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_is_reentrant_safe_across_sequential_calls() {
        let g1 = acquire();
        drop(g1);
        let _g2 = acquire();
    }

    #[test]
    fn with_released_reacquires_after_the_closure_runs() {
        let _g = acquire();
        let ran = with_released(|| 1 + 1);
        assert_eq!(ran, 2);
        // still held: a nested acquire on another thread would block,
        // but this thread can keep going without re-`acquire`ing.
        drop(_g);
    }
}
