//! `spawn` / `await` / `scope`. Ties the evaluator into `crate::scheduler`:
//! a `spawn` hands a fresh `ExecutionEnv` (forked so the inheritable
//! per-thread state is snapshotted at spawn time) plus a cloned body
//! node off to a new OS thread; `await` blocks on the returned handle;
//! `scope` opens a task-collection frame so nested spawns can be
//! joined together.

use super::node::NodeRef;
use super::{eval, EvalResult, Flow};
use crate::context::registry;
use crate::env::{ExecutionEnv, ScopeFrame};
use crate::error::RuntimeError;
use crate::value::{TaskHandle, Value};

/// `spawn expr`: runs `expr` in a derived context on a new
/// thread and returns the `Value::Task` handle immediately. If a
/// `scope` frame is open on this thread, the handle is also registered
/// into it so the enclosing `scope` awaits it.
pub fn eval_spawn(body: &NodeRef, env: &mut ExecutionEnv) -> EvalResult {
    let owner = env.current_context;
    let task_root = registry::register(Some(owner));
    let cancel_flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let forked = env.fork_for_task(task_root, cancel_flag.clone());
    let body = body.clone();

    let handle = crate::scheduler::spawn(owner, env.stats.clone(), cancel_flag, move |_task_ctx| {
        let mut task_env = forked;
        match eval(&body, &mut task_env) {
            Ok(v) => Ok(v),
            Err(Flow::Error(e)) => Err(e),
            // Cancellation observed at a node boundary inside this
            // task's own `eval` loop: the task ends early and yields
            // `none`, per spec — the owning context's pending-task
            // counter is still decremented by `scheduler::spawn`'s
            // post-body bookkeeping regardless of how the body ended.
            Err(Flow::Signal(crate::stacks::Signal::Cancelled)) => Ok(Value::None),
            Err(Flow::Signal(sig)) => Err(RuntimeError::internal_bug(format!(
                "loop signal {:?} escaped a spawned task body",
                sig
            ))),
        }
    });

    if let Some(frame) = env.scope_stack.last_mut() {
        frame.tasks.push(handle.clone());
    }

    Ok(Value::Task(handle))
}

/// `await task`: blocks the current OS thread until `task`
/// completes, then yields its value (or propagates its failure as an
/// ordinary runtime error, unwinding exactly as if the awaited
/// computation had run inline inside a `try`-less context).
pub fn eval_await(value: &NodeRef, env: &mut ExecutionEnv) -> EvalResult {
    let awaited = eval(value, env)?;
    let handle = match awaited {
        Value::Task(h) => h,
        other => {
            return Err(Flow::Error(RuntimeError::type_mismatch(
                format!("await expects a task, got {:?}", other.type_descriptor()),
                value.location(),
            )))
        }
    };
    // Mark this thread's current context as awaiting for the duration
    // of the blocking wait, so `registry::lookup_variable` widens to a
    // sibling-context search for a `Task`-valued binding (spec §4.C).
    // Cleared unconditionally on the way out, success or failure.
    let waiting_ctx = registry::get(env.current_context);
    if let Some(ctx) = &waiting_ctx {
        ctx.set_awaiting_task(true);
    }
    let result =
        crate::gil::with_released(|| crate::scheduler::await_task(&handle)).map_err(Flow::Error);
    if let Some(ctx) = &waiting_ctx {
        ctx.set_awaiting_task(false);
    }
    result
}

/// `scope { .. }` / `scope ordered { .. }`: opens a
/// task-collection frame, evaluates the body (nested `spawn`s register
/// into the frame as they run), then awaits every collected task —
/// in spawn order if `ordered`, otherwise in completion order — and
/// returns the awaited results as a tuple.
pub fn eval_scope(node: &super::node::Node, env: &mut ExecutionEnv) -> EvalResult {
    let super::node::Node::Scope {
        ordered,
        body,
        location,
    } = node
    else {
        unreachable!("eval_scope called with non-Scope node")
    };

    env.scope_stack.push(ScopeFrame {
        ordered: *ordered,
        tasks: Vec::new(),
    });

    let body_result = eval(body, env);

    let frame = env
        .scope_stack
        .pop()
        .expect("scope_stack frame pushed just above");

    // Propagate a body failure only after the frame's tasks have all
    // been awaited, so a `scope` never leaks running tasks even when
    // its body raises. The whole wait runs with the GIL released: a
    // blocked awaiter must not hold the lock the tasks it is waiting
    // on need to make progress.
    let outcome: Result<Vec<Value>, RuntimeError> = crate::gil::with_released(|| {
        let mut results: Vec<Value> = Vec::with_capacity(frame.tasks.len());
        if frame.ordered {
            for task in &frame.tasks {
                results.push(crate::scheduler::await_task(task)?);
            }
        } else {
            let mut pending: Vec<TaskHandle> = frame.tasks.clone();
            while !pending.is_empty() {
                let mut still_pending = Vec::with_capacity(pending.len());
                let mut progressed = false;
                for task in pending {
                    if task.is_done() {
                        progressed = true;
                        results.push(crate::scheduler::await_task(&task)?);
                    } else {
                        still_pending.push(task);
                    }
                }
                pending = still_pending;
                if !progressed && !pending.is_empty() {
                    std::thread::yield_now();
                }
            }
        }
        Ok(results)
    });

    let _ = location;
    body_result?;
    Ok(Value::tuple(outcome.map_err(Flow::Error)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::diagnostics::ExecutionStats;
    use crate::evaluator::node::{Literal, Node};
    use crate::host::{HostInvocationService, Invocable};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    struct NullHost;
    impl HostInvocationService for NullHost {
        fn candidates(&self, _name: &str) -> Vec<Invocable> {
            vec![]
        }
        fn invoke(&self, _i: &Invocable, _a: &[Value]) -> crate::error::RuntimeResult<Value> {
            unimplemented!()
        }
        fn construct(&self, _t: &str, _a: &[Value]) -> crate::error::RuntimeResult<Value> {
            unimplemented!()
        }
    }

    fn test_env() -> ExecutionEnv {
        let root = registry::register(None);
        ExecutionEnv::new(
            root,
            Arc::new(RuntimeConfig::default()),
            Arc::new(ExecutionStats::new()),
            Arc::new(NullHost),
        )
    }

    fn int_lit(n: i64) -> NodeRef {
        Arc::new(Node::Literal {
            value: Literal::Int(n),
            location: None,
        })
    }

    #[test]
    fn spawn_then_await_yields_the_bodys_value() {
        let mut env = test_env();
        let task = eval_spawn(&int_lit(7), &mut env).unwrap();
        registry::define_variable(
            env.current_context,
            crate::decl::DeclaredVariable::new("t", task, true, false),
        )
        .unwrap();
        let handle_ref = Arc::new(Node::Identifier {
            name: "t".into(),
            location: None,
        });
        let result = eval_await(&handle_ref, &mut env).unwrap();
        assert_eq!(result.to_string(), "7");
    }

    #[test]
    fn await_of_a_non_task_is_a_type_mismatch() {
        let mut env = test_env();
        let err = eval_await(&int_lit(1), &mut env).unwrap_err();
        assert!(matches!(err, Flow::Error(RuntimeError::TypeMismatch { .. })));
    }

    #[test]
    fn a_cancelled_task_stops_at_the_next_node_boundary_and_yields_none() {
        // An infinite `while true {}` inside a spawned body would never
        // finish on its own; `request_cancel` must still make `await`
        // return promptly, with `none` as the task's result.
        let mut env = test_env();
        let spin = Node::WhileLoop {
            label: None,
            condition: Arc::new(Node::Literal {
                value: Literal::Bool(true),
                location: None,
            }),
            body: Arc::new(Node::Block {
                statements: vec![],
                location: None,
            }),
            location: None,
        };
        let task = eval_spawn(&Arc::new(spin), &mut env).unwrap();
        let handle = match &task {
            Value::Task(h) => h.clone(),
            _ => unreachable!(),
        };
        crate::scheduler::cancel(&handle);
        let result = crate::scheduler::await_task(&handle).unwrap();
        assert_eq!(result.to_string(), "none");
    }

    #[test]
    fn ordered_scope_returns_a_tuple_in_spawn_order() {
        let mut env = test_env();
        let body = Node::Block {
            statements: vec![
                Arc::new(Node::Spawn {
                    body: int_lit(1),
                    location: None,
                }),
                Arc::new(Node::Spawn {
                    body: int_lit(2),
                    location: None,
                }),
            ],
            location: None,
        };
        let scope = Node::Scope {
            ordered: true,
            body: Arc::new(body),
            location: None,
        };
        let result = eval_scope(&scope, &mut env).unwrap();
        assert_eq!(result.to_string(), "(1, 2)");
    }
}
