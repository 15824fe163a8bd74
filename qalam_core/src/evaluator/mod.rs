//! The Evaluator: a post-order traversal of the parse-tree contract
//! (`node::Node`). One function per node category, threading a mutable
//! `ExecutionEnv` through — shaped around a tree walk rather than
//! bytecode dispatch, since this crate's contract is a parse tree, not
//! compiled instructions.

pub mod node;

mod async_;
mod control_flow;
mod expr;
mod stmt;

use crate::env::ExecutionEnv;
use crate::error::RuntimeError;
use crate::stacks::Signal;
use crate::value::Value;
use node::Node;

/// What a node evaluation can produce besides a `Value`: either a real
/// error, or a control-flow signal that hasn't yet reached the
/// construct meant to absorb it. Kept distinct from `RuntimeError`
/// itself so `?` can't accidentally let a `break` escape as
/// if it were a failure.
#[derive(Debug, Clone)]
pub enum Flow {
    Error(RuntimeError),
    Signal(Signal),
}

impl From<RuntimeError> for Flow {
    fn from(e: RuntimeError) -> Self {
        Flow::Error(e)
    }
}

pub type EvalResult = Result<Value, Flow>;

/// Evaluates a single node, dispatching to the category-specific
/// modules. This is the one recursive entry point every sub-evaluator
/// calls back into for its children, keeping the post-order property:
/// children are always evaluated before the parent combines their
/// results.
pub fn eval(node: &Node, env: &mut ExecutionEnv) -> EvalResult {
    let check_yield = env.tick();
    // Cooperative cancellation: only set on a task's own forked env (see
    // `ExecutionEnv::fork_for_task`), and only polled at the same
    // `cooperative_yield_every`-node cadence `RuntimeConfig` documents
    // for cooperative checks generally, rather than on every single node.
    if check_yield {
        if let Some(flag) = &env.cancel_flag {
            if flag.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(Flow::Signal(Signal::Cancelled));
            }
        }
    }
    match node {
        Node::Program { statements, .. } | Node::Block { statements, .. } => {
            stmt::eval_block(statements, env)
        }
        Node::Declaration { .. } => stmt::eval_declaration(node, env),
        Node::MultiDeclaration { .. } => stmt::eval_multi_declaration(node, env),
        Node::Assignment { target, value, .. } => stmt::eval_assignment(target, value, env),
        Node::FunctionDecl { .. } => stmt::eval_function_decl(node, env),
        Node::BehaviorDecl { .. } => stmt::eval_behavior_decl(node, env),
        Node::Import {
            path,
            alias,
            location,
        } => stmt::eval_import(path, alias.as_deref(), *location, env),
        Node::Throw { value, .. } => stmt::eval_throw(value, env),

        Node::Identifier { name, location } => expr::eval_identifier(name, *location, env),
        Node::Literal { value, .. } => Ok(expr::eval_literal(value)),
        Node::BinaryExpr {
            op,
            left,
            right,
            location,
        } => expr::eval_binary(*op, left, right, *location, env),
        Node::UnaryExpr {
            op,
            operand,
            location,
        } => expr::eval_unary(*op, operand, *location, env),
        Node::Call {
            callee,
            arguments,
            ordinal,
            location,
        } => expr::eval_call(callee, arguments, *ordinal, *location, env),
        Node::MethodCall {
            receiver,
            method_name,
            arguments,
            ordinal,
            location,
        } => expr::eval_method_call(receiver, method_name, arguments, *ordinal, *location, env),
        Node::Index {
            target,
            index,
            location,
        } => expr::eval_index(target, index, *location, env),
        Node::FieldAccess {
            target,
            field,
            location,
        } => expr::eval_field_access(target, field, *location, env),
        Node::TupleLiteral { elements, .. } => expr::eval_tuple_literal(elements, env),
        Node::ListLiteral { elements, .. } => expr::eval_list_literal(elements, env),
        Node::ObjectLiteral {
            type_name, fields, ..
        } => expr::eval_object_literal(type_name.as_deref(), fields, env),

        Node::If { .. } => control_flow::eval_if(node, env),
        Node::WhileLoop { .. } => control_flow::eval_while(node, env),
        Node::RepeatLoop { .. } => control_flow::eval_repeat(node, env),
        Node::IndexedLoop { .. } => control_flow::eval_indexed_loop(node, env),
        Node::ForeachLoop { .. } => control_flow::eval_foreach_loop(node, env),
        Node::Break {
            label,
            value,
            location,
        } => {
            check_label(label, *location, env)?;
            let v = match value {
                Some(n) => eval(n, env)?,
                None => Value::None,
            };
            Err(Flow::Signal(Signal::Break {
                label: label.clone(),
                value: v,
            }))
        }
        Node::Continue { label, location } => {
            check_label(label, *location, env)?;
            Err(Flow::Signal(Signal::Continue {
                label: label.clone(),
            }))
        }
        Node::Return { value, .. } => control_flow::eval_return(value.as_deref(), env),
        Node::TryMatch { .. } => control_flow::eval_try_match(node, env),

        Node::Spawn { body, .. } => async_::eval_spawn(body, env),
        Node::Await { value, .. } => async_::eval_await(value, env),
        Node::Scope { body, .. } => async_::eval_scope(body, env),
    }
}

/// Validates a labeled `break`/`continue` against the loop stack before
/// it's turned into a `Signal` (an unlabeled `break`/`continue`
/// always targets the nearest loop and needs no check; a label that
/// names no currently-active loop is `InvalidLoopLabel`).
fn check_label(
    label: &Option<String>,
    location: Option<crate::span::SourceLocation>,
    env: &ExecutionEnv,
) -> Result<(), Flow> {
    if env.loop_stack.is_empty() {
        return Err(Flow::Error(RuntimeError::invalid_loop_label(
            label.clone().unwrap_or_else(|| "<none>".to_string()),
            location,
        )));
    }
    if let Some(l) = label {
        if env.loop_stack.innermost_label() == Some(l.as_str()) {
            return Err(Flow::Error(RuntimeError::invalid_loop_label(
                l.clone(),
                location,
            )));
        }
        if !env.loop_stack.contains_label(l) {
            return Err(Flow::Error(RuntimeError::invalid_loop_label(
                l.clone(),
                location,
            )));
        }
    }
    Ok(())
}

/// Entry point for a top-level program: `evaluate(programNode, args) →
/// Value`. `args` is exposed to the program under two names
/// bound directly into the root context before the body runs:
/// `arguments` (the tuple itself) and `argumentCount` (its arity) — a
/// non-tuple `args` is still bound as `arguments` verbatim, with
/// `argumentCount` left at `0`, since only a tuple has a meaningful
/// arity to report.
///
/// Converts a stray `Signal::Return` into its value (a `return` at
/// program scope just ends the program early), while a stray
/// `break`/`continue` outside any loop is an internal bug — the
/// loop-stack check in `control_flow` should have already turned that
/// into `InvalidLoopLabel` before it got this far.
pub fn eval_program(
    node: &Node,
    args: Value,
    env: &mut ExecutionEnv,
) -> crate::error::RuntimeResult<Value> {
    let _gil = crate::gil::acquire();
    let argument_count = match &args {
        Value::Tuple(t) => t.arity(),
        _ => 0,
    };
    crate::context::registry::define_variable(
        env.current_context,
        crate::decl::DeclaredVariable::new("arguments", args, true, false),
    )?;
    crate::context::registry::define_variable(
        env.current_context,
        crate::decl::DeclaredVariable::new("argumentCount", Value::int(argument_count as i64), true, false),
    )?;
    match eval(node, env) {
        Ok(v) => Ok(v),
        Err(Flow::Error(e)) => Err(e),
        Err(Flow::Signal(Signal::Return { value })) => Ok(value),
        Err(Flow::Signal(Signal::Break { label, .. } | Signal::Continue { label })) => {
            Err(RuntimeError::invalid_loop_label(
                label.unwrap_or_else(|| "<unlabeled>".to_string()),
                None,
            ))
        }
        // The program's own thread never has `cancel_flag` set (only a
        // forked task env does), so this can't actually occur here; kept
        // to stay exhaustive without an `_` arm swallowing a future signal.
        Err(Flow::Signal(Signal::Cancelled)) => Ok(Value::None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::context::registry;
    use crate::diagnostics::ExecutionStats;
    use crate::host::{HostInvocationService, Invocable};
    use node::{Literal, NodeRef};
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

    fn ident(name: &str) -> NodeRef {
        Arc::new(Node::Identifier {
            name: name.into(),
            location: None,
        })
    }

    #[test]
    fn program_binds_arguments_and_argument_count() {
        let mut env = test_env();
        let args = Value::tuple(vec![Value::int(1), Value::int(2), Value::int(3)]);
        let program = Node::Program {
            statements: vec![ident("argumentCount")],
            location: None,
        };
        let result = eval_program(&program, args, &mut env).unwrap();
        assert_eq!(result.to_string(), "3");
    }

    #[test]
    fn program_exposes_the_arguments_tuple_by_name() {
        let mut env = test_env();
        let args = Value::tuple(vec![Value::text("a"), Value::text("b")]);
        let program = Node::Program {
            statements: vec![ident("arguments")],
            location: None,
        };
        let result = eval_program(&program, args, &mut env).unwrap();
        assert_eq!(result.to_string(), "(a, b)");
    }

    #[test]
    fn a_return_at_program_scope_ends_evaluation_early_with_its_value() {
        let mut env = test_env();
        let program = Node::Program {
            statements: vec![Arc::new(Node::Return {
                value: Some(Arc::new(Node::Literal {
                    value: Literal::Int(42),
                    location: None,
                })),
                location: None,
            })],
            location: None,
        };
        let result = eval_program(&program, Value::tuple(vec![]), &mut env).unwrap();
        assert_eq!(result.to_string(), "42");
    }
}
