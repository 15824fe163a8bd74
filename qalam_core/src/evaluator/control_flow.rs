//! Control-flow constructs: `if`/`elseif`/`else`, the four loop forms,
//! `return`, and the `try`/`match` construct over `Result`/`Option`.
//!
//! Every loop form pushes exactly one frame onto the loop stack for its
//! entire run (not per iteration) so `break`/`continue` validation in
//! `evaluator::check_label` sees it as active throughout.

use super::node::{MatchArm, Node};
use super::{eval, EvalResult, Flow};
use crate::env::ExecutionEnv;
use crate::error::RuntimeError;
use crate::stacks::Signal;
use crate::value::Value;

pub fn eval_if(node: &Node, env: &mut ExecutionEnv) -> EvalResult {
    let Node::If {
        condition,
        then_branch,
        elseifs,
        else_branch,
        ..
    } = node
    else {
        unreachable!()
    };

    if eval(condition, env)?.is_truthy() {
        return eval(then_branch, env);
    }
    for (cond, body) in elseifs {
        if eval(cond, env)?.is_truthy() {
            return eval(body, env);
        }
    }
    match else_branch {
        Some(body) => eval(body, env),
        None => Ok(Value::None),
    }
}

/// Runs `body`, interpreting `Break`/`Continue` signals addressed to
/// `label` (or unlabeled) as this loop's own control flow, and
/// re-propagating anything else (errors, returns, or a signal meant for
/// an outer loop). `LoopStep::Stop` carries the value `break` yielded
/// (`none` if it was a bare `break`), which becomes the whole loop
/// expression's value.
fn run_iteration(
    body: &Node,
    label: &Option<String>,
    env: &mut ExecutionEnv,
) -> Result<LoopStep, Flow> {
    env.stats.record_loop_iteration();
    match eval(body, env) {
        Ok(_) => Ok(LoopStep::Continue),
        Err(Flow::Signal(Signal::Break { label: l, value })) if targets_this_loop(&l, label) => {
            Ok(LoopStep::Stop(value))
        }
        Err(Flow::Signal(Signal::Continue { label: l })) if targets_this_loop(&l, label) => {
            Ok(LoopStep::Continue)
        }
        Err(other) => Err(other),
    }
}

enum LoopStep {
    Continue,
    Stop(Value),
}

fn targets_this_loop(signal_label: &Option<String>, loop_label: &Option<String>) -> bool {
    match signal_label {
        None => true,
        Some(l) => loop_label.as_deref() == Some(l.as_str()),
    }
}

pub fn eval_while(node: &Node, env: &mut ExecutionEnv) -> EvalResult {
    let Node::WhileLoop {
        label,
        condition,
        body,
        ..
    } = node
    else {
        unreachable!()
    };
    env.loop_stack.push(label.clone());
    let result = (|| -> EvalResult {
        loop {
            if !eval(condition, env)?.is_truthy() {
                return Ok(Value::None);
            }
            match run_iteration(body, label, env)? {
                LoopStep::Continue => continue,
                LoopStep::Stop(v) => return Ok(v),
            }
        }
    })();
    env.loop_stack.pop();
    result
}

pub fn eval_repeat(node: &Node, env: &mut ExecutionEnv) -> EvalResult {
    let Node::RepeatLoop { label, body, .. } = node else {
        unreachable!()
    };
    env.loop_stack.push(label.clone());
    let result = (|| -> EvalResult {
        loop {
            match run_iteration(body, label, env)? {
                LoopStep::Continue => continue,
                LoopStep::Stop(v) => return Ok(v),
            }
        }
    })();
    env.loop_stack.pop();
    result
}

pub fn eval_indexed_loop(node: &Node, env: &mut ExecutionEnv) -> EvalResult {
    let Node::IndexedLoop {
        label,
        variable,
        start,
        end,
        step,
        body,
        location,
    } = node
    else {
        unreachable!()
    };

    let start_v = as_i128(&eval(start, env)?, *location)?;
    let end_v = as_i128(&eval(end, env)?, *location)?;
    let step_v = match step {
        Some(s) => as_i128(&eval(s, env)?, *location)?,
        None => 1,
    };
    // Step must be positive; a range that would need to
    // descend (end < initial) fails symmetrically rather than silently
    // running zero iterations or being inferred as a reverse loop.
    if step_v <= 0 {
        return Err(Flow::Error(RuntimeError::invalid_loop_bounds(
            "step must be greater than zero",
            *location,
        )));
    }
    if end_v < start_v {
        return Err(Flow::Error(RuntimeError::invalid_loop_bounds(
            "descending ranges are not supported; initial must be <= end",
            *location,
        )));
    }

    env.loop_stack.push(label.clone());
    let result = (|| -> EvalResult {
        let mut i = start_v;
        loop {
            if i > end_v {
                return Ok(Value::None);
            }
            let parent = env.current_context;
            let iter_ctx = crate::context::registry::register(Some(parent));
            crate::context::registry::define_variable(
                iter_ctx,
                crate::decl::DeclaredVariable::new(variable.clone(), Value::int(i as i64), false, false),
            )
            .map_err(Flow::Error)?;
            env.current_context = iter_ctx;
            let step_result = run_iteration(body, label, env);
            env.current_context = parent;
            crate::context::registry::deregister(iter_ctx);
            match step_result? {
                LoopStep::Continue => {}
                LoopStep::Stop(v) => return Ok(v),
            }
            i += step_v;
        }
    })();
    env.loop_stack.pop();
    result
}

fn as_i128(v: &Value, location: Option<crate::span::SourceLocation>) -> Result<i128, Flow> {
    match v {
        Value::Number(n) => n
            .as_i128()
            .ok_or_else(|| Flow::Error(RuntimeError::invalid_loop_bounds(
                "loop bound must be an integral number",
                location,
            ))),
        _ => Err(Flow::Error(RuntimeError::type_mismatch(
            "loop bound must be a number",
            location,
        ))),
    }
}

/// `foreach a, b in iterable` destructures each element (a tuple, for
/// multiple targets) into fresh bindings per iteration. Duplicate
/// target names are rejected up front.
pub fn eval_foreach_loop(node: &Node, env: &mut ExecutionEnv) -> EvalResult {
    let Node::ForeachLoop {
        label,
        targets,
        iterable,
        body,
        location,
    } = node
    else {
        unreachable!()
    };

    let mut seen = std::collections::HashSet::new();
    for t in targets {
        if !seen.insert(t.as_str()) {
            return Err(Flow::Error(RuntimeError::foreach_target_duplicate(
                t.clone(),
                *location,
            )));
        }
    }

    let iterable_value = eval(iterable, env)?;
    let is_map = matches!(
        iterable_value,
        Value::OrderedMap(_) | Value::UnorderedMap(_)
    );
    let items = materialize_iterable(&iterable_value, *location)?;

    env.loop_stack.push(label.clone());
    let result = (|| -> EvalResult {
        for (index, item) in items.into_iter().enumerate() {
            let bindings = destructure_foreach_item(index, &item, is_map, targets, *location)?;
            let parent = env.current_context;
            let iter_ctx = crate::context::registry::register(Some(parent));
            for (name, value) in bindings {
                crate::context::registry::define_variable(
                    iter_ctx,
                    crate::decl::DeclaredVariable::new(name, value, false, false),
                )
                .map_err(Flow::Error)?;
            }
            env.current_context = iter_ctx;
            let step_result = run_iteration(body, label, env);
            env.current_context = parent;
            crate::context::registry::deregister(iter_ctx);
            match step_result? {
                LoopStep::Continue => {}
                LoopStep::Stop(v) => return Ok(v),
            }
        }
        Ok(Value::None)
    })();
    env.loop_stack.pop();
    result
}

fn materialize_iterable(
    v: &Value,
    location: Option<crate::span::SourceLocation>,
) -> Result<Vec<Value>, Flow> {
    match v {
        Value::List(l) => Ok(l.borrow().clone()),
        Value::Tuple(t) => Ok(t.0.as_ref().clone()),
        Value::Text(s) => Ok(s.chars().map(Value::Char).collect()),
        Value::OrderedSet(s) => Ok(s
            .borrow()
            .iter()
            .map(|k| key_to_value(k))
            .collect()),
        Value::UnorderedSet(s) => Ok(s
            .borrow()
            .iter()
            .map(|k| key_to_value(k))
            .collect()),
        Value::OrderedMap(m) => Ok(m
            .borrow()
            .iter()
            .map(|(k, v)| Value::tuple(vec![key_to_value(k), v.clone()]))
            .collect()),
        Value::UnorderedMap(m) => Ok(m
            .borrow()
            .iter()
            .map(|(k, v)| Value::tuple(vec![key_to_value(k), v.clone()]))
            .collect()),
        other => Err(Flow::Error(RuntimeError::non_iterable(
            format!("{:?}", other.type_descriptor()),
            location,
        ))),
    }
}

fn key_to_value(k: &crate::value::MapKey) -> Value {
    use crate::value::MapKey;
    match k {
        MapKey::None => Value::None,
        MapKey::Bool(b) => Value::Bool(*b),
        MapKey::Char(c) => Value::Char(*c),
        MapKey::Number(n) => Value::Number(n.0.clone()),
        MapKey::Text(s) => Value::text(s.clone()),
        MapKey::Bytes(b) => Value::Bytes(std::rc::Rc::new(b.clone())),
        MapKey::Tuple(t) => Value::tuple(t.iter().map(key_to_value).collect()),
    }
}

/// Binds a foreach iteration's targets to one of four shapes:
/// single value, `(index, value)`, `(key, value)`, or
/// `(index, key, value)`. Which shapes are available depends on the
/// container: maps expose a `key` (their entries, already materialized
/// as a `(key, value)` tuple by `materialize_iterable`); lists, tuples,
/// and sets only expose a positional `index`.
fn destructure_foreach_item(
    index: usize,
    item: &Value,
    is_map: bool,
    targets: &[String],
    location: Option<crate::span::SourceLocation>,
) -> Result<Vec<(String, Value)>, Flow> {
    let index_value = Value::int(index as i64);
    let (key_value, value_value) = if is_map {
        match item {
            Value::Tuple(t) if t.0.len() == 2 => (t.0[0].clone(), t.0[1].clone()),
            _ => {
                return Err(Flow::Error(RuntimeError::internal_bug(
                    "map foreach item was not a (key, value) pair",
                )))
            }
        }
    } else {
        (Value::None, item.clone())
    };

    match (targets.len(), is_map) {
        (1, _) => Ok(vec![(targets[0].clone(), value_value)]),
        (2, true) => Ok(vec![
            (targets[0].clone(), key_value),
            (targets[1].clone(), value_value),
        ]),
        (2, false) => Ok(vec![
            (targets[0].clone(), index_value),
            (targets[1].clone(), value_value),
        ]),
        (3, true) => Ok(vec![
            (targets[0].clone(), index_value),
            (targets[1].clone(), key_value),
            (targets[2].clone(), value_value),
        ]),
        (n, _) => Err(Flow::Error(RuntimeError::tuple_arity_mismatch(
            n,
            if is_map { 3 } else { 2 },
            location,
        ))),
    }
}

pub fn eval_return(value: Option<&Node>, env: &mut ExecutionEnv) -> EvalResult {
    let v = match value {
        Some(n) => eval(n, env)?,
        None => Value::None,
    };
    Err(Flow::Signal(Signal::Return { value: v }))
}

/// `try { subject } match { ok(v) -> ..., error(e) -> ... }` over a
/// `Result`, or the `some(v)`/`none` shape over an `Option`. Whichever
/// arm matches binds its capture name as a fresh variable visible only
/// in that arm's body.
///
/// Two things can produce the `error` arm: `subject` evaluating to an
/// explicit `Result.Error`/`Option.None` value, or evaluating `subject`
/// *raising* a catchable runtime error (a recoverable failure surfaces
/// as `Result.Error` precisely when it occurs inside a `try` with an
/// error arm). Internal bugs are never caught here and keep unwinding
/// past this arm regardless.
pub fn eval_try_match(node: &Node, env: &mut ExecutionEnv) -> EvalResult {
    let Node::TryMatch {
        subject,
        arms,
        location,
    } = node
    else {
        unreachable!()
    };

    let has = |pattern: &str| arms.iter().any(|a| a.pattern == pattern);

    let (pattern, binding_value) = match eval(subject, env) {
        Err(Flow::Signal(signal)) => return Err(Flow::Signal(signal)),
        Err(Flow::Error(err)) if !err.is_internal() && has("error") => {
            ("error", Some(error_to_value(&err)))
        }
        Err(Flow::Error(err)) => return Err(Flow::Error(err)),
        Ok(Value::ResultOk(v)) => ("ok", Some((*v).clone())),
        Ok(Value::ResultError(e)) => ("error", Some((*e).clone())),
        Ok(Value::OptionSome(v)) => ("some", Some((*v).clone())),
        Ok(Value::OptionNone) => ("none", None),
        Ok(value) if has("ok") => ("ok", Some(value)),
        Ok(value) if has("some") => ("some", Some(value)),
        Ok(_) => {
            return Err(Flow::Error(RuntimeError::type_mismatch(
                "try/match subject produced a value with no matching arm",
                *location,
            )))
        }
    };

    let arm: &MatchArm = arms
        .iter()
        .find(|a| a.pattern == pattern)
        .ok_or_else(|| Flow::Error(RuntimeError::no_matching_arm(pattern, *location)))?;

    let parent = env.current_context;
    let arm_ctx = crate::context::registry::register(Some(parent));
    if let (Some(binding), Some(value)) = (&arm.binding, binding_value) {
        crate::context::registry::define_variable(
            arm_ctx,
            crate::decl::DeclaredVariable::new(binding.clone(), value, false, true),
        )
        .map_err(Flow::Error)?;
    }
    env.current_context = arm_ctx;
    let result = eval(&arm.body, env);
    env.current_context = parent;
    crate::context::registry::deregister(arm_ctx);
    result
}

/// Turns a caught `RuntimeError` into the `Value` bound to an `error(e)`
/// arm: an `Object` carrying the kind symbol and message so the arm body
/// can dispatch on `e::kind` as well as read `e::message`.
fn error_to_value(err: &RuntimeError) -> Value {
    let mut fields = indexmap::IndexMap::new();
    fields.insert(
        "kind".to_string(),
        crate::decl::DeclaredVariable::new("kind", Value::text(err.kind_name()), true, false),
    );
    fields.insert(
        "message".to_string(),
        crate::decl::DeclaredVariable::new("message", Value::text(err.to_string()), true, false),
    );
    Value::Object(crate::value::ObjectValue {
        type_name: Some("Error".to_string()),
        fields: std::rc::Rc::new(std::cell::RefCell::new(fields)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::context::registry;
    use crate::diagnostics::ExecutionStats;
    use crate::evaluator::node::Literal;
    use crate::evaluator::node::NodeRef;
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
    fn indexed_loop_counts_up_inclusive() {
        let mut env = test_env();
        registry::define_variable(
            env.current_context,
            crate::decl::DeclaredVariable::new("total", Value::int(0), false, false),
        )
        .unwrap();
        let body = Node::Assignment {
            target: Arc::new(Node::Identifier {
                name: "total".into(),
                location: None,
            }),
            value: Arc::new(Node::BinaryExpr {
                op: super::super::node::BinaryOp::Add,
                left: Arc::new(Node::Identifier {
                    name: "total".into(),
                    location: None,
                }),
                right: Arc::new(Node::Identifier {
                    name: "i".into(),
                    location: None,
                }),
                location: None,
            }),
            location: None,
        };
        let loop_node = Node::IndexedLoop {
            label: None,
            variable: "i".into(),
            start: int_lit(1),
            end: int_lit(3),
            step: None,
            body: Arc::new(body),
            location: None,
        };
        eval_indexed_loop(&loop_node, &mut env).unwrap();
        let total = registry::get_variable(env.current_context, "total", None).unwrap();
        assert_eq!(total.value.to_string(), "6");
    }

    #[test]
    fn break_stops_the_enclosing_loop() {
        let mut env = test_env();
        let body = Node::Break {
            label: None,
            value: None,
            location: None,
        };
        let loop_node = Node::WhileLoop {
            label: None,
            condition: Arc::new(Node::Literal {
                value: Literal::Bool(true),
                location: None,
            }),
            body: Arc::new(body),
            location: None,
        };
        let result = eval_while(&loop_node, &mut env);
        assert!(result.is_ok());
        assert_eq!(result.unwrap().to_string(), "none");
    }

    #[test]
    fn break_with_a_value_becomes_the_loop_expressions_result() {
        let mut env = test_env();
        let body = Node::Break {
            label: None,
            value: Some(int_lit(42)),
            location: None,
        };
        let loop_node = Node::WhileLoop {
            label: None,
            condition: Arc::new(Node::Literal {
                value: Literal::Bool(true),
                location: None,
            }),
            body: Arc::new(body),
            location: None,
        };
        let result = eval_while(&loop_node, &mut env).unwrap();
        assert_eq!(result.to_string(), "42");
    }

    fn binding_strings(bindings: &[(String, Value)]) -> Vec<(String, String)> {
        bindings
            .iter()
            .map(|(n, v)| (n.clone(), v.to_string()))
            .collect()
    }

    #[test]
    fn foreach_single_target_binds_the_whole_element() {
        let bindings =
            destructure_foreach_item(2, &Value::int(9), false, &["x".to_string()], None).unwrap();
        assert_eq!(binding_strings(&bindings), vec![("x".to_string(), "9".to_string())]);
    }

    #[test]
    fn foreach_two_targets_over_a_list_bind_index_then_value() {
        let bindings = destructure_foreach_item(
            2,
            &Value::int(9),
            false,
            &["i".to_string(), "v".to_string()],
            None,
        )
        .unwrap();
        assert_eq!(
            binding_strings(&bindings),
            vec![("i".to_string(), "2".to_string()), ("v".to_string(), "9".to_string())]
        );
    }

    #[test]
    fn foreach_two_targets_over_a_map_bind_key_then_value() {
        let entry = Value::tuple(vec![Value::text("k"), Value::int(9)]);
        let bindings = destructure_foreach_item(
            0,
            &entry,
            true,
            &["k".to_string(), "v".to_string()],
            None,
        )
        .unwrap();
        assert_eq!(
            binding_strings(&bindings),
            vec![("k".to_string(), "k".to_string()), ("v".to_string(), "9".to_string())]
        );
    }

    #[test]
    fn foreach_three_targets_over_a_map_bind_index_key_value() {
        let entry = Value::tuple(vec![Value::text("k"), Value::int(9)]);
        let bindings = destructure_foreach_item(
            3,
            &entry,
            true,
            &["i".to_string(), "k".to_string(), "v".to_string()],
            None,
        )
        .unwrap();
        assert_eq!(
            binding_strings(&bindings),
            vec![
                ("i".to_string(), "3".to_string()),
                ("k".to_string(), "k".to_string()),
                ("v".to_string(), "9".to_string())
            ]
        );
    }

    #[test]
    fn foreach_three_targets_over_a_list_is_an_arity_mismatch() {
        let err = destructure_foreach_item(
            0,
            &Value::int(9),
            false,
            &["i".to_string(), "k".to_string(), "v".to_string()],
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Flow::Error(RuntimeError::TupleArityMismatch {
                expected: 3,
                got: 2,
                ..
            })
        ));
    }

    #[test]
    fn foreach_rejects_duplicate_targets() {
        let mut env = test_env();
        let node = Node::ForeachLoop {
            label: None,
            targets: vec!["x".into(), "x".into()],
            iterable: Arc::new(Node::ListLiteral {
                elements: vec![],
                location: None,
            }),
            body: Arc::new(Node::Block {
                statements: vec![],
                location: None,
            }),
            location: None,
        };
        let err = eval_foreach_loop(&node, &mut env).unwrap_err();
        assert!(matches!(err, Flow::Error(RuntimeError::ForeachTargetDuplicate { .. })));
    }

    #[test]
    fn labeled_break_naming_its_own_loop_is_rejected() {
        // `outer: while true { break outer }` — the label is redundant
        // with an unlabeled break and is rejected as a self-reference;
        // only naming an *enclosing* loop is meaningful.
        let mut env = test_env();
        let body = Node::Break {
            label: Some("outer".into()),
            value: None,
            location: None,
        };
        let loop_node = Node::WhileLoop {
            label: Some("outer".into()),
            condition: Arc::new(Node::Literal {
                value: Literal::Bool(true),
                location: None,
            }),
            body: Arc::new(body),
            location: None,
        };
        let err = eval_while(&loop_node, &mut env).unwrap_err();
        assert!(matches!(err, Flow::Error(RuntimeError::InvalidLoopLabel { .. })));
    }

    fn match_arm(pattern: &str, binding: Option<&str>, body: NodeRef) -> MatchArm {
        MatchArm {
            pattern: pattern.to_string(),
            binding: binding.map(str::to_string),
            body,
        }
    }

    fn ident(name: &str) -> NodeRef {
        Arc::new(Node::Identifier {
            name: name.into(),
            location: None,
        })
    }

    #[test]
    fn try_match_catches_a_raised_error_into_the_error_arm() {
        // try(10 / 0) { ok(v) -> v; error(e) -> -1 } == -1
        let mut env = test_env();
        let divide = Arc::new(Node::BinaryExpr {
            op: super::super::node::BinaryOp::Div,
            left: int_lit(10),
            right: int_lit(0),
            location: None,
        });
        let node = Node::TryMatch {
            subject: divide,
            arms: vec![
                match_arm("ok", Some("v"), ident("v")),
                match_arm("error", Some("e"), int_lit(-1)),
            ],
            location: None,
        };
        let result = eval_try_match(&node, &mut env).unwrap();
        assert_eq!(result.to_string(), "-1");
    }

    #[test]
    fn try_match_error_binding_carries_the_error_kind_symbol() {
        let mut env = test_env();
        let divide = Arc::new(Node::BinaryExpr {
            op: super::super::node::BinaryOp::Div,
            left: int_lit(1),
            right: int_lit(0),
            location: None,
        });
        let node = Node::TryMatch {
            subject: divide,
            arms: vec![
                match_arm("ok", Some("v"), ident("v")),
                match_arm(
                    "error",
                    Some("e"),
                    Arc::new(Node::FieldAccess {
                        target: ident("e"),
                        field: "kind".into(),
                        location: None,
                    }),
                ),
            ],
            location: None,
        };
        let result = eval_try_match(&node, &mut env).unwrap();
        assert_eq!(result.to_string(), "DivisionByZero");
    }

    #[test]
    fn try_match_ok_arm_binds_a_plain_successful_value() {
        // Subject need not already be a Result value — any successful
        // evaluation flows into the ok arm, binding the value to x.
        let mut env = test_env();
        let node = Node::TryMatch {
            subject: int_lit(7),
            arms: vec![
                match_arm("ok", Some("v"), ident("v")),
                match_arm("error", Some("e"), int_lit(-1)),
            ],
            location: None,
        };
        let result = eval_try_match(&node, &mut env).unwrap();
        assert_eq!(result.to_string(), "7");
    }

    #[test]
    fn try_match_explicit_result_ok_value_still_matches_ok_arm() {
        // Invariant 8: try(ok(x)) { ok(v)->v; error(_)->sentinel } == x,
        // for a subject expression that already evaluates to Result.Ok.
        let mut env = test_env();
        crate::context::registry::define_variable(
            env.current_context,
            crate::decl::DeclaredVariable::new(
                "r",
                Value::ResultOk(Box::new(Value::int(42))),
                true,
                false,
            ),
        )
        .unwrap();
        let node = Node::TryMatch {
            subject: ident("r"),
            arms: vec![
                match_arm("ok", Some("v"), ident("v")),
                match_arm("error", None, int_lit(-99)),
            ],
            location: None,
        };
        let result = eval_try_match(&node, &mut env).unwrap();
        assert_eq!(result.to_string(), "42");
    }

    #[test]
    fn try_match_internal_bug_is_never_caught() {
        let mut env = test_env();
        let node = Node::TryMatch {
            subject: Arc::new(Node::Identifier {
                name: "__does_not_exist__".into(),
                location: None,
            }),
            arms: vec![
                match_arm("ok", Some("v"), ident("v")),
                match_arm("error", Some("e"), int_lit(-1)),
            ],
            location: None,
        };
        // A missing variable is a VariableNotFound (user-visible), which
        // is caught; confirm it lands on the error arm rather than
        // escaping, distinguishing it from an uncatchable InternalBug.
        let result = eval_try_match(&node, &mut env).unwrap();
        assert_eq!(result.to_string(), "-1");
    }

    #[test]
    fn try_match_with_no_arm_for_the_subjects_pattern_is_no_matching_arm() {
        // Subject evaluates to Option.Some, but the arm list only
        // covers ok/error — the lookup for a "some" arm comes up empty.
        // This must raise its own NoMatchingArm kind, not NonIterable.
        let mut env = test_env();
        crate::context::registry::define_variable(
            env.current_context,
            crate::decl::DeclaredVariable::new(
                "o",
                Value::OptionSome(Box::new(Value::int(1))),
                true,
                false,
            ),
        )
        .unwrap();
        let node = Node::TryMatch {
            subject: ident("o"),
            arms: vec![
                match_arm("ok", Some("v"), ident("v")),
                match_arm("error", Some("e"), int_lit(-1)),
            ],
            location: None,
        };
        let err = eval_try_match(&node, &mut env).unwrap_err();
        match err {
            Flow::Error(e) => assert_eq!(e.kind_name(), "NoMatchingArm"),
            other => panic!("expected Flow::Error(NoMatchingArm), got {:?}", other),
        }
    }
}
