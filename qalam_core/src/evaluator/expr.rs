//! Expression-level evaluation: literals, identifiers, operators, calls,
//! indexing, field access, and literal construction for tuples/lists/
//! objects.

use super::node::{BinaryOp, Literal, Node, NodeRef, UnaryOp};
use super::{eval, EvalResult, Flow};
use crate::context::{registry, ContextId};
use crate::decl::{DeclaredFunction, DeclaredVariable};
use crate::env::ExecutionEnv;
use crate::error::{RuntimeError, RuntimeResult};
use crate::host;
use crate::operators;
use crate::span::SourceLocation;
use crate::stacks::{CallFrame, Signal};
use crate::value::{ObjectValue, TypeDescriptor, Value};
use std::cell::RefCell;
use std::rc::Rc;

pub fn eval_literal(lit: &Literal) -> Value {
    match lit {
        Literal::None => Value::None,
        Literal::NaN => Value::NaN,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Char(c) => Value::Char(*c),
        Literal::Int(n) => Value::int(*n),
        Literal::Decimal(d) => Value::Number(crate::value::DynamicNumber::Decimal(*d)),
        Literal::Text(s) => Value::text(s.clone()),
    }
}

pub fn eval_identifier(name: &str, location: Option<SourceLocation>, env: &mut ExecutionEnv) -> EvalResult {
    registry::get_variable(env.current_context, name, location)
        .map(|v| v.read_value())
        .map_err(Flow::Error)
}

pub fn eval_binary(
    op: BinaryOp,
    left: &Node,
    right: &Node,
    location: Option<SourceLocation>,
    env: &mut ExecutionEnv,
) -> EvalResult {
    // `&&`/`||` short-circuit: the right operand is only evaluated when
    // it can affect the result.
    if matches!(op, BinaryOp::And) {
        let l = eval(left, env)?;
        if !l.is_truthy() {
            return Ok(Value::Bool(false));
        }
        let r = eval(right, env)?;
        return Ok(Value::Bool(r.is_truthy()));
    }
    if matches!(op, BinaryOp::Or) {
        let l = eval(left, env)?;
        if l.is_truthy() {
            return Ok(Value::Bool(true));
        }
        let r = eval(right, env)?;
        return Ok(Value::Bool(r.is_truthy()));
    }
    if matches!(op, BinaryOp::NullishCoalesce) {
        let l = eval(left, env)?;
        if !matches!(l, Value::None | Value::NaN | Value::OptionNone) {
            return Ok(l);
        }
        return eval(right, env);
    }

    let l = eval(left, env)?;
    let r = eval(right, env)?;
    let result =
        operators::apply_binary(op, &l, &r, location, env.config.numeric_overflow_policy).map_err(Flow::Error)?;
    if let (Value::Number(ln), Value::Number(rn), Value::Number(result_n)) = (&l, &r, &result) {
        if result_n.rank() > ln.rank().max(rn.rank()) {
            env.stats.record_numeric_promotion();
        }
    }
    Ok(result)
}

pub fn eval_unary(
    op: UnaryOp,
    operand: &Node,
    location: Option<SourceLocation>,
    env: &mut ExecutionEnv,
) -> EvalResult {
    if matches!(
        op,
        UnaryOp::PreIncrement | UnaryOp::PostIncrement | UnaryOp::PreDecrement | UnaryOp::PostDecrement
    ) {
        return eval_step(op, operand, location, env);
    }
    let v = eval(operand, env)?;
    operators::apply_unary(op, &v, location, env.config.numeric_overflow_policy).map_err(Flow::Error)
}

/// Pre/post increment and decrement. A plain variable
/// operand is read, stepped, written back, and yields the pre- or
/// post-step value depending on which form was used; any other operand
/// (a literal, a computed expression) is stepped without being written
/// anywhere, since there is nowhere to write it back to.
fn eval_step(
    op: UnaryOp,
    operand: &Node,
    location: Option<SourceLocation>,
    env: &mut ExecutionEnv,
) -> EvalResult {
    let delta: i128 = match op {
        UnaryOp::PreIncrement | UnaryOp::PostIncrement => 1,
        UnaryOp::PreDecrement | UnaryOp::PostDecrement => -1,
        _ => unreachable!(),
    };
    let is_pre = matches!(op, UnaryOp::PreIncrement | UnaryOp::PreDecrement);
    let policy = env.config.numeric_overflow_policy;

    if let Node::Identifier { name, .. } = operand {
        let current = registry::get_variable(env.current_context, name, location).map_err(Flow::Error)?;
        let stepped = operators::apply_step(&current.value, delta, location, policy).map_err(Flow::Error)?;
        let new_value = Value::Number(stepped.clone());
        registry::set_variable(env.current_context, name, new_value.clone(), location).map_err(Flow::Error)?;
        return Ok(if is_pre { new_value } else { current.value });
    }

    let v = eval(operand, env)?;
    let stepped = operators::apply_step(&v, delta, location, policy).map_err(Flow::Error)?;
    Ok(Value::Number(stepped))
}

pub fn eval_tuple_literal(elements: &[NodeRef], env: &mut ExecutionEnv) -> EvalResult {
    let mut values = Vec::with_capacity(elements.len());
    for e in elements {
        values.push(eval(e, env)?);
    }
    Ok(Value::tuple(values))
}

pub fn eval_list_literal(elements: &[NodeRef], env: &mut ExecutionEnv) -> EvalResult {
    let mut values = Vec::with_capacity(elements.len());
    for e in elements {
        values.push(eval(e, env)?);
    }
    Ok(Value::list(values))
}

pub fn eval_object_literal(
    type_name: Option<&str>,
    fields: &[(String, NodeRef)],
    env: &mut ExecutionEnv,
) -> EvalResult {
    let mut map = indexmap::IndexMap::new();
    for (name, expr) in fields {
        let value = eval(expr, env)?;
        map.insert(name.clone(), DeclaredVariable::new(name.clone(), value, false, true));
    }
    Ok(Value::Object(ObjectValue {
        type_name: type_name.map(|s| s.to_string()),
        fields: Rc::new(RefCell::new(map)),
    }))
}

pub fn eval_index(
    target: &Node,
    index: &Node,
    location: Option<SourceLocation>,
    env: &mut ExecutionEnv,
) -> EvalResult {
    let container = eval(target, env)?;
    let idx = eval(index, env)?;
    read_index(&container, &idx, location).map_err(Flow::Error)
}

pub fn read_index(
    container: &Value,
    idx: &Value,
    location: Option<SourceLocation>,
) -> RuntimeResult<Value> {
    match container {
        Value::List(list) => {
            let list = list.borrow();
            let i = index_as_isize(idx, location)?;
            let resolved = resolve_index(i, list.len(), location)?;
            Ok(list[resolved].clone())
        }
        Value::Tuple(t) => {
            let i = index_as_isize(idx, location)?;
            let resolved = resolve_index(i, t.0.len(), location)?;
            Ok(t.0[resolved].clone())
        }
        Value::Text(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = index_as_isize(idx, location)?;
            let resolved = resolve_index(i, chars.len(), location)?;
            Ok(Value::Char(chars[resolved]))
        }
        Value::OrderedMap(map) => {
            let key = idx
                .as_map_key()
                .ok_or_else(|| RuntimeError::type_mismatch("unhashable map key", location))?;
            map.borrow()
                .get(&key)
                .cloned()
                .ok_or_else(|| RuntimeError::index_out_of_bounds(0, map.borrow().len(), location))
        }
        Value::UnorderedMap(map) => {
            let key = idx
                .as_map_key()
                .ok_or_else(|| RuntimeError::type_mismatch("unhashable map key", location))?;
            map.borrow()
                .get(&key)
                .cloned()
                .ok_or_else(|| RuntimeError::index_out_of_bounds(0, map.borrow().len(), location))
        }
        other => Err(RuntimeError::non_iterable(
            format!("{:?}", other.type_descriptor()),
            location,
        )),
    }
}

pub fn assign_index(
    container: &Value,
    idx: &Value,
    new_value: Value,
    location: Option<SourceLocation>,
) -> RuntimeResult<()> {
    match container {
        Value::List(list) => {
            let mut list = list.borrow_mut();
            let i = index_as_isize(idx, location)?;
            let resolved = resolve_index(i, list.len(), location)?;
            list[resolved] = new_value;
            Ok(())
        }
        Value::OrderedMap(map) => {
            let key = idx
                .as_map_key()
                .ok_or_else(|| RuntimeError::type_mismatch("unhashable map key", location))?;
            map.borrow_mut().insert(key, new_value);
            Ok(())
        }
        Value::UnorderedMap(map) => {
            let key = idx
                .as_map_key()
                .ok_or_else(|| RuntimeError::type_mismatch("unhashable map key", location))?;
            map.borrow_mut().insert(key, new_value);
            Ok(())
        }
        other => Err(RuntimeError::non_iterable(
            format!("{:?}", other.type_descriptor()),
            location,
        )),
    }
}

fn index_as_isize(idx: &Value, location: Option<SourceLocation>) -> RuntimeResult<isize> {
    match idx {
        Value::Number(n) => n
            .as_i128()
            .map(|v| v as isize)
            .ok_or_else(|| RuntimeError::type_mismatch("index must be an integer", location)),
        _ => Err(RuntimeError::type_mismatch("index must be a number", location)),
    }
}

fn resolve_index(i: isize, len: usize, location: Option<SourceLocation>) -> RuntimeResult<usize> {
    let resolved = if i < 0 { i + len as isize } else { i };
    if resolved < 0 || resolved as usize >= len {
        return Err(RuntimeError::index_out_of_bounds(i as i64, len, location));
    }
    Ok(resolved as usize)
}

pub fn eval_field_access(
    target: &Node,
    field: &str,
    location: Option<SourceLocation>,
    env: &mut ExecutionEnv,
) -> EvalResult {
    let container = eval(target, env)?;
    read_field(&container, field, location).map_err(Flow::Error)
}

pub fn read_field(container: &Value, field: &str, location: Option<SourceLocation>) -> RuntimeResult<Value> {
    match container {
        Value::Object(o) => o
            .fields
            .borrow()
            .get(field)
            .map(|v| v.value.clone())
            .ok_or_else(|| RuntimeError::variable_not_found(field, location)),
        other => Err(RuntimeError::type_mismatch(
            format!("{:?} has no field {}", other.type_descriptor(), field),
            location,
        )),
    }
}

pub fn assign_field(
    container: &Value,
    field: &str,
    new_value: Value,
    location: Option<SourceLocation>,
) -> RuntimeResult<()> {
    match container {
        Value::Object(o) => {
            let mut fields = o.fields.borrow_mut();
            match fields.get_mut(field) {
                Some(existing) => {
                    existing.check_assignable(&new_value)?;
                    existing.value = new_value;
                    Ok(())
                }
                None => {
                    fields.insert(
                        field.to_string(),
                        DeclaredVariable::new(field.to_string(), new_value, false, true),
                    );
                    Ok(())
                }
            }
        }
        other => Err(RuntimeError::type_mismatch(
            format!("{:?} has no field {}", other.type_descriptor(), field),
            location,
        )),
    }
}

pub fn eval_call(
    callee: &Node,
    arguments: &[NodeRef],
    ordinal: Option<usize>,
    location: Option<SourceLocation>,
    env: &mut ExecutionEnv,
) -> EvalResult {
    let args = eval_args(arguments, env)?;

    let name = match callee {
        Node::Identifier { name, .. } => name.clone(),
        _ => {
            return Err(Flow::Error(RuntimeError::type_mismatch(
                "callee is not an invocable name",
                location,
            )))
        }
    };

    let candidates = registry::lookup_functions(env.current_context, &name);
    if !candidates.is_empty() {
        return invoke_user_function(&candidates, &name, None, &args, ordinal, location, env);
    }

    env.stats.record_host_invocation();
    match ordinal {
        Some(n) => host::resolve_and_invoke_ordinal(env.host.as_ref(), &name, n, &args).map_err(Flow::Error),
        None => host::resolve_and_invoke(env.host.as_ref(), &name, &args).map_err(Flow::Error),
    }
}

pub fn eval_method_call(
    receiver: &Node,
    method_name: &str,
    arguments: &[NodeRef],
    ordinal: Option<usize>,
    location: Option<SourceLocation>,
    env: &mut ExecutionEnv,
) -> EvalResult {
    let receiver_value = eval(receiver, env)?;
    let args = eval_args(arguments, env)?;

    let type_name = match receiver_value.type_descriptor() {
        TypeDescriptor::Object(Some(name)) => name,
        other => format!("{:?}", other),
    };

    if let Some(imp) = registry::lookup_implementation(env.current_context, &type_name, method_name) {
        return invoke_user_function(
            &imp.overloads,
            method_name,
            Some(receiver_value),
            &args,
            ordinal,
            location,
            env,
        );
    }

    env.stats.record_host_invocation();
    let qualified = format!("{}.{}", type_name, method_name);
    let mut full_args = Vec::with_capacity(args.len() + 1);
    full_args.push(receiver_value);
    full_args.extend(args);
    match ordinal {
        Some(n) => {
            host::resolve_and_invoke_ordinal(env.host.as_ref(), &qualified, n, &full_args).map_err(Flow::Error)
        }
        None => host::resolve_and_invoke(env.host.as_ref(), &qualified, &full_args).map_err(Flow::Error),
    }
}

fn eval_args(arguments: &[NodeRef], env: &mut ExecutionEnv) -> Result<Vec<Value>, Flow> {
    let mut args = Vec::with_capacity(arguments.len());
    for a in arguments {
        args.push(eval(a, env)?);
    }
    Ok(args)
}

/// Shared by plain calls and method calls: picks the overload matching
/// `args.len()` (or, if the call carried an explicit ordinal suffix,
/// the overload at that position regardless of arity), binds parameters (and, for method calls, an implicit `self`) in a
/// fresh call context, evaluates the body, and converts a
/// `Signal::Return` into the call's result.
fn invoke_user_function(
    candidates: &[std::sync::Arc<DeclaredFunction>],
    name: &str,
    self_value: Option<Value>,
    args: &[Value],
    ordinal: Option<usize>,
    location: Option<SourceLocation>,
    env: &mut ExecutionEnv,
) -> EvalResult {
    let func = if let Some(n) = ordinal {
        candidates
            .get(n)
            .cloned()
            .ok_or_else(|| Flow::Error(RuntimeError::invocable_not_found(format!("{}#{}", name, n), location)))?
    } else {
        let matching: Vec<&std::sync::Arc<DeclaredFunction>> = candidates
            .iter()
            .filter(|f| f.accepts_arity(args.len()))
            .collect();
        match matching.as_slice() {
            [only] => (*only).clone(),
            [] => return Err(Flow::Error(RuntimeError::invocable_not_found(name, location))),
            many => {
                return Err(Flow::Error(RuntimeError::invocable_ambiguous(
                    name,
                    many.iter().map(|f| f.name.clone()).collect(),
                    location,
                )))
            }
        }
    };

    if env.call_stack.depth() >= env.config.max_call_depth {
        return Err(Flow::Error(RuntimeError::internal_bug(
            "maximum call depth exceeded",
        )));
    }

    let parent = env.current_context;
    let call_ctx = registry::register(Some(parent));
    env.stats.record_context_created();

    if let Some(self_val) = self_value {
        registry::define_variable(
            call_ctx,
            DeclaredVariable::new("self", self_val, true, false),
        )
        .map_err(Flow::Error)?;
    }

    // Defaults are evaluated lazily in the callee scope (see
    // `DeclaredParameter`), so `current_context` must already be
    // `call_ctx` before `bind_parameters` runs any default expression —
    // a later parameter's default can read an earlier one.
    env.current_context = call_ctx;
    let bind_result = bind_parameters(call_ctx, &func, args, location, env);

    if let Err(e) = bind_result {
        env.current_context = parent;
        registry::deregister(call_ctx);
        env.stats.record_context_retired();
        return Err(e);
    }

    env.call_stack.push(CallFrame {
        context_id: call_ctx,
        function_name: name.to_string(),
    });
    env.stats.record_function_call();

    let outcome = eval(&func.body, env);

    env.current_context = parent;
    env.call_stack.pop();
    registry::deregister(call_ctx);
    env.stats.record_context_retired();

    match outcome {
        Ok(v) => Ok(v),
        Err(Flow::Signal(Signal::Return { value })) => Ok(value),
        other => other,
    }
}

fn bind_parameters(
    call_ctx: ContextId,
    func: &DeclaredFunction,
    args: &[Value],
    location: Option<SourceLocation>,
    env: &mut ExecutionEnv,
) -> Result<(), Flow> {
    for (i, param) in func.parameters.iter().enumerate() {
        if param.is_variadic {
            let rest = args.get(i..).unwrap_or(&[]).to_vec();
            registry::define_variable(
                call_ctx,
                DeclaredVariable::new(param.name.clone(), Value::list(rest), false, false),
            )
            .map_err(Flow::Error)?;
            break;
        }
        let value = match args.get(i) {
            Some(v) => v.clone(),
            None => match &param.default {
                Some(default_expr) => eval(default_expr, env)?,
                None => Value::None,
            },
        };
        if matches!(value, Value::None) && !param.is_nullable {
            return Err(Flow::Error(RuntimeError::type_mismatch(
                format!("parameter {} does not accept none", param.name),
                location,
            )));
        }
        registry::define_variable(
            call_ctx,
            DeclaredVariable::new(param.name.clone(), value, false, param.is_nullable),
        )
        .map_err(Flow::Error)?;
    }
    Ok(())
}
