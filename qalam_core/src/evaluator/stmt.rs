//! Statement-level evaluation: blocks, declarations, assignment,
//! function/behavior declarations, imports, and `throw`.

use super::node::{Node, NodeRef};
use super::{eval, EvalResult, Flow};
use crate::context::registry;
use crate::decl::{DeclaredFunction, DeclaredImplementation, DeclaredParameter, DeclaredVariable};
use crate::env::ExecutionEnv;
use crate::error::RuntimeError;
use crate::value::Value;

/// A block gets its own child context, evaluated sequentially; the
/// value of a block is its last statement's value (or `none` if
/// empty), the usual "last expression is the value" convention.
pub fn eval_block(statements: &[NodeRef], env: &mut ExecutionEnv) -> EvalResult {
    let parent = env.current_context;
    let block_ctx = registry::register(Some(parent));
    env.stats.record_context_created();
    env.current_context = block_ctx;

    let mut result = Ok(Value::None);
    for stmt in statements {
        result = eval(stmt, env);
        if result.is_err() {
            break;
        }
    }

    env.current_context = parent;
    registry::deregister(block_ctx);
    env.stats.record_context_retired();
    result
}

pub fn eval_declaration(node: &Node, env: &mut ExecutionEnv) -> EvalResult {
    let Node::Declaration {
        name,
        is_constant,
        is_nullable,
        initializer,
        location,
    } = node
    else {
        unreachable!("eval_declaration called with non-Declaration node")
    };

    let value = match initializer {
        Some(init) => eval(init, env)?,
        None => Value::None,
    };

    if matches!(value, Value::None) && !is_nullable {
        return Err(Flow::Error(RuntimeError::type_mismatch(
            format!("cannot declare non-nullable variable {} without a value", name),
            *location,
        )));
    }

    let mut var = DeclaredVariable::new(name.clone(), value, *is_constant, *is_nullable);
    var.declared_at = *location;
    registry::define_variable(env.current_context, var)?;
    Ok(Value::None)
}

/// Tuple-destructuring declaration: `let a, b := expr`
/// requires the initializer to evaluate to a `Tuple` whose arity
/// matches `names.len()` exactly; each name is then bound positionally
/// as an ordinary (non-constant-checked-per-name) declaration. A
/// mismatched arity fails with `TupleArityMismatch` at the
/// declaration's own location, not the initializer's.
pub fn eval_multi_declaration(node: &Node, env: &mut ExecutionEnv) -> EvalResult {
    let Node::MultiDeclaration {
        names,
        is_constant,
        initializer,
        location,
    } = node
    else {
        unreachable!("eval_multi_declaration called with non-MultiDeclaration node")
    };

    let value = eval(initializer, env)?;
    let elements = match value {
        Value::Tuple(t) => t.0.as_ref().clone(),
        other => {
            return Err(Flow::Error(RuntimeError::type_mismatch(
                format!(
                    "tuple destructuring requires a tuple initializer, got {:?}",
                    other.type_descriptor()
                ),
                *location,
            )))
        }
    };

    if elements.len() != names.len() {
        return Err(Flow::Error(RuntimeError::tuple_arity_mismatch(
            names.len(),
            elements.len(),
            *location,
        )));
    }

    for (name, v) in names.iter().zip(elements.into_iter()) {
        let mut var = DeclaredVariable::new(name.clone(), v, *is_constant, true);
        var.declared_at = *location;
        registry::define_variable(env.current_context, var)?;
    }
    Ok(Value::None)
}

pub fn eval_assignment(target: &Node, value: &Node, env: &mut ExecutionEnv) -> EvalResult {
    let new_value = eval(value, env)?;
    match target {
        Node::Identifier { name, location } => {
            registry::set_variable(env.current_context, name, new_value.clone(), *location)?;
            Ok(new_value)
        }
        Node::Index {
            target: base,
            index,
            location,
        } => {
            let container = eval(base, env)?;
            let idx = eval(index, env)?;
            super::expr::assign_index(&container, &idx, new_value.clone(), *location)?;
            Ok(new_value)
        }
        Node::FieldAccess {
            target: base,
            field,
            location,
        } => {
            let container = eval(base, env)?;
            super::expr::assign_field(&container, field, new_value.clone(), *location)?;
            Ok(new_value)
        }
        _ => Err(Flow::Error(RuntimeError::internal_bug(
            "assignment target is not an lvalue node",
        ))),
    }
}

pub fn eval_function_decl(node: &Node, env: &mut ExecutionEnv) -> EvalResult {
    let Node::FunctionDecl {
        name,
        parameters,
        body,
        location,
    } = node
    else {
        unreachable!()
    };
    let func = DeclaredFunction {
        name: name.clone(),
        parameters: lower_params(parameters),
        body: body.clone(),
        declared_at: *location,
    };
    registry::define_function(env.current_context, func)?;
    Ok(Value::None)
}

pub fn eval_behavior_decl(node: &Node, env: &mut ExecutionEnv) -> EvalResult {
    let Node::BehaviorDecl {
        type_name,
        method_name,
        parameters,
        body,
        location,
    } = node
    else {
        unreachable!()
    };
    let func = std::sync::Arc::new(DeclaredFunction {
        name: method_name.clone(),
        parameters: lower_params(parameters),
        body: body.clone(),
        declared_at: *location,
    });
    let imp_key = (type_name.clone(), method_name.clone());
    let existing = registry::lookup_implementation(env.current_context, type_name, method_name);
    let imp = match existing {
        Some(found) if found.overloads.iter().any(|f| {
            f.parameters.len() == func.parameters.len()
        }) => {
            return Err(Flow::Error(RuntimeError::existent_implementation(
                format!("{}.{}", type_name, method_name),
                *location,
            )))
        }
        Some(found) => {
            let mut overloads = found.overloads.clone();
            overloads.push(func);
            DeclaredImplementation {
                type_name: type_name.clone(),
                method_name: method_name.clone(),
                overloads,
            }
        }
        None => DeclaredImplementation {
            type_name: type_name.clone(),
            method_name: method_name.clone(),
            overloads: vec![func],
        },
    };
    let _ = imp_key;
    // Re-registering a key already owned by this exact context fails in
    // `Context::define_implementation`; only the fresh-definition path
    // takes that route, the overload-append path above mutates a clone
    // and needs its own insertion path into the owning context.
    let ctx = registry::get(env.current_context)
        .ok_or_else(|| RuntimeError::internal_bug("unknown context id"))?;
    ctx.replace_implementation(imp);
    Ok(Value::None)
}

/// Lowers parse-tree parameters into `DeclaredParameter`s. Default
/// expressions are kept as nodes, not evaluated here — each default
/// must be evaluated lazily in the callee scope at call time, not once
/// when the function is declared.
fn lower_params(params: &[super::node::Param]) -> Vec<DeclaredParameter> {
    params
        .iter()
        .map(|p| DeclaredParameter {
            name: p.name.clone(),
            is_nullable: p.is_nullable,
            default: p.default.clone(),
            is_variadic: p.is_variadic,
        })
        .collect()
}

/// `import path [as alias]`: registers `alias` (or `path` itself) as a
/// block-local alias for the qualified name `path`, then also loads the
/// module and binds a variable to it so the import can be used directly
/// as a value, not just as a qualified-name prefix.
pub fn eval_import(
    path: &str,
    alias: Option<&str>,
    location: Option<crate::span::SourceLocation>,
    env: &mut ExecutionEnv,
) -> EvalResult {
    let binding_name = alias.unwrap_or(path).to_string();
    registry::define_block_import(env.current_context, binding_name.clone(), path, location)?;

    let module_ctx = env
        .import_cycle_guard
        .enter(path)
        .map_err(Flow::Error)
        .and_then(|_| {
            let result = env.imports.resolve(path, &NoopLoader);
            env.import_cycle_guard.exit(path);
            result.map_err(Flow::Error)
        })?;
    let var = DeclaredVariable::new(
        binding_name,
        Value::HostRef(crate::value::HostRef {
            qualified_type: "Module".into(),
            handle: module_ctx.0 as usize,
        }),
        true,
        false,
    );
    registry::define_variable(env.current_context, var)?;
    Ok(Value::None)
}

/// Module loading from disk/packages is out of scope for this crate —
/// a real embedding supplies its own `ModuleLoader`.
/// This stub exists only so `ImportResolver::resolve`'s cache-miss path
/// type-checks in isolation; it always fails.
struct NoopLoader;
impl crate::imports::ModuleLoader for NoopLoader {
    fn load(&self, path: &str) -> crate::error::RuntimeResult<crate::context::ContextId> {
        Err(RuntimeError::non_iterable(
            format!("no module loader configured for import {}", path),
            None,
        ))
    }
}

pub fn eval_throw(value: &Node, env: &mut ExecutionEnv) -> EvalResult {
    let v = eval(value, env)?;
    Err(Flow::Error(RuntimeError::error_exception(
        v.to_string(),
        value.location(),
    )))
}
