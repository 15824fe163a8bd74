//! The process-wide context registry. Every `Context` created anywhere
//! in the interpreter — by the REPL root, a function call, a loop body,
//! a spawned task — is registered here under its `ContextId`, as a
//! tree of many concurrently-live scopes indexed by depth rather than
//! one single frame stack.

use super::{Context, ContextId};
use crate::decl::{DeclaredFunction, DeclaredImplementation, DeclaredVariable};
use crate::error::{RuntimeError, RuntimeResult};
use crate::span::SourceLocation;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) static CONTEXTS: Lazy<RwLock<HashMap<ContextId, Arc<Context>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers a new context as a child of `parent` (or as a root if
/// `None`) and returns its id.
pub fn register(parent: Option<ContextId>) -> ContextId {
    let id = ContextId(NEXT_ID.fetch_add(1, Ordering::SeqCst));
    let depth = parent
        .and_then(|p| CONTEXTS.read().get(&p).map(|c| c.depth + 1))
        .unwrap_or(0);
    let ctx = Arc::new(Context::new(id, parent, depth));
    CONTEXTS.write().insert(id, ctx);
    id
}

pub fn get(id: ContextId) -> Option<Arc<Context>> {
    CONTEXTS.read().get(&id).cloned()
}

/// Deregisters an ordinary context (a function call, a loop iteration,
/// a plain block): its declarations simply go away with it. If it
/// still has pending tasks, removal is deferred — only marked — until
/// `Context::dec_pending_tasks` reports the last one has finished (see
/// `finish_pending_removal`, called by the scheduler).
pub fn deregister(id: ContextId) {
    deregister_impl(id, false);
}

/// Deregisters a context whose declarations should survive it by
/// merging into its parent — the REPL's per-line scope is the only
/// caller of this: each top-level input gets its own context, but its
/// new variables/functions must still be visible to the next input.
pub fn deregister_merge_into_parent(id: ContextId) {
    deregister_impl(id, true);
}

fn deregister_impl(id: ContextId, merge: bool) {
    let ctx = match get(id) {
        Some(c) => c,
        None => return,
    };
    // A context with pending tasks OR a live descendant must not be
    // removed yet. A child that is itself mid deferred-removal (its own
    // pending-task count hasn't drained yet) is still registered with
    // `parent == id`, so checking for a live direct child is enough;
    // that child would only still be alive here because it, in turn,
    // passed this same check when it was deregistered.
    if ctx.pending_task_count() > 0 || has_live_children(id) {
        ctx.mark_pending_removal();
        if merge {
            // still honored once the last task drains, below.
            PENDING_MERGE.write().insert(id);
        }
        return;
    }
    let parent = ctx.parent;
    remove(&ctx, merge);
    if let Some(parent_id) = parent {
        retry_pending_removal(parent_id);
    }
}

fn has_live_children(id: ContextId) -> bool {
    CONTEXTS.read().values().any(|c| c.parent == Some(id))
}

/// Every other context sharing `id`'s parent — concurrent sibling
/// scopes spawned off the same parent (e.g. two `scope`-collected
/// tasks). Excludes `id` itself.
fn siblings(id: ContextId, parent: Option<ContextId>) -> Vec<Arc<Context>> {
    CONTEXTS
        .read()
        .values()
        .filter(|c| c.id != id && c.parent == parent)
        .cloned()
        .collect()
}

static PENDING_MERGE: Lazy<RwLock<std::collections::HashSet<ContextId>>> =
    Lazy::new(|| RwLock::new(std::collections::HashSet::new()));

/// Called by the scheduler when a task belonging to `id` completes and
/// `Context::dec_pending_tasks` reports this was the last one pending
/// removal.
pub fn finish_pending_removal(id: ContextId) {
    retry_pending_removal(id);
}

/// Retries a deferred deregistration now that one of its blockers (its
/// own last pending task, or a child context) may have cleared. If `id`
/// is removable, removes it and then recurses on its parent — a parent
/// that was only kept alive by `id` being a live child (see
/// `has_live_children`) becomes retriable the moment `id` is gone.
fn retry_pending_removal(id: ContextId) {
    let ctx = match get(id) {
        Some(c) => c,
        None => return,
    };
    if !ctx.is_pending_removal() || ctx.pending_task_count() > 0 || has_live_children(id) {
        return;
    }
    let merge = PENDING_MERGE.write().remove(&id);
    let parent = ctx.parent;
    remove(&ctx, merge);
    if let Some(parent_id) = parent {
        retry_pending_removal(parent_id);
    }
}

fn remove(ctx: &Context, merge: bool) {
    if merge {
        if let Some(parent_id) = ctx.parent {
            if let Some(parent) = get(parent_id) {
                parent.merge_from(ctx);
            }
        }
    }
    CONTEXTS.write().remove(&ctx.id);
}

/// Walks from `id` up through ancestors looking for `name` (ordinary
/// lexical lookup), requiring the binding's declared depth to be at
/// least `min_depth` — spec.md §4.C/§8 invariant 4: "`containsVariable
/// (name, d)` ⇔ ... a record whose declared-depth ≥ `d`." Pass `0` for
/// the unfiltered "is this name visible at all" check.
pub fn contains_variable(id: ContextId, name: &str, min_depth: usize) -> bool {
    match lookup_variable(id, name) {
        Some((owner, _)) => get(owner).map(|c| c.depth >= min_depth).unwrap_or(false),
        None => false,
    }
}

/// Ordinary lexical lookup: walks `id` up through its ancestors. If
/// `id`'s own context is marked `awaiting_task` (spec §4.C: "If
/// awaiting a task, also inspects siblings at the same depth for
/// variables whose value is a `Task`"), a plain-chain miss falls back
/// to scanning `id`'s siblings for a `Task`-valued binding under
/// `name` — this lets an awaiter observe a concurrently-spawned
/// sibling's promised result without inheriting that sibling's scope.
pub fn lookup_variable(id: ContextId, name: &str) -> Option<(ContextId, DeclaredVariable)> {
    let origin = get(id);
    let mut current = Some(id);
    while let Some(cid) = current {
        let ctx = get(cid)?;
        if let Some(var) = ctx.get_variable_local(name) {
            return Some((cid, var));
        }
        current = ctx.parent;
    }
    let origin = origin?;
    if origin.is_awaiting_task() {
        for sibling in siblings(id, origin.parent) {
            if let Some(var) = sibling.get_variable_local(name) {
                if matches!(var.value, crate::value::Value::Task(_)) {
                    return Some((sibling.id, var));
                }
            }
        }
    }
    None
}

pub fn get_variable(
    id: ContextId,
    name: &str,
    location: Option<SourceLocation>,
) -> RuntimeResult<DeclaredVariable> {
    lookup_variable(id, name)
        .map(|(_, v)| v)
        .ok_or_else(|| RuntimeError::variable_not_found(name, location))
}

pub fn set_variable(
    id: ContextId,
    name: &str,
    new_value: crate::value::Value,
    location: Option<SourceLocation>,
) -> RuntimeResult<()> {
    let (owner, _) = lookup_variable(id, name)
        .ok_or_else(|| RuntimeError::variable_not_found(name, location))?;
    let ctx = get(owner).ok_or_else(|| RuntimeError::internal_bug("owning context vanished"))?;
    ctx.set_variable_local(name, new_value, location)
}

/// Defines `var` in `id`'s local scope, rejecting the name if it is
/// already held locally *or* by a sibling context sharing `id`'s
/// parent — per spec.md §4.C's `defineX`: "rejects if a local or
/// sibling at the same depth already holds `name`... necessary to
/// prevent duplicate declarations when concurrent scopes share a
/// parent."
pub fn define_variable(id: ContextId, var: DeclaredVariable) -> RuntimeResult<()> {
    let ctx = get(id).ok_or_else(|| RuntimeError::internal_bug("unknown context id"))?;
    for sibling in siblings(id, ctx.parent) {
        if sibling.contains_variable_local(&var.name) {
            return Err(RuntimeError::existent_variable(
                var.name.clone(),
                var.declared_at,
            ));
        }
    }
    ctx.define_variable(var)
}

/// As `define_variable`, but checked against sibling overloads of the
/// same arity rather than plain name collision (a sibling may declare
/// a same-named function at a different arity without conflict).
pub fn define_function(id: ContextId, func: DeclaredFunction) -> RuntimeResult<()> {
    let ctx = get(id).ok_or_else(|| RuntimeError::internal_bug("unknown context id"))?;
    let arity = func.parameters.len();
    for sibling in siblings(id, ctx.parent) {
        if sibling
            .functions_local(&func.name)
            .iter()
            .any(|f| f.accepts_arity(arity))
        {
            return Err(RuntimeError::existent_function(
                func.name.clone(),
                func.declared_at,
            ));
        }
    }
    ctx.define_function(func)
}

pub fn define_implementation(id: ContextId, imp: DeclaredImplementation) -> RuntimeResult<()> {
    let ctx = get(id).ok_or_else(|| RuntimeError::internal_bug("unknown context id"))?;
    for sibling in siblings(id, ctx.parent) {
        if sibling
            .implementation_local(&imp.type_name, &imp.method_name)
            .is_some()
        {
            return Err(RuntimeError::existent_implementation(
                format!("{}.{}", imp.type_name, imp.method_name),
                None,
            ));
        }
    }
    ctx.define_implementation(imp)
}

pub fn define_block_import(
    id: ContextId,
    alias: impl Into<String>,
    qualified_name: impl Into<String>,
    location: Option<SourceLocation>,
) -> RuntimeResult<()> {
    let ctx = get(id).ok_or_else(|| RuntimeError::internal_bug("unknown context id"))?;
    ctx.define_block_import(alias, qualified_name, location)
}

/// Walks from `id` up through ancestors collecting every overload of
/// `name` visible in scope (resolution considers all enclosing scopes,
/// not just the nearest).
pub fn lookup_functions(id: ContextId, name: &str) -> Vec<Arc<DeclaredFunction>> {
    let mut found = Vec::new();
    let mut current = Some(id);
    while let Some(cid) = current {
        let ctx = match get(cid) {
            Some(c) => c,
            None => break,
        };
        found.extend(ctx.functions_local(name));
        current = ctx.parent;
    }
    found
}

pub fn lookup_implementation(
    id: ContextId,
    type_name: &str,
    method_name: &str,
) -> Option<Arc<DeclaredImplementation>> {
    let mut current = Some(id);
    while let Some(cid) = current {
        let ctx = get(cid)?;
        if let Some(imp) = ctx.implementation_local(type_name, method_name) {
            return Some(imp);
        }
        current = ctx.parent;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn lookup_walks_up_parent_chain() {
        let root = register(None);
        let child = register(Some(root));
        define_variable(root, DeclaredVariable::new("x", Value::int(42), false, false)).unwrap();
        assert!(contains_variable(child, "x", 0));
        assert!(!contains_variable(child, "x", 1));
        assert_eq!(get_variable(child, "x", None).unwrap().value.to_string(), "42");
    }

    #[test]
    fn ordinary_deregister_does_not_leak_declarations_upward() {
        let root = register(None);
        let child = register(Some(root));
        define_variable(child, DeclaredVariable::new("y", Value::int(7), false, false)).unwrap();
        deregister(child);
        assert!(!contains_variable(root, "y", 0));
        assert!(get(child).is_none());
    }

    #[test]
    fn merge_deregister_hands_declarations_to_parent() {
        let root = register(None);
        let child = register(Some(root));
        define_variable(child, DeclaredVariable::new("y", Value::int(7), false, false)).unwrap();
        deregister_merge_into_parent(child);
        assert!(contains_variable(root, "y", 0));
        assert!(get(child).is_none());
    }

    #[test]
    fn deregister_with_pending_tasks_defers_removal() {
        let root = register(None);
        let child = register(Some(root));
        let ctx = get(child).unwrap();
        ctx.inc_pending_tasks();
        deregister(child);
        assert!(get(child).is_some());
        assert!(ctx.is_pending_removal());
        assert!(ctx.dec_pending_tasks());
        finish_pending_removal(child);
        assert!(get(child).is_none());
    }

    #[test]
    fn deregister_defers_while_a_child_context_is_still_registered() {
        // root -> mid -> leaf. Deregistering `mid` while `leaf` is
        // still registered must defer, even though `mid`'s own
        // pending-task counter is zero — a still-registered child
        // stands in for a live descendant here. Once `leaf` itself
        // deregisters, that should cascade into retrying `mid`'s
        // deferred removal automatically.
        let root = register(None);
        let mid = register(Some(root));
        let leaf = register(Some(mid));

        deregister(mid);
        assert!(get(mid).is_some(), "mid must survive while leaf is still live");
        assert!(get(mid).unwrap().is_pending_removal());

        deregister(leaf);
        assert!(get(leaf).is_none());
        assert!(get(mid).is_none(), "mid should be retried and removed once leaf is gone");
    }

    #[test]
    fn sibling_scopes_sharing_a_parent_reject_duplicate_variable_names() {
        let root = register(None);
        let a = register(Some(root));
        let b = register(Some(root));
        define_variable(a, DeclaredVariable::new("x", Value::int(1), false, false)).unwrap();
        let err = define_variable(b, DeclaredVariable::new("x", Value::int(2), false, false))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::ExistentVariable { .. }));
        // but the same name one depth further down (not a sibling of
        // either `a` or `b`) is unaffected.
        let grandchild = register(Some(a));
        define_variable(grandchild, DeclaredVariable::new("x", Value::int(3), false, false))
            .unwrap();
    }

    #[test]
    fn sibling_functions_of_different_arity_do_not_collide() {
        use crate::decl::{DeclaredFunction, DeclaredParameter};
        use crate::evaluator::node::{Literal, Node};

        let root = register(None);
        let a = register(Some(root));
        let b = register(Some(root));
        let body = Arc::new(Node::Literal {
            value: Literal::Int(0),
            location: None,
        });
        let param = |name: &str| DeclaredParameter {
            name: name.into(),
            is_nullable: false,
            default: None,
            is_variadic: false,
        };
        define_function(
            a,
            DeclaredFunction {
                name: "f".into(),
                parameters: vec![param("x")],
                body: body.clone(),
                declared_at: None,
            },
        )
        .unwrap();
        // `b` declares `f` at a different arity — no conflict.
        define_function(
            b,
            DeclaredFunction {
                name: "f".into(),
                parameters: vec![param("x"), param("y")],
                body: body.clone(),
                declared_at: None,
            },
        )
        .unwrap();
        // Same arity as `a`'s, from a third sibling — conflicts.
        let c = register(Some(root));
        let err = define_function(
            c,
            DeclaredFunction {
                name: "f".into(),
                parameters: vec![param("z")],
                body,
                declared_at: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::ExistentFunction { .. }));
    }

    #[test]
    fn awaiting_context_finds_a_sibling_tasks_variable_but_only_while_awaiting() {
        let root = register(None);
        let awaiter = register(Some(root));
        let sibling = register(Some(root));

        let task_ctx = register(Some(root));
        let handle = crate::scheduler::spawn(
            task_ctx,
            Arc::new(crate::diagnostics::ExecutionStats::new()),
            Arc::new(std::sync::atomic::AtomicBool::new(false)),
            |_ctx| Ok(Value::int(99)),
        );
        define_variable(
            sibling,
            DeclaredVariable::new("result", Value::Task(handle.clone()), true, false),
        )
        .unwrap();

        // Not awaiting: the sibling's task binding is invisible.
        assert!(lookup_variable(awaiter, "result").is_none());

        // Awaiting: the same lookup now finds it through the sibling.
        get(awaiter).unwrap().set_awaiting_task(true);
        let (owner, var) = lookup_variable(awaiter, "result").expect("sibling task visible");
        assert_eq!(owner, sibling);
        assert!(matches!(var.value, Value::Task(_)));
        get(awaiter).unwrap().set_awaiting_task(false);

        crate::scheduler::await_task(&handle).unwrap();
    }
}
