//! The Context Tree: a hierarchical per-thread scope tree. Every
//! block, function call, and loop iteration gets its own `Context`;
//! lookups walk up through `parent` until a context either has the
//! binding or has no parent (the REPL root, see `crate::repl`).
//!
//! Contexts are looked up process-wide by `ContextId` through a single
//! registry (`registry::CONTEXTS`). The tree is shared across OS
//! threads (the cooperative scheduler spawns real threads), so the
//! registry and each context's interior state are guarded by
//! `parking_lot` locks rather than living behind `&mut self`.

pub mod registry;

use crate::decl::{DeclaredFunction, DeclaredImplementation, DeclaredVariable};
use crate::error::{RuntimeError, RuntimeResult};
use crate::span::SourceLocation;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

pub struct Context {
    pub id: ContextId,
    pub parent: Option<ContextId>,
    pub depth: usize,
    variables: RwLock<HashMap<String, DeclaredVariable>>,
    functions: RwLock<HashMap<String, Vec<Arc<DeclaredFunction>>>>,
    implementations: RwLock<HashMap<(String, String), Arc<DeclaredImplementation>>>,
    /// Alias → qualified-name bindings introduced by an `import` inside
    /// this block. Visible only within this context's subtree — unlike
    /// variables, they are never merged into the parent on deregister.
    block_imports: RwLock<HashMap<String, String>>,
    /// Tasks spawned from within this context that haven't completed yet
    /// (a context can't be torn down while it still owns work).
    pending_tasks: AtomicUsize,
    pending_removal: AtomicBool,
    /// Transient "awaiting-task" flag (spec §3's per-context transient
    /// state). Set for the duration of an `await` blocking on this
    /// context; lets `registry::lookup_variable` widen its search to
    /// sibling contexts for a `Task`-valued binding while set.
    awaiting_task: AtomicBool,
}

impl Context {
    pub fn new(id: ContextId, parent: Option<ContextId>, depth: usize) -> Self {
        Self {
            id,
            parent,
            depth,
            variables: RwLock::new(HashMap::new()),
            functions: RwLock::new(HashMap::new()),
            implementations: RwLock::new(HashMap::new()),
            block_imports: RwLock::new(HashMap::new()),
            pending_tasks: AtomicUsize::new(0),
            pending_removal: AtomicBool::new(false),
            awaiting_task: AtomicBool::new(false),
        }
    }

    pub fn set_awaiting_task(&self, awaiting: bool) {
        self.awaiting_task.store(awaiting, Ordering::SeqCst);
    }

    pub fn is_awaiting_task(&self) -> bool {
        self.awaiting_task.load(Ordering::SeqCst)
    }

    /// Registers an alias → qualified-name import local to this block.
    /// Rejects a second import of the same alias in the same scope
    /// ("alias collisions within a single block-import scope are
    /// rejected") — re-importing the same alias in a *child* block is
    /// fine, since it only shadows the outer one there.
    pub fn define_block_import(
        &self,
        alias: impl Into<String>,
        qualified_name: impl Into<String>,
        location: Option<SourceLocation>,
    ) -> RuntimeResult<()> {
        let alias = alias.into();
        let mut imports = self.block_imports.write();
        if imports.contains_key(&alias) {
            return Err(RuntimeError::alias_collision(alias, location));
        }
        imports.insert(alias, qualified_name.into());
        Ok(())
    }

    pub fn block_import_local(&self, alias: &str) -> Option<String> {
        self.block_imports.read().get(alias).cloned()
    }

    pub fn define_variable(&self, var: DeclaredVariable) -> RuntimeResult<()> {
        let mut vars = self.variables.write();
        if vars.contains_key(&var.name) {
            return Err(RuntimeError::existent_variable(
                var.name.clone(),
                var.declared_at,
            ));
        }
        vars.insert(var.name.clone(), var);
        Ok(())
    }

    pub fn contains_variable_local(&self, name: &str) -> bool {
        self.variables.read().contains_key(name)
    }

    pub fn get_variable_local(&self, name: &str) -> Option<DeclaredVariable> {
        self.variables.read().get(name).cloned()
    }

    /// Mutates the binding in place, enforcing constancy/nullability.
    pub fn set_variable_local(
        &self,
        name: &str,
        new_value: crate::value::Value,
        location: Option<SourceLocation>,
    ) -> RuntimeResult<()> {
        let mut vars = self.variables.write();
        match vars.get_mut(name) {
            Some(existing) => {
                existing.check_assignable(&new_value)?;
                existing.value = new_value;
                Ok(())
            }
            None => Err(RuntimeError::variable_not_found(name, location)),
        }
    }

    pub fn define_function(&self, func: DeclaredFunction) -> RuntimeResult<()> {
        let mut funcs = self.functions.write();
        let entry = funcs.entry(func.name.clone()).or_default();
        if entry.iter().any(|f| f.accepts_arity(func.parameters.len())) {
            return Err(RuntimeError::existent_function(
                func.name.clone(),
                func.declared_at,
            ));
        }
        entry.push(Arc::new(func));
        Ok(())
    }

    pub fn functions_local(&self, name: &str) -> Vec<Arc<DeclaredFunction>> {
        self.functions.read().get(name).cloned().unwrap_or_default()
    }

    pub fn define_implementation(&self, imp: DeclaredImplementation) -> RuntimeResult<()> {
        let key = (imp.type_name.clone(), imp.method_name.clone());
        let mut impls = self.implementations.write();
        if impls.contains_key(&key) {
            return Err(RuntimeError::existent_implementation(
                format!("{}.{}", imp.type_name, imp.method_name),
                None,
            ));
        }
        impls.insert(key, Arc::new(imp));
        Ok(())
    }

    /// Overwrites (or inserts) the implementation entry regardless of
    /// whether one already exists — used to append a new overload to
    /// an already-declared behavior (a type can accumulate multiple
    /// `BehaviorDecl`s for the same method name, distinguished by
    /// arity).
    pub fn replace_implementation(&self, imp: DeclaredImplementation) {
        let key = (imp.type_name.clone(), imp.method_name.clone());
        self.implementations.write().insert(key, Arc::new(imp));
    }

    pub fn implementation_local(
        &self,
        type_name: &str,
        method_name: &str,
    ) -> Option<Arc<DeclaredImplementation>> {
        self.implementations
            .read()
            .get(&(type_name.to_string(), method_name.to_string()))
            .cloned()
    }

    /// Merge another context's declarations into this one, skipping
    /// names that already exist here. Used when a finished context
    /// hands its bindings up to its parent (the eternal-root REPL
    /// context does this for every top-level scope).
    pub fn merge_from(&self, other: &Context) {
        let mut vars = self.variables.write();
        for (name, var) in other.variables.read().iter() {
            vars.entry(name.clone()).or_insert_with(|| var.clone());
        }
        drop(vars);
        let mut funcs = self.functions.write();
        for (name, overloads) in other.functions.read().iter() {
            funcs.entry(name.clone()).or_default().extend(overloads.iter().cloned());
        }
        drop(funcs);
        let mut impls = self.implementations.write();
        for (key, imp) in other.implementations.read().iter() {
            impls.entry(key.clone()).or_insert_with(|| imp.clone());
        }
    }

    pub fn inc_pending_tasks(&self) {
        self.pending_tasks.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns `true` if this was the last pending task and the
    /// context was already marked for removal.
    pub fn dec_pending_tasks(&self) -> bool {
        let prev = self.pending_tasks.fetch_sub(1, Ordering::SeqCst);
        prev == 1 && self.pending_removal.load(Ordering::SeqCst)
    }

    pub fn pending_task_count(&self) -> usize {
        self.pending_tasks.load(Ordering::SeqCst)
    }

    pub fn mark_pending_removal(&self) {
        self.pending_removal.store(true, Ordering::SeqCst);
    }

    pub fn is_pending_removal(&self) -> bool {
        self.pending_removal.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("depth", &self.depth)
            .field("pending_tasks", &self.pending_task_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn define_and_read_local_variable() {
        let ctx = Context::new(ContextId(1), None, 0);
        ctx.define_variable(DeclaredVariable::new("x", Value::int(1), false, false))
            .unwrap();
        assert!(ctx.contains_variable_local("x"));
        assert_eq!(
            ctx.get_variable_local("x").unwrap().value.to_string(),
            "1"
        );
    }

    #[test]
    fn redefining_same_name_is_existent_variable_error() {
        let ctx = Context::new(ContextId(1), None, 0);
        ctx.define_variable(DeclaredVariable::new("x", Value::int(1), false, false))
            .unwrap();
        let err = ctx
            .define_variable(DeclaredVariable::new("x", Value::int(2), false, false))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::ExistentVariable { .. }));
    }

    #[test]
    fn block_import_collision_on_the_same_alias_is_rejected() {
        let ctx = Context::new(ContextId(1), None, 0);
        ctx.define_block_import("m", "pkg.math", None).unwrap();
        let err = ctx.define_block_import("m", "pkg.other", None).unwrap_err();
        assert!(matches!(err, RuntimeError::AliasCollision { .. }));
        assert_eq!(ctx.block_import_local("m").unwrap(), "pkg.math");
    }

    #[test]
    fn pending_removal_waits_for_tasks_to_drain() {
        let ctx = Context::new(ContextId(1), None, 0);
        ctx.inc_pending_tasks();
        ctx.inc_pending_tasks();
        ctx.mark_pending_removal();
        assert!(!ctx.dec_pending_tasks());
        assert!(ctx.dec_pending_tasks());
    }
}
