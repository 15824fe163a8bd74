//! Import Resolver: alias → qualified-name mapping
//! across a block-local / lexical-parent / process-global tier, plus
//! module loading (mapping an import path to the context it evaluated
//! into, for the runtime value an `import` statement binds). Module
//! discovery/parsing from disk is out of scope here — this module only
//! owns the resolution and caching policy, separating "load a module"
//! from "execute it".

use crate::context::{registry, ContextId};
use crate::error::{RuntimeError, RuntimeResult};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Process-wide alias → qualified-name table (the global `IMPORTS` tier).
/// Written once per alias at bootstrap/top-level import time; readers
/// never need a lock held across their own work, so a plain `RwLock`
/// guarding a `HashMap` is enough — no per-entry synchronization.
static GLOBAL_IMPORTS: Lazy<RwLock<HashMap<String, String>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

pub fn define_global_import(alias: impl Into<String>, qualified_name: impl Into<String>) {
    GLOBAL_IMPORTS
        .write()
        .insert(alias.into(), qualified_name.into());
}

pub fn global_import(alias: &str) -> Option<String> {
    GLOBAL_IMPORTS.read().get(alias).cloned()
}

/// Resolves an alias (bare `a` or qualified `a.b.c`) to a fully
/// qualified name: the first segment is looked up through the current
/// context's block imports, then its parent chain, then the global
/// table; whichever tier answers first wins and any remaining segments
/// are appended to its qualified name unchanged.
pub fn resolve_alias(context_id: ContextId, alias: &str) -> Option<String> {
    let (head, rest) = match alias.split_once('.') {
        Some((h, r)) => (h, Some(r)),
        None => (alias, None),
    };

    let base = block_chain_import(context_id, head).or_else(|| global_import(head))?;
    Some(append_remainder(base, rest))
}

/// Walks from `context_id` up through `parent` looking for `head` in
/// each context's block imports (current context's block imports, then
/// its parent chain — the first two tiers of resolution order).
fn block_chain_import(context_id: ContextId, head: &str) -> Option<String> {
    let mut current = Some(context_id);
    while let Some(cid) = current {
        let ctx = registry::get(cid)?;
        if let Some(base) = ctx.block_import_local(head) {
            return Some(base);
        }
        current = ctx.parent;
    }
    None
}

fn append_remainder(base: String, rest: Option<&str>) -> String {
    match rest {
        Some(r) => format!("{}.{}", base, r),
        None => base,
    }
}

/// Supplies the parsed-and-evaluated root context for a module path.
/// The concrete loader (reading a file, fetching a package) lives
/// outside this crate; it only needs to hand back the `ContextId` of
/// the module's top-level scope once evaluated.
pub trait ModuleLoader {
    fn load(&self, path: &str) -> RuntimeResult<ContextId>;
}

#[derive(Default)]
pub struct ImportResolver {
    cache: RwLock<HashMap<String, ContextId>>,
}

impl ImportResolver {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolves `path`, loading it at most once per resolver instance
    /// (re-imports of an already-loaded module are idempotent and
    /// return the same module context).
    pub fn resolve(&self, path: &str, loader: &dyn ModuleLoader) -> RuntimeResult<ContextId> {
        if let Some(id) = self.cache.read().get(path).copied() {
            return Ok(id);
        }
        let id = loader.load(path)?;
        self.cache.write().insert(path.to_string(), id);
        Ok(id)
    }

    pub fn is_loaded(&self, path: &str) -> bool {
        self.cache.read().contains_key(path)
    }
}

/// Detects an import cycle before handing control to the loader, so a
/// self-referential module chain fails with a clear error instead of
/// recursing until the call stack overflows.
pub struct CycleGuard {
    in_progress: RwLock<Vec<String>>,
}

impl Default for CycleGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleGuard {
    pub fn new() -> Self {
        Self {
            in_progress: RwLock::new(Vec::new()),
        }
    }

    pub fn enter(&self, path: &str) -> RuntimeResult<()> {
        let mut stack = self.in_progress.write();
        if stack.iter().any(|p| p == path) {
            return Err(RuntimeError::import_cycle(
                format!("{} -> {}", stack.join(" -> "), path),
                None,
            ));
        }
        stack.push(path.to_string());
        Ok(())
    }

    pub fn exit(&self, path: &str) {
        let mut stack = self.in_progress.write();
        if let Some(pos) = stack.iter().rposition(|p| p == path) {
            stack.remove(pos);
        }
    }
}
