//! REPL Context: an eternal root context that outlives every
//! top-level input. Each line (or pasted block) the
//! user submits gets its own child context to evaluate in; when that
//! child finishes, instead of vanishing the way an ordinary block scope
//! would, its declarations merge upward into the REPL root (via
//! `context::registry::deregister`'s merge-on-removal step) so the next
//! input sees variables and functions the previous one defined.

use crate::context::{registry, ContextId};
use crate::error::RuntimeResult;
use crate::value::Value;

pub struct ReplContext {
    pub root: ContextId,
}

impl Default for ReplContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplContext {
    pub fn new() -> Self {
        Self {
            root: registry::register(None),
        }
    }

    /// Runs `eval_statement` against a fresh child of the REPL root and
    /// folds its bindings back into the root once it completes,
    /// regardless of whether evaluation succeeded — a failed statement
    /// may still have partially declared variables the user expects to
    /// see on the next line — the prompt state should always stay
    /// usable, even after a failed statement.
    pub fn eval_top_level(
        &self,
        eval_statement: impl FnOnce(ContextId) -> RuntimeResult<Value>,
    ) -> RuntimeResult<Value> {
        let line_ctx = registry::register(Some(self.root));
        let result = eval_statement(line_ctx);
        registry::deregister_merge_into_parent(line_ctx);
        result
    }
}
