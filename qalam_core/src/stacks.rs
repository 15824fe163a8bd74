//! Call Stack and Loop Stack: per-thread bookkeeping the evaluator
//! consults to resolve `return`, labeled `break`, and
//! labeled `continue` without threading extra parameters through every
//! recursive `eval_*` call. Kept as plain `Vec`-backed stacks on
//! `ExecutionEnv` (one per OS thread) rather than in the shared context
//! registry, since call/loop nesting is never observed across threads.

use crate::context::ContextId;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct CallFrame {
    pub context_id: ContextId,
    pub function_name: String,
}

#[derive(Debug, Default)]
pub struct CallStack {
    frames: Vec<CallFrame>,
}

impl CallStack {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn push(&mut self, frame: CallFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<CallFrame> {
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current(&self) -> Option<&CallFrame> {
        self.frames.last()
    }
}

#[derive(Debug, Clone)]
pub struct LoopFrame {
    pub label: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct LoopStack {
    frames: Vec<LoopFrame>,
}

impl LoopStack {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn push(&mut self, label: Option<String>) {
        self.frames.push(LoopFrame { label });
    }

    pub fn pop(&mut self) -> Option<LoopFrame> {
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether `label` names a loop currently on the stack
    /// (`break`/`continue` with an unknown label is `InvalidLoopLabel`).
    pub fn contains_label(&self, label: &str) -> bool {
        self.frames.iter().any(|f| f.label.as_deref() == Some(label))
    }

    /// The label of the innermost (current) loop, if any. A labeled
    /// `break`/`continue` naming exactly this loop is a self-reference
    /// and is rejected — an unlabeled `break` already targets the
    /// innermost loop, so a label is only meaningful when it names an
    /// *enclosing* one.
    pub fn innermost_label(&self) -> Option<&str> {
        self.frames.last().and_then(|f| f.label.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Non-error control-flow signal propagated by the evaluator's
/// post-order traversal. Distinct from `RuntimeError` because these are
/// not failures — they're ordinary control transfer that every
/// recursive `eval_*` call must check for and re-propagate until the
/// matching construct absorbs it.
#[derive(Debug, Clone)]
pub enum Signal {
    Break { label: Option<String>, value: Value },
    Continue { label: Option<String> },
    Return { value: Value },
    /// Raised at a node boundary when a task's cancellation flag has
    /// been observed. Propagates through every enclosing construct
    /// exactly like `Return` until it reaches the task body's own
    /// `eval_spawn` closure, which turns it into `Value::None`.
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_stack_tracks_labels() {
        let mut stack = LoopStack::new();
        stack.push(Some("outer".into()));
        stack.push(None);
        assert!(stack.contains_label("outer"));
        assert!(!stack.contains_label("missing"));
        assert_eq!(stack.depth(), 2);
    }

    #[test]
    fn innermost_label_reflects_the_top_frame_only() {
        let mut stack = LoopStack::new();
        assert_eq!(stack.innermost_label(), None);
        stack.push(Some("outer".into()));
        assert_eq!(stack.innermost_label(), Some("outer"));
        stack.push(Some("inner".into()));
        assert_eq!(stack.innermost_label(), Some("inner"));
        stack.pop();
        assert_eq!(stack.innermost_label(), Some("outer"));
    }

    #[test]
    fn call_stack_tracks_current_frame() {
        let mut stack = CallStack::new();
        stack.push(CallFrame {
            context_id: ContextId(1),
            function_name: "f".into(),
        });
        assert_eq!(stack.current().unwrap().function_name, "f");
        stack.pop();
        assert!(stack.current().is_none());
    }
}
