//! Runtime configuration. Kept as one plain struct constructed up
//! front and threaded through `ExecutionEnv`, bundling together the
//! handful of knobs that change evaluator behavior without reaching
//! for a global.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Widen through the numeric tower on overflow (the default).
    Promote,
    /// Raise `ArithmeticOverflow` instead of widening past a fixed
    /// width — useful for host-embedding profiles that want bounded
    /// numeric storage.
    Inhibit,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::Promote
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub numeric_overflow_policy: OverflowPolicy,
    /// Whether the REPL root context is active; disabled for one-shot
    /// script execution.
    pub interactive: bool,
    /// The cooperative scheduler checks for a pending cancellation/yield
    /// request every this-many evaluator-node boundaries crossed, not
    /// on every single node, to keep the check cheap.
    pub cooperative_yield_every: usize,
    pub max_call_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            numeric_overflow_policy: OverflowPolicy::default(),
            interactive: false,
            cooperative_yield_every: 64,
            max_call_depth: 4096,
        }
    }
}
