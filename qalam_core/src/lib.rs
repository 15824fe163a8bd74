//! Runtime core for a tree-walking interpreter: the Context Tree, the
//! evaluator and its node contract, the dynamic value model, operator
//! algebra, host-call and import plumbing, the cooperative task
//! scheduler, and the REPL's top-level evaluation context.
//!
//! This crate stops at the parse-tree boundary: lexing, parsing, and
//! the concrete surface syntax a front end compiles down to `Node` are
//! out of scope (see `evaluator::node`).
#![deny(clippy::print_stderr, clippy::print_stdout)]

pub mod config;
pub mod context;
pub mod decl;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod evaluator;
pub mod gil;
pub mod host;
pub mod imports;
pub mod operators;
pub mod repl;
pub mod scheduler;
pub mod span;
pub mod stacks;
pub mod value;

pub use config::RuntimeConfig;
pub use context::{registry, Context, ContextId};
pub use decl::{DeclaredFunction, DeclaredImplementation, DeclaredParameter, DeclaredVariable};
pub use diagnostics::{ExecutionStats, ExecutionStatsSnapshot};
pub use env::ExecutionEnv;
pub use error::{RuntimeError, RuntimeResult};
pub use evaluator::node::{BinaryOp, Literal, MatchArm, Node, NodeRef, Param, UnaryOp};
pub use evaluator::{eval, eval_program, Flow};
pub use host::{BootstrapGate, BootstrapState, HostInvocationService, Invocable};
pub use imports::{CycleGuard, ImportResolver, ModuleLoader};
pub use repl::ReplContext;
pub use span::SourceLocation;
pub use stacks::{CallFrame, CallStack, LoopFrame, LoopStack, Signal};
pub use value::Value;
