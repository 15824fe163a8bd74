//! Error taxonomy for the runtime core.
//!
//! Two families live side by side: user-visible runtime
//! errors (catchable by a `try { error(e) -> ... }` arm) and internal
//! bugs (never catchable). Both are carried by the same `RuntimeError`
//! type so the evaluator can propagate a single `Result` chain, but
//! `RuntimeError::is_internal` lets callers (the evaluator entry point,
//! the REPL) tell them apart for exit-code purposes.

use crate::span::SourceLocation;
use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("VariableNotFound: {name}{}", at(.location))]
    VariableNotFound {
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("InvocableNotFound: {name}{}", at(.location))]
    InvocableNotFound {
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("InvocableAmbiguous: {name} ({} candidates){}", candidates.len(), at(.location))]
    InvocableAmbiguous {
        name: String,
        candidates: Vec<String>,
        location: Option<SourceLocation>,
    },

    #[error("ExistentVariable: {name}{}", at(.location))]
    ExistentVariable {
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("ExistentParameter: {name}{}", at(.location))]
    ExistentParameter {
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("ExistentArgument: {name}{}", at(.location))]
    ExistentArgument {
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("ExistentFunction: {name}{}", at(.location))]
    ExistentFunction {
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("ExistentImplementation: {name}{}", at(.location))]
    ExistentImplementation {
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("IndexOutOfBounds: index {index} for length {length}{}", at(.location))]
    IndexOutOfBounds {
        index: i64,
        length: usize,
        location: Option<SourceLocation>,
    },

    #[error("NullInNonNullContext{}", at(.location))]
    NullInNonNullContext { location: Option<SourceLocation> },

    #[error("TypeMismatch: {message}{}", at(.location))]
    TypeMismatch {
        message: String,
        location: Option<SourceLocation>,
    },

    #[error("ArithmeticOverflow: {message}{}", at(.location))]
    ArithmeticOverflow {
        message: String,
        location: Option<SourceLocation>,
    },

    #[error("DivisionByZero{}", at(.location))]
    DivisionByZero { location: Option<SourceLocation> },

    #[error("InvalidLoopLabel: {label}{}", at(.location))]
    InvalidLoopLabel {
        label: String,
        location: Option<SourceLocation>,
    },

    #[error("InvalidLoopBounds: {message}{}", at(.location))]
    InvalidLoopBounds {
        message: String,
        location: Option<SourceLocation>,
    },

    #[error("TupleArityMismatch: expected {expected}, got {got}{}", at(.location))]
    TupleArityMismatch {
        expected: usize,
        got: usize,
        location: Option<SourceLocation>,
    },

    #[error("ForeachTargetDuplicate: {name}{}", at(.location))]
    ForeachTargetDuplicate {
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("NonIterable: {type_name}{}", at(.location))]
    NonIterable {
        type_name: String,
        location: Option<SourceLocation>,
    },

    #[error("ConstantReassignment: {name}{}", at(.location))]
    ConstantReassignment {
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("AliasCollision: {alias}{}", at(.location))]
    AliasCollision {
        alias: String,
        location: Option<SourceLocation>,
    },

    #[error("ImportCycle: {path}{}", at(.location))]
    ImportCycle {
        path: String,
        location: Option<SourceLocation>,
    },

    #[error("ErrorException: {message}{}", at(.location))]
    ErrorException {
        message: String,
        location: Option<SourceLocation>,
    },

    #[error("NoMatchingArm: pattern {pattern}{}", at(.location))]
    NoMatchingArm {
        pattern: String,
        location: Option<SourceLocation>,
    },

    #[error("InternalBug: {message}")]
    InternalBug { message: String },
}

fn at(location: &Option<SourceLocation>) -> String {
    match location {
        Some(loc) => format!(" at {}", loc),
        None => String::new(),
    }
}

impl RuntimeError {
    /// Internal bugs must never be caught by user code.
    pub fn is_internal(&self) -> bool {
        matches!(self, RuntimeError::InternalBug { .. })
    }

    /// The error kind symbol, so `error(e)` arms can dispatch
    /// programmatically instead of string-matching a message.
    pub fn kind_name(&self) -> &'static str {
        match self {
            RuntimeError::VariableNotFound { .. } => "VariableNotFound",
            RuntimeError::InvocableNotFound { .. } => "InvocableNotFound",
            RuntimeError::InvocableAmbiguous { .. } => "InvocableAmbiguous",
            RuntimeError::ExistentVariable { .. } => "ExistentVariable",
            RuntimeError::ExistentParameter { .. } => "ExistentParameter",
            RuntimeError::ExistentArgument { .. } => "ExistentArgument",
            RuntimeError::ExistentFunction { .. } => "ExistentFunction",
            RuntimeError::ExistentImplementation { .. } => "ExistentImplementation",
            RuntimeError::IndexOutOfBounds { .. } => "IndexOutOfBounds",
            RuntimeError::NullInNonNullContext { .. } => "NullInNonNullContext",
            RuntimeError::TypeMismatch { .. } => "TypeMismatch",
            RuntimeError::ArithmeticOverflow { .. } => "ArithmeticOverflow",
            RuntimeError::DivisionByZero { .. } => "DivisionByZero",
            RuntimeError::InvalidLoopLabel { .. } => "InvalidLoopLabel",
            RuntimeError::InvalidLoopBounds { .. } => "InvalidLoopBounds",
            RuntimeError::TupleArityMismatch { .. } => "TupleArityMismatch",
            RuntimeError::ForeachTargetDuplicate { .. } => "ForeachTargetDuplicate",
            RuntimeError::NonIterable { .. } => "NonIterable",
            RuntimeError::ConstantReassignment { .. } => "ConstantReassignment",
            RuntimeError::AliasCollision { .. } => "AliasCollision",
            RuntimeError::ImportCycle { .. } => "ImportCycle",
            RuntimeError::ErrorException { .. } => "ErrorException",
            RuntimeError::NoMatchingArm { .. } => "NoMatchingArm",
            RuntimeError::InternalBug { .. } => "InternalBug",
        }
    }

    /// Source location the error occurred at, if any.
    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            RuntimeError::VariableNotFound { location, .. }
            | RuntimeError::InvocableNotFound { location, .. }
            | RuntimeError::InvocableAmbiguous { location, .. }
            | RuntimeError::ExistentVariable { location, .. }
            | RuntimeError::ExistentParameter { location, .. }
            | RuntimeError::ExistentArgument { location, .. }
            | RuntimeError::ExistentFunction { location, .. }
            | RuntimeError::ExistentImplementation { location, .. }
            | RuntimeError::IndexOutOfBounds { location, .. }
            | RuntimeError::NullInNonNullContext { location }
            | RuntimeError::TypeMismatch { location, .. }
            | RuntimeError::ArithmeticOverflow { location, .. }
            | RuntimeError::DivisionByZero { location }
            | RuntimeError::InvalidLoopLabel { location, .. }
            | RuntimeError::InvalidLoopBounds { location, .. }
            | RuntimeError::TupleArityMismatch { location, .. }
            | RuntimeError::ForeachTargetDuplicate { location, .. }
            | RuntimeError::NonIterable { location, .. }
            | RuntimeError::ConstantReassignment { location, .. }
            | RuntimeError::AliasCollision { location, .. }
            | RuntimeError::ImportCycle { location, .. }
            | RuntimeError::ErrorException { location, .. }
            | RuntimeError::NoMatchingArm { location, .. } => *location,
            RuntimeError::InternalBug { .. } => None,
        }
    }

    pub fn variable_not_found(name: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::VariableNotFound {
            name: name.into(),
            location,
        }
    }

    pub fn invocable_not_found(name: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::InvocableNotFound {
            name: name.into(),
            location,
        }
    }

    pub fn invocable_ambiguous(
        name: impl Into<String>,
        candidates: Vec<String>,
        location: Option<SourceLocation>,
    ) -> Self {
        Self::InvocableAmbiguous {
            name: name.into(),
            candidates,
            location,
        }
    }

    pub fn existent_variable(name: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::ExistentVariable {
            name: name.into(),
            location,
        }
    }

    pub fn existent_parameter(name: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::ExistentParameter {
            name: name.into(),
            location,
        }
    }

    pub fn existent_argument(name: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::ExistentArgument {
            name: name.into(),
            location,
        }
    }

    pub fn existent_function(name: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::ExistentFunction {
            name: name.into(),
            location,
        }
    }

    pub fn existent_implementation(
        name: impl Into<String>,
        location: Option<SourceLocation>,
    ) -> Self {
        Self::ExistentImplementation {
            name: name.into(),
            location,
        }
    }

    pub fn index_out_of_bounds(
        index: i64,
        length: usize,
        location: Option<SourceLocation>,
    ) -> Self {
        Self::IndexOutOfBounds {
            index,
            length,
            location,
        }
    }

    pub fn type_mismatch(message: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::TypeMismatch {
            message: message.into(),
            location,
        }
    }

    pub fn arithmetic_overflow(
        message: impl Into<String>,
        location: Option<SourceLocation>,
    ) -> Self {
        Self::ArithmeticOverflow {
            message: message.into(),
            location,
        }
    }

    pub fn division_by_zero(location: Option<SourceLocation>) -> Self {
        Self::DivisionByZero { location }
    }

    pub fn invalid_loop_label(label: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::InvalidLoopLabel {
            label: label.into(),
            location,
        }
    }

    pub fn invalid_loop_bounds(
        message: impl Into<String>,
        location: Option<SourceLocation>,
    ) -> Self {
        Self::InvalidLoopBounds {
            message: message.into(),
            location,
        }
    }

    pub fn tuple_arity_mismatch(
        expected: usize,
        got: usize,
        location: Option<SourceLocation>,
    ) -> Self {
        Self::TupleArityMismatch {
            expected,
            got,
            location,
        }
    }

    pub fn foreach_target_duplicate(
        name: impl Into<String>,
        location: Option<SourceLocation>,
    ) -> Self {
        Self::ForeachTargetDuplicate {
            name: name.into(),
            location,
        }
    }

    pub fn non_iterable(type_name: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::NonIterable {
            type_name: type_name.into(),
            location,
        }
    }

    pub fn constant_reassignment(
        name: impl Into<String>,
        location: Option<SourceLocation>,
    ) -> Self {
        Self::ConstantReassignment {
            name: name.into(),
            location,
        }
    }

    pub fn alias_collision(alias: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::AliasCollision {
            alias: alias.into(),
            location,
        }
    }

    pub fn import_cycle(path: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::ImportCycle {
            path: path.into(),
            location,
        }
    }

    pub fn error_exception(message: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::ErrorException {
            message: message.into(),
            location,
        }
    }

    pub fn no_matching_arm(pattern: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::NoMatchingArm {
            pattern: pattern.into(),
            location,
        }
    }

    pub fn internal_bug(message: impl Into<String>) -> Self {
        Self::InternalBug {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_bug_is_not_catchable_marker() {
        let bug = RuntimeError::internal_bug("unexpected node kind");
        assert!(bug.is_internal());
        let user_err = RuntimeError::variable_not_found("x", None);
        assert!(!user_err.is_internal());
    }

    #[test]
    fn display_includes_location_when_present() {
        let err = RuntimeError::variable_not_found("x", Some(SourceLocation::new(3, 7)));
        assert_eq!(format!("{}", err), "VariableNotFound: x at 3:7");
    }

    #[test]
    fn display_omits_location_when_absent() {
        let err = RuntimeError::division_by_zero(None);
        assert_eq!(format!("{}", err), "DivisionByZero");
    }

    #[test]
    fn import_cycle_has_its_own_kind_name() {
        let err = RuntimeError::import_cycle("a -> b -> a", None);
        assert_eq!(err.kind_name(), "ImportCycle");
        assert_eq!(format!("{}", err), "ImportCycle: a -> b -> a");
    }

    #[test]
    fn kind_name_and_location_are_recoverable_for_dispatch() {
        let err = RuntimeError::division_by_zero(Some(SourceLocation::new(1, 1)));
        assert_eq!(err.kind_name(), "DivisionByZero");
        assert_eq!(err.location(), Some(SourceLocation::new(1, 1)));

        let bug = RuntimeError::internal_bug("oops");
        assert_eq!(bug.kind_name(), "InternalBug");
        assert_eq!(bug.location(), None);
    }
}
