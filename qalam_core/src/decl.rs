//! Declaration records: the things a context binds by
//! name. Kept as plain structs rather than folded into `Value` because
//! mutability, constancy, and nullability are properties of the
//! *binding*, not the value it currently holds.

use crate::error::RuntimeResult;
use crate::evaluator::node::NodeRef;
use crate::span::SourceLocation;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct DeclaredVariable {
    pub name: String,
    pub value: Value,
    pub is_constant: bool,
    pub is_nullable: bool,
    pub declared_at: Option<SourceLocation>,
}

impl DeclaredVariable {
    pub fn new(name: impl Into<String>, value: Value, is_constant: bool, is_nullable: bool) -> Self {
        Self {
            name: name.into(),
            value,
            is_constant,
            is_nullable,
            declared_at: None,
        }
    }

    /// The value an identifier expression sees when it reads this
    /// binding: `Result` values are auto-unwrapped to their inner `Ok`
    /// value or `Error` value on read. The stored `.value`
    /// keeps its `ResultOk`/`ResultError` tag — only inspection through
    /// a plain identifier reference strips it, so `try`/`match` and
    /// argument passing (which move the stored value directly, not
    /// through this accessor) still see the tagged form.
    pub fn read_value(&self) -> Value {
        match &self.value {
            Value::ResultOk(v) | Value::ResultError(v) => (**v).clone(),
            other => other.clone(),
        }
    }

    /// Assigning `none` to a non-nullable binding is an error.
    pub fn check_assignable(&self, new_value: &Value) -> RuntimeResult<()> {
        if self.is_constant {
            return Err(crate::error::RuntimeError::constant_reassignment(
                self.name.clone(),
                self.declared_at,
            ));
        }
        if matches!(new_value, Value::None) && !self.is_nullable {
            return Err(crate::error::RuntimeError::type_mismatch(
                format!("cannot assign none to non-nullable variable {}", self.name),
                self.declared_at,
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DeclaredParameter {
    pub name: String,
    pub is_nullable: bool,
    /// Default-value expression, evaluated lazily in the callee scope
    /// each time the parameter is left unsupplied, not once at
    /// declaration time — so a later parameter's default may refer to
    /// an earlier one.
    pub default: Option<NodeRef>,
    pub is_variadic: bool,
}

/// A single overload body: parameters plus the parse-tree node to
/// evaluate when invoked.
#[derive(Debug, Clone)]
pub struct DeclaredFunction {
    pub name: String,
    pub parameters: Vec<DeclaredParameter>,
    pub body: NodeRef,
    pub declared_at: Option<SourceLocation>,
}

impl DeclaredFunction {
    pub fn required_arity(&self) -> usize {
        self.parameters
            .iter()
            .take_while(|p| p.default.is_none() && !p.is_variadic)
            .count()
    }

    pub fn max_arity(&self) -> Option<usize> {
        if self.parameters.iter().any(|p| p.is_variadic) {
            None
        } else {
            Some(self.parameters.len())
        }
    }

    pub fn accepts_arity(&self, n: usize) -> bool {
        n >= self.required_arity() && self.max_arity().map(|max| n <= max).unwrap_or(true)
    }
}

/// A behavior/implementation bound to a type name: the set of
/// overloads a type exposes under one method name.
#[derive(Debug, Clone)]
pub struct DeclaredImplementation {
    pub type_name: String,
    pub method_name: String,
    pub overloads: Vec<std::sync::Arc<DeclaredFunction>>,
}

impl DeclaredImplementation {
    /// Overload resolution by arity only, first match wins, ties are
    /// ambiguous — the same ranking host invocation uses.
    pub fn resolve(&self, arity: usize) -> Result<std::sync::Arc<DeclaredFunction>, usize> {
        let matches: Vec<_> = self
            .overloads
            .iter()
            .filter(|f| f.accepts_arity(arity))
            .collect();
        match matches.len() {
            1 => Ok(matches[0].clone()),
            n => Err(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::node::{Node, NodeRef};
    use std::sync::Arc;

    fn dummy_body() -> NodeRef {
        Arc::new(Node::Block {
            statements: vec![],
            location: None,
        })
    }

    #[test]
    fn constant_reassignment_is_rejected() {
        let v = DeclaredVariable::new("x", Value::int(1), true, false);
        assert!(v.check_assignable(&Value::int(2)).is_err());
    }

    #[test]
    fn none_into_non_nullable_is_rejected() {
        let v = DeclaredVariable::new("x", Value::int(1), false, false);
        assert!(v.check_assignable(&Value::None).is_err());
    }

    #[test]
    fn reading_a_result_variable_strips_the_tag() {
        let ok = DeclaredVariable::new("r", Value::ResultOk(Box::new(Value::int(7))), false, false);
        assert_eq!(ok.read_value().to_string(), "7");
        let err = DeclaredVariable::new("r", Value::ResultError(Box::new(Value::text("boom"))), false, false);
        assert_eq!(err.read_value().to_string(), "boom");
        // the stored value keeps its tag; only `read_value()` strips it.
        assert_eq!(ok.value.to_string(), "ok(7)");
    }

    #[test]
    fn none_into_nullable_is_allowed() {
        let v = DeclaredVariable::new("x", Value::int(1), false, true);
        assert!(v.check_assignable(&Value::None).is_ok());
    }

    #[test]
    fn overload_resolution_picks_unique_arity_match() {
        let f1 = Arc::new(DeclaredFunction {
            name: "greet".into(),
            parameters: vec![],
            body: dummy_body(),
            declared_at: None,
        });
        let f2 = Arc::new(DeclaredFunction {
            name: "greet".into(),
            parameters: vec![DeclaredParameter {
                name: "who".into(),
                is_nullable: false,
                default: None,
                is_variadic: false,
            }],
            body: dummy_body(),
            declared_at: None,
        });
        let imp = DeclaredImplementation {
            type_name: "Greeter".into(),
            method_name: "greet".into(),
            overloads: vec![f1, f2],
        };
        assert!(imp.resolve(0).is_ok());
        assert!(imp.resolve(1).is_ok());
        assert!(imp.resolve(2).is_err());
    }
}
