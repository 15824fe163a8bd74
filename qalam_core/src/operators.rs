//! Operator Algebra: binary and unary operators over `Value`, including
//! numeric promotion (delegated to `value::DynamicNumber`),
//! structural/identity equality, nullish coalescing, and `instance-of`.
//! Dispatch is centralized behind a small `BinOp` enum rather than
//! scattered across the evaluator's match arms.

use crate::config::OverflowPolicy;
use crate::error::{RuntimeError, RuntimeResult};
use crate::evaluator::node::BinaryOp;
use crate::span::SourceLocation;
use crate::value::{DynamicNumber, TypeDescriptor, Value};

pub fn apply_binary(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    location: Option<SourceLocation>,
    overflow_policy: OverflowPolicy,
) -> RuntimeResult<Value> {
    use BinaryOp::*;
    if matches!(op, Add | Sub | Mul | Div | Rem | Pow) {
        if let Some(result) = elementwise(op, left, right, location, overflow_policy) {
            return result;
        }
    }
    match op {
        Add => numeric_or_concat(left, right, location, overflow_policy, |a, b| a.add(b), "add"),
        Sub => numeric_binop(left, right, location, overflow_policy, |a, b| a.sub(b), "subtract"),
        Mul => numeric_binop(left, right, location, overflow_policy, |a, b| a.mul(b), "multiply"),
        Div => {
            let (a, b) = as_numbers(left, right, location, "divide")?;
            a.div(&b).ok_or_else(|| RuntimeError::division_by_zero(location))
        }
        Rem => {
            let (a, b) = as_numbers(left, right, location, "take the remainder of")?;
            a.rem(&b).ok_or_else(|| RuntimeError::division_by_zero(location))
        }
        Pow => {
            let (a, b) = as_numbers(left, right, location, "raise to a power")?;
            let result = a.pow(&b);
            check_overflow(&a, &b, &result, overflow_policy, location)?;
            Ok(Value::Number(result))
        }
        Eq => Ok(Value::Bool(left.structural_eq(right))),
        NotEq => Ok(Value::Bool(!left.structural_eq(right))),
        Lt => compare(left, right, location, |o| o.is_lt()),
        LtEq => compare(left, right, location, |o| o.is_le()),
        Gt => compare(left, right, location, |o| o.is_gt()),
        GtEq => compare(left, right, location, |o| o.is_ge()),
        And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        Or => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
        NullishCoalesce => Ok(if is_nullish(left) {
            right.clone()
        } else {
            left.clone()
        }),
        InstanceOf => instance_of(left, right, location),
        BitAnd => bitwise_binop(left, right, location, |a, b| a.bitand(b), "bitwise-and"),
        BitOr => bitwise_binop(left, right, location, |a, b| a.bitor(b), "bitwise-or"),
        BitXor => bitwise_binop(left, right, location, |a, b| a.bitxor(b), "bitwise-xor"),
        Shl => shift_binop(left, right, location, |a, b| a.shl(b), "shl"),
        Shr => shift_binop(left, right, location, |a, b| a.shr(b), "shr"),
        UShr => shift_binop(left, right, location, |a, b| a.ushr(b), "ushr"),
    }
}

/// Distributes an arithmetic operator over a pair of same-kind,
/// same-length collections (the element-wise variants require equal
/// shape). Returns `None` when neither operand is a collection,
/// letting the caller fall through to the scalar path (which still
/// handles plain-number and text-concatenation `+`).
fn elementwise(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    location: Option<SourceLocation>,
    overflow_policy: OverflowPolicy,
) -> Option<RuntimeResult<Value>> {
    match (left, right) {
        (Value::List(a), Value::List(b)) => {
            let a = a.borrow();
            let b = b.borrow();
            if a.len() != b.len() {
                return Some(Err(RuntimeError::type_mismatch(
                    "element-wise operands must have equal shape",
                    location,
                )));
            }
            let mut out = Vec::with_capacity(a.len());
            for (x, y) in a.iter().zip(b.iter()) {
                match apply_binary(op, x, y, location, overflow_policy) {
                    Ok(v) => out.push(v),
                    Err(e) => return Some(Err(e)),
                }
            }
            Some(Ok(Value::list(out)))
        }
        (Value::Tuple(a), Value::Tuple(b)) => {
            if a.0.len() != b.0.len() {
                return Some(Err(RuntimeError::type_mismatch(
                    "element-wise operands must have equal shape",
                    location,
                )));
            }
            let mut out = Vec::with_capacity(a.0.len());
            for (x, y) in a.0.iter().zip(b.0.iter()) {
                match apply_binary(op, x, y, location, overflow_policy) {
                    Ok(v) => out.push(v),
                    Err(e) => return Some(Err(e)),
                }
            }
            Some(Ok(Value::tuple(out)))
        }
        _ => None,
    }
}

fn bitwise_binop(
    left: &Value,
    right: &Value,
    location: Option<SourceLocation>,
    f: impl Fn(&DynamicNumber, &DynamicNumber) -> Option<DynamicNumber>,
    verb: &str,
) -> RuntimeResult<Value> {
    let (a, b) = as_numbers(left, right, location, verb)?;
    if !a.is_integral() || !b.is_integral() {
        return Err(RuntimeError::type_mismatch(
            format!("{} requires integer operands", verb),
            location,
        ));
    }
    f(&a, &b)
        .map(Value::Number)
        .ok_or_else(|| RuntimeError::type_mismatch(format!("{} failed on the given operands", verb), location))
}

fn shift_binop(
    left: &Value,
    right: &Value,
    location: Option<SourceLocation>,
    f: impl Fn(&DynamicNumber, &DynamicNumber) -> Option<DynamicNumber>,
    verb: &str,
) -> RuntimeResult<Value> {
    let (a, b) = as_numbers(left, right, location, verb)?;
    if !a.is_integral() || !b.is_integral() {
        return Err(RuntimeError::type_mismatch(
            format!("{} requires integer operands", verb),
            location,
        ));
    }
    f(&a, &b).map(Value::Number).ok_or_else(|| {
        RuntimeError::type_mismatch(format!("{} requires a non-negative shift amount", verb), location)
    })
}

pub fn apply_unary(
    op: crate::evaluator::node::UnaryOp,
    operand: &Value,
    location: Option<SourceLocation>,
    overflow_policy: OverflowPolicy,
) -> RuntimeResult<Value> {
    use crate::evaluator::node::UnaryOp::*;
    match op {
        Neg => match operand {
            Value::Number(n) => {
                let result = n.negate();
                check_overflow(n, n, &result, overflow_policy, location)?;
                Ok(Value::Number(result))
            }
            other => Err(RuntimeError::type_mismatch(
                format!("cannot negate a value of type {:?}", other.type_descriptor()),
                location,
            )),
        },
        Not => Ok(Value::Bool(!operand.is_truthy())),
        BitwiseNot => match operand {
            Value::Number(n) if n.is_integral() => Ok(Value::Number(n.bitnot())),
            other => Err(RuntimeError::type_mismatch(
                format!("cannot bitwise-not a value of type {:?}", other.type_descriptor()),
                location,
            )),
        },
        SizeOf => size_of(operand, location).map(|n| Value::int(n as i64)),
        TypeOf => Ok(Value::TypeDescriptor(operand.type_descriptor())),
        PreIncrement | PostIncrement | PreDecrement | PostDecrement => Err(RuntimeError::internal_bug(
            "pre/post increment and decrement require variable context and must not reach apply_unary",
        )),
    }
}

/// `size-of` over every collection and text/bytes variant.
fn size_of(operand: &Value, location: Option<SourceLocation>) -> RuntimeResult<usize> {
    match operand {
        Value::Text(s) => Ok(s.chars().count()),
        Value::Bytes(b) => Ok(b.len()),
        Value::List(l) => Ok(l.borrow().len()),
        Value::Tuple(t) => Ok(t.0.len()),
        Value::OrderedSet(s) => Ok(s.borrow().len()),
        Value::UnorderedSet(s) => Ok(s.borrow().len()),
        Value::OrderedMap(m) => Ok(m.borrow().len()),
        Value::UnorderedMap(m) => Ok(m.borrow().len()),
        other => Err(RuntimeError::non_iterable(
            format!("{:?}", other.type_descriptor()),
            location,
        )),
    }
}

/// Computes the new value a pre/post increment or decrement produces
/// from a numeric value, without deciding whether to assign it back —
/// that decision depends on whether the operand was a plain variable —
/// on a non-variable numeric the result is returned without mutation,
/// which `apply_unary`'s value-only signature can't see. Callers in
/// `evaluator::expr` read the operand's value, call
/// this, then conditionally write the result back through the context.
pub fn apply_step(
    current: &Value,
    delta: i128,
    location: Option<SourceLocation>,
    overflow_policy: OverflowPolicy,
) -> RuntimeResult<DynamicNumber> {
    match current {
        Value::Number(n) => {
            let one = DynamicNumber::from_i128(delta.abs());
            let result = if delta >= 0 { n.add(&one) } else { n.sub(&one) };
            check_overflow(n, &one, &result, overflow_policy, location)?;
            Ok(result)
        }
        other => Err(RuntimeError::type_mismatch(
            format!(
                "cannot increment/decrement a value of type {:?}",
                other.type_descriptor()
            ),
            location,
        )),
    }
}

/// `none`, `NaN`, and `Option.None` are all nullish for `??` purposes;
/// `Option.None`/`Result.Error` are *not* unwrapped here — `??` only
/// looks at the outer shell.
fn is_nullish(v: &Value) -> bool {
    matches!(v, Value::None | Value::NaN | Value::OptionNone)
}

fn as_numbers(
    left: &Value,
    right: &Value,
    location: Option<SourceLocation>,
    verb: &str,
) -> RuntimeResult<(crate::value::DynamicNumber, crate::value::DynamicNumber)> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok((a.clone(), b.clone())),
        _ => Err(RuntimeError::type_mismatch(
            format!(
                "cannot {} values of type {:?} and {:?}",
                verb,
                left.type_descriptor(),
                right.type_descriptor()
            ),
            location,
        )),
    }
}

fn numeric_binop(
    left: &Value,
    right: &Value,
    location: Option<SourceLocation>,
    overflow_policy: OverflowPolicy,
    f: impl Fn(&DynamicNumber, &DynamicNumber) -> DynamicNumber,
    verb: &str,
) -> RuntimeResult<Value> {
    let (a, b) = as_numbers(left, right, location, verb)?;
    let result = f(&a, &b);
    check_overflow(&a, &b, &result, overflow_policy, location)?;
    Ok(Value::Number(result))
}

/// `+` additionally concatenates text, special-casing string
/// concatenation before falling back to numeric promotion. List `+` is
/// handled by the element-wise path above; two lists never reach here.
fn numeric_or_concat(
    left: &Value,
    right: &Value,
    location: Option<SourceLocation>,
    overflow_policy: OverflowPolicy,
    f: impl Fn(&DynamicNumber, &DynamicNumber) -> DynamicNumber,
    verb: &str,
) -> RuntimeResult<Value> {
    match (left, right) {
        (Value::Text(a), Value::Text(b)) => Ok(Value::text(format!("{}{}", a, b))),
        _ => numeric_binop(left, right, location, overflow_policy, f, verb),
    }
}

/// Under `OverflowPolicy::Inhibit`, reject a result that had to widen
/// past the fixed-width integer tiers rather than silently promoting to
/// `BigInt`/`Decimal`/`BigDecimal`.
fn check_overflow(
    a: &DynamicNumber,
    b: &DynamicNumber,
    result: &DynamicNumber,
    overflow_policy: OverflowPolicy,
    location: Option<SourceLocation>,
) -> RuntimeResult<()> {
    if overflow_policy == OverflowPolicy::Inhibit && DynamicNumber::widened_past_fixed_width(a, b, result) {
        return Err(RuntimeError::arithmetic_overflow(
            "operation exceeded the fixed-width integer tower under the Inhibit overflow policy",
            location,
        ));
    }
    Ok(())
}

fn compare(
    left: &Value,
    right: &Value,
    location: Option<SourceLocation>,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> RuntimeResult<Value> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(accept(a.cmp_numeric(b)))),
        (Value::Text(a), Value::Text(b)) => Ok(Value::Bool(accept(a.cmp(b)))),
        (Value::Char(a), Value::Char(b)) => Ok(Value::Bool(accept(a.cmp(b)))),
        _ => Err(RuntimeError::type_mismatch(
            format!(
                "cannot compare values of type {:?} and {:?}",
                left.type_descriptor(),
                right.type_descriptor()
            ),
            location,
        )),
    }
}

fn instance_of(
    value: &Value,
    type_value: &Value,
    location: Option<SourceLocation>,
) -> RuntimeResult<Value> {
    let target = match type_value {
        Value::TypeDescriptor(t) => t.clone(),
        _ => {
            return Err(RuntimeError::type_mismatch(
                "right-hand side of instance-of must be a type",
                location,
            ))
        }
    };
    let actual = value.type_descriptor();
    let matches = match (&actual, &target) {
        (TypeDescriptor::Object(a), TypeDescriptor::Object(b)) => a == b,
        _ => actual == target,
    };
    Ok(Value::Bool(matches))
}
