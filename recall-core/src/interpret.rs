//! Tree-walking interpreter for closed subtrees.
//!
//! Only nodes nominated by the partial evaluator reach this module, so a
//! parameter reference or a lambda here is a caller bug reported as an
//! error rather than a panic.

use crate::error::EvaluationError;
use crate::print::print_expr;
use crate::tree::{BinaryOp, Expr, Method, UnaryOp};
use crate::value::{Record, TypeRef, Value};
use std::cmp::Ordering;

/// Evaluates a closed expression against the values captured in its constants.
pub fn evaluate(expr: &Expr) -> Result<Value, EvaluationError> {
    match expr {
        Expr::Parameter(p) => Err(EvaluationError::UnboundParameter {
            name: p.name().to_string(),
        }),
        Expr::Constant { value, .. } => match value {
            Value::Canonical(_) => Err(unsupported(expr)),
            other => Ok(other.clone()),
        },
        Expr::Member { target, member, .. } => member_access(evaluate(target)?, member),
        Expr::Binary {
            op, left, right, ..
        } => binary(expr, *op, left, right),
        Expr::Unary { op, operand, .. } => {
            let value = evaluate(operand)?;
            match (op, value) {
                (_, Value::Null) => Ok(Value::Null),
                (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                (UnaryOp::Negate, Value::Int(i)) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| overflow(expr)),
                (UnaryOp::Negate, Value::Float(x)) => Ok(Value::Float(-x)),
                (op, other) => Err(mismatch(format!("{:?}", op), other.kind().to_string())),
            }
        }
        Expr::Call {
            receiver,
            method,
            args,
            ..
        } => {
            let receiver = receiver.as_deref().map(evaluate).transpose()?;
            if args.iter().any(|a| matches!(a, Expr::Lambda(_))) {
                return Err(unsupported(expr));
            }
            let args = args.iter().map(evaluate).collect::<Result<Vec<_>, _>>()?;
            call(expr, *method, receiver, &args)
        }
        Expr::Construct {
            type_name, fields, ..
        } => {
            let mut record = Record::new(type_name.clone());
            for (name, field) in fields {
                record = record.with_field(name.clone(), evaluate(field)?);
            }
            Ok(Value::record(record))
        }
        Expr::NewSequence { items, .. } => {
            let items = items.iter().map(evaluate).collect::<Result<Vec<_>, _>>()?;
            Ok(Value::list(items))
        }
        Expr::Convert { operand, ty } => convert(expr, evaluate(operand)?, ty),
        Expr::Lambda(_) => Err(unsupported(expr)),
    }
}

fn unsupported(expr: &Expr) -> EvaluationError {
    EvaluationError::Unsupported {
        node: format!("{} `{}`", expr.kind(), print_expr(expr)),
    }
}

fn overflow(expr: &Expr) -> EvaluationError {
    EvaluationError::Overflow {
        expression: print_expr(expr),
    }
}

fn mismatch(operation: impl Into<String>, detail: impl Into<String>) -> EvaluationError {
    EvaluationError::TypeMismatch {
        operation: operation.into(),
        detail: detail.into(),
    }
}

fn member_access(target: Value, member: &str) -> Result<Value, EvaluationError> {
    match (&target, member) {
        (Value::Null, _) => Err(EvaluationError::NullDereference {
            member: member.to_string(),
        }),
        (Value::Record(record), _) => {
            record
                .field(member)
                .cloned()
                .ok_or_else(|| EvaluationError::UnknownMember {
                    type_name: record.type_name().to_string(),
                    member: member.to_string(),
                })
        }
        (Value::Str(s), "Length") => Ok(Value::Int(s.chars().count() as i64)),
        (Value::List(items), "Count" | "Length") => Ok(Value::Int(items.len() as i64)),
        _ => Err(EvaluationError::UnknownMember {
            type_name: target.kind().to_string(),
            member: member.to_string(),
        }),
    }
}

fn binary(expr: &Expr, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Value, EvaluationError> {
    // Short-circuiting operators evaluate the right side lazily.
    match op {
        BinaryOp::AndAlso | BinaryOp::OrElse => {
            let lhs = expect_bool(op, evaluate(left)?)?;
            return match (op, lhs) {
                (BinaryOp::AndAlso, false) => Ok(Value::Bool(false)),
                (BinaryOp::OrElse, true) => Ok(Value::Bool(true)),
                _ => Ok(Value::Bool(expect_bool(op, evaluate(right)?)?)),
            };
        }
        BinaryOp::Coalesce => {
            let lhs = evaluate(left)?;
            return if lhs.is_null() { evaluate(right) } else { Ok(lhs) };
        }
        _ => {}
    }

    let lhs = evaluate(left)?;
    let rhs = evaluate(right)?;
    match op {
        BinaryOp::Eq => Ok(Value::Bool(lhs.loose_eq(&rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!lhs.loose_eq(&rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            if lhs.is_null() || rhs.is_null() {
                return Ok(Value::Bool(false));
            }
            let ordering = lhs.compare(&rhs).ok_or_else(|| {
                mismatch(op.symbol(), format!("{} and {}", lhs.kind(), rhs.kind()))
            })?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        _ => arithmetic(expr, op, lhs, rhs),
    }
}

fn expect_bool(op: BinaryOp, value: Value) -> Result<bool, EvaluationError> {
    value
        .as_bool()
        .ok_or_else(|| mismatch(op.symbol(), format!("expected Bool, got {}", value.kind())))
}

fn arithmetic(expr: &Expr, op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvaluationError> {
    match (lhs, rhs) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int(a), Value::Int(b)) => {
            if matches!(op, BinaryOp::Div | BinaryOp::Mod) && b == 0 {
                return Err(EvaluationError::DivideByZero {
                    expression: print_expr(expr),
                });
            }
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div => a.checked_div(b),
                _ => a.checked_rem(b),
            };
            result.map(Value::Int).ok_or_else(|| overflow(expr))
        }
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(float_op(op, a as f64, b))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(float_op(op, a, b as f64))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(op, a, b))),
        (Value::Str(a), Value::Str(b)) if op == BinaryOp::Add => Ok(Value::Str(a + &b)),
        (lhs, rhs) => Err(mismatch(
            op.symbol(),
            format!("{} and {}", lhs.kind(), rhs.kind()),
        )),
    }
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        _ => a % b,
    }
}

fn call(
    expr: &Expr,
    method: Method,
    receiver: Option<Value>,
    args: &[Value],
) -> Result<Value, EvaluationError> {
    let receiver = match (method.is_instance(), receiver) {
        (true, Some(Value::Null)) => {
            return Err(EvaluationError::NullDereference {
                member: method.name().to_string(),
            })
        }
        (true, Some(value)) => Some(value),
        (true, None) | (false, Some(_)) => return Err(unsupported(expr)),
        (false, None) => None,
    };

    match (method, receiver.as_ref(), args) {
        (Method::StartsWith, Some(Value::Str(s)), [Value::Str(arg)]) => {
            Ok(Value::Bool(s.starts_with(arg.as_str())))
        }
        (Method::EndsWith, Some(Value::Str(s)), [Value::Str(arg)]) => {
            Ok(Value::Bool(s.ends_with(arg.as_str())))
        }
        (Method::StrContains, Some(Value::Str(s)), [Value::Str(arg)]) => {
            Ok(Value::Bool(s.contains(arg.as_str())))
        }
        (Method::StartsWith | Method::EndsWith | Method::StrContains, Some(Value::Str(_)), [Value::Null]) => {
            Err(EvaluationError::NullDereference {
                member: method.name().to_string(),
            })
        }
        (Method::ToLower, Some(Value::Str(s)), []) => Ok(Value::Str(s.to_lowercase())),
        (Method::ToUpper, Some(Value::Str(s)), []) => Ok(Value::Str(s.to_uppercase())),
        (Method::Trim, Some(Value::Str(s)), []) => Ok(Value::Str(s.trim().to_string())),
        (Method::Length, Some(Value::Str(s)), []) => Ok(Value::Int(s.chars().count() as i64)),
        (Method::Contains, Some(Value::List(items)), [item]) => {
            Ok(Value::Bool(items.iter().any(|v| v.loose_eq(item))))
        }
        (Method::SequenceContains, None, [Value::List(items), item]) => {
            Ok(Value::Bool(items.iter().any(|v| v.loose_eq(item))))
        }
        (Method::SequenceContains, None, [Value::Null, _]) => {
            Err(EvaluationError::NullDereference {
                member: method.name().to_string(),
            })
        }
        (Method::Any, Some(Value::List(items)), []) => Ok(Value::Bool(!items.is_empty())),
        (Method::Count | Method::Length, Some(Value::List(items)), []) => {
            Ok(Value::Int(items.len() as i64))
        }
        (Method::Abs, None, [Value::Int(i)]) => {
            i.checked_abs().map(Value::Int).ok_or_else(|| overflow(expr))
        }
        (Method::Abs, None, [Value::Float(x)]) => Ok(Value::Float(x.abs())),
        (Method::Abs, None, [Value::Null]) => Ok(Value::Null),
        (method, receiver, args) => {
            let receiver = receiver.map_or("static", Value::kind);
            let args: Vec<&str> = args.iter().map(Value::kind).collect();
            Err(mismatch(
                method.name(),
                format!("receiver {} with arguments ({})", receiver, args.join(", ")),
            ))
        }
    }
}

fn convert(expr: &Expr, value: Value, target: &TypeRef) -> Result<Value, EvaluationError> {
    match (value, target.underlying()) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Int(i), TypeRef::Float) => Ok(Value::Float(i as f64)),
        (Value::Float(x), TypeRef::Int) => {
            let truncated = x.trunc();
            if truncated.is_finite() && truncated >= i64::MIN as f64 && truncated < i64::MAX as f64 {
                Ok(Value::Int(truncated as i64))
            } else {
                Err(overflow(expr))
            }
        }
        (Value::Int(i), TypeRef::Str) => Ok(Value::Str(i.to_string())),
        (Value::Float(x), TypeRef::Str) => Ok(Value::Str(x.to_string())),
        (Value::Bool(b), TypeRef::Str) => Ok(Value::Str(b.to_string())),
        (value @ Value::Int(_), TypeRef::Int)
        | (value @ Value::Float(_), TypeRef::Float)
        | (value @ Value::Str(_), TypeRef::Str)
        | (value @ Value::Bool(_), TypeRef::Bool)
        | (value @ Value::Timestamp(_), TypeRef::Timestamp)
        | (value @ Value::Uuid(_), TypeRef::Uuid)
        | (value @ Value::List(_), TypeRef::Sequence(_))
        | (value @ Value::Record(_), TypeRef::Entity(_))
        | (value, TypeRef::Any) => Ok(value),
        (value, target) => Err(mismatch(
            "Convert",
            format!("{} to {}", value.kind(), target),
        )),
    }
}
