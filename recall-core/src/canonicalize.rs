//! Collection-literal canonicalization.
//!
//! Replaces in-memory list constants appearing as a call receiver, or as an
//! argument declared as a sequence, with a `{e1|e2|...}` rendering of their
//! contents in enumeration order. A receiver is rewritten whenever its value
//! is a list, even when its static type is `Any` (a captured field read
//! through an untyped closure).

use crate::tree::{Expr, Lambda};
use crate::value::Value;
use std::convert::Infallible;

/// Rewrites literal sequences under every call in `expr`.
pub fn canonicalize(expr: &Expr) -> Expr {
    match rewrite(expr) {
        Ok(expr) => expr,
        Err(never) => match never {},
    }
}

/// Canonicalizes a predicate's body.
pub fn canonicalize_predicate(predicate: &Lambda) -> Lambda {
    predicate.with_body(canonicalize(predicate.body()))
}

fn rewrite(expr: &Expr) -> Result<Expr, Infallible> {
    let (receiver, method, args, ty) = match expr.try_map_children(rewrite)? {
        Expr::Call {
            receiver,
            method,
            args,
            ty,
        } => (receiver, method, args, ty),
        other => return Ok(other),
    };

    let receiver = receiver.map(|r| Box::new(canonical_constant(*r)));
    let declared = method.parameter_types();
    let args = args
        .into_iter()
        .enumerate()
        .map(|(i, arg)| match declared.get(i) {
            Some(param) if param.is_sequence() => canonical_constant(arg),
            _ => arg,
        })
        .collect();

    Ok(Expr::Call {
        receiver,
        method,
        args,
        ty,
    })
}

/// Replaces a list constant with its canonical text; anything else is
/// returned unchanged.
fn canonical_constant(expr: Expr) -> Expr {
    match expr {
        Expr::Constant {
            value: value @ Value::List(_),
            ty,
        } => Expr::Constant {
            value: Value::Canonical(value.canonical_text()),
            ty,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::print::print_expr;
    use crate::tree::{Method, Parameter};
    use crate::value::TypeRef;

    fn ids(items: &[i64]) -> Expr {
        Expr::constant(Value::list(items.iter().map(|i| Value::Int(*i))))
    }

    fn post() -> Parameter {
        Parameter::new("p", TypeRef::entity("Post"))
    }

    #[test]
    fn test_receiver_list_is_canonicalized() {
        let p = post();
        let expr = ids(&[1, 2, 3]).call(
            Method::Contains,
            vec![Expr::param(&p).member("Id", TypeRef::Int)],
        );
        assert_eq!(print_expr(&canonicalize(&expr)), "{1|2|3}.Contains(p.Id)");
    }

    #[test]
    fn test_sequence_argument_is_canonicalized() {
        let p = post();
        let expr = Expr::call_static(
            Method::SequenceContains,
            vec![ids(&[3, 1]), Expr::param(&p).member("Id", TypeRef::Int)],
        );
        assert_eq!(print_expr(&canonicalize(&expr)), "Contains({3|1}, p.Id)");
    }

    #[test]
    fn test_identity_does_not_matter_but_content_does() {
        let p = post();
        let make = |list: Expr| {
            canonicalize(&list.call(
                Method::Contains,
                vec![Expr::param(&p).member("Id", TypeRef::Int)],
            ))
        };
        assert_eq!(make(ids(&[1, 2])), make(ids(&[1, 2])));
        assert_ne!(
            print_expr(&make(ids(&[1, 2]))),
            print_expr(&make(ids(&[2, 1])))
        );
        assert_ne!(
            print_expr(&make(ids(&[1, 2]))),
            print_expr(&make(ids(&[1, 2, 3])))
        );
    }

    #[test]
    fn test_untyped_list_receiver_is_canonicalized() {
        let p = post();
        let untyped =
            Expr::constant_typed(Value::list(vec![Value::Int(4), Value::Int(2)]), TypeRef::Any);
        let expr = untyped.call(
            Method::Contains,
            vec![Expr::param(&p).member("Id", TypeRef::Int)],
        );
        assert_eq!(print_expr(&canonicalize(&expr)), "{4|2}.Contains(p.Id)");
    }

    #[test]
    fn test_non_sequence_arguments_untouched() {
        let p = post();
        let expr = Expr::param(&p)
            .member("Title", TypeRef::Str)
            .call(Method::StartsWith, vec![Expr::constant("Rust")]);
        assert_eq!(canonicalize(&expr), expr);
    }

    #[test]
    fn test_calls_nested_in_logic_are_reached() {
        let p = post();
        let expr = Expr::param(&p).member("IsPublished", TypeRef::Bool).and(
            ids(&[7]).call(
                Method::Contains,
                vec![Expr::param(&p).member("Id", TypeRef::Int)],
            ),
        );
        assert_eq!(
            print_expr(&canonicalize(&expr)),
            "(p.IsPublished AndAlso {7}.Contains(p.Id))"
        );
    }
}
