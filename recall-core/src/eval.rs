//! Partial evaluation: folds closed subtrees of a predicate into constants.
//!
//! Two passes over the tree:
//!
//! 1. **Nominate** (bottom-up) marks every node that is eligible and has no
//!    live descendant. Parameter references and lazy remote sequences are
//!    live, and liveness propagates to every ancestor.
//! 2. **Substitute** (top-down) replaces each maximal nominated subtree with
//!    a constant holding its interpreted value. Existing constants pass
//!    through untouched.

use crate::error::EvaluationError;
use crate::interpret::evaluate;
use crate::tree::{Expr, Lambda};

/// Default eligibility: everything except bound-parameter references and
/// nodes typed as lazy remote sequences. Folding the latter would pull
/// backend data into the process.
pub fn default_eligibility(expr: &Expr) -> bool {
    !matches!(expr, Expr::Parameter(_)) && !expr.ty().is_lazy_sequence()
}

/// Nomination result, shaped like the tree it annotates.
#[derive(Debug)]
struct Nomination {
    candidate: bool,
    children: Vec<Nomination>,
}

fn nominate(expr: &Expr, is_eligible: &dyn Fn(&Expr) -> bool) -> Nomination {
    let children: Vec<Nomination> = expr
        .children()
        .into_iter()
        .map(|child| nominate(child, is_eligible))
        .collect();
    let live_below = children.iter().any(|c| !c.candidate);
    // A lambda is a binding site, never a value in its own right.
    let eligible = !matches!(expr, Expr::Lambda(_)) && is_eligible(expr);
    Nomination {
        candidate: eligible && !live_below,
        children,
    }
}

struct Substitution {
    folded: usize,
}

impl Substitution {
    fn substitute(&mut self, expr: &Expr, nomination: &Nomination) -> Result<Expr, EvaluationError> {
        if nomination.candidate {
            if expr.is_constant() {
                return Ok(expr.clone());
            }
            let value = evaluate(expr)?;
            self.folded += 1;
            return Ok(Expr::constant_typed(value, expr.ty().clone()));
        }
        let mut nominations = nomination.children.iter();
        expr.try_map_children(|child| match nominations.next() {
            Some(n) => self.substitute(child, n),
            None => Ok(child.clone()),
        })
    }
}

/// Folds every maximal closed subtree of `root` under `is_eligible` into a
/// constant.
pub fn fold(root: &Expr, is_eligible: impl Fn(&Expr) -> bool) -> Result<Expr, EvaluationError> {
    let nomination = nominate(root, &is_eligible);
    let mut substitution = Substitution { folded: 0 };
    let folded = substitution.substitute(root, &nomination)?;
    tracing::trace!(folded = substitution.folded, "partial evaluation complete");
    Ok(folded)
}

/// Folds a predicate's body with [`default_eligibility`].
pub fn fold_predicate(predicate: &Lambda) -> Result<Lambda, EvaluationError> {
    Ok(predicate.with_body(fold(predicate.body(), default_eligibility)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Method, Parameter};
    use crate::value::{Record, TypeRef, Value};

    fn post() -> Parameter {
        Parameter::new("p", TypeRef::entity("Post"))
    }

    fn closure() -> Expr {
        Expr::constant(
            Record::new("Closure")
                .with_field("category", "news")
                .with_field("min_views", 100)
                .with_field("author", Value::Null),
        )
    }

    #[test]
    fn test_captured_members_fold_to_constants() {
        let p = post();
        let body = Expr::param(&p)
            .member("Category", TypeRef::Str)
            .eq(closure().member("category", TypeRef::Str));
        let folded = fold(&body, default_eligibility).unwrap();
        assert_eq!(
            folded,
            Expr::param(&p)
                .member("Category", TypeRef::Str)
                .eq(Expr::constant("news"))
        );
    }

    #[test]
    fn test_closed_tree_folds_to_single_constant() {
        let body = closure()
            .member("min_views", TypeRef::Int)
            .mul(Expr::constant(2))
            .gt(Expr::constant(150));
        let folded = fold(&body, default_eligibility).unwrap();
        assert_eq!(folded, Expr::constant_typed(true, TypeRef::Bool));
    }

    #[test]
    fn test_lazy_sequences_stay_live() {
        let p = post();
        let tags = Expr::constant_typed(
            Record::new("DbContext"),
            TypeRef::entity("DbContext"),
        )
        .member("Tags", TypeRef::query_of(TypeRef::entity("Tag")));
        let body = tags
            .clone()
            .call(Method::Any, Vec::new())
            .and(Expr::param(&p).member("IsPublished", TypeRef::Bool));
        let folded = fold(&body, default_eligibility).unwrap();
        // The receiver `DbContext` constant is closed but its member is lazy,
        // so the whole `Any()` call survives.
        assert_eq!(folded, body);
    }

    #[test]
    fn test_nested_lambda_is_never_folded() {
        let p = post();
        let t = Parameter::new("t", TypeRef::entity("Tag"));
        let inner = Lambda::predicate(t, Expr::constant(true));
        let body = Expr::param(&p)
            .member("Tags", TypeRef::sequence_of(TypeRef::entity("Tag")))
            .call(Method::Any, vec![Expr::lambda(inner)]);
        assert_eq!(fold(&body, default_eligibility).unwrap(), body);
    }

    #[test]
    fn test_null_dereference_surfaces() {
        let p = post();
        let body = Expr::param(&p)
            .member("Author", TypeRef::Str)
            .eq(closure()
                .member("author", TypeRef::entity("User"))
                .member("Name", TypeRef::Str));
        assert_eq!(
            fold(&body, default_eligibility),
            Err(EvaluationError::NullDereference {
                member: "Name".to_string()
            })
        );
    }

    #[test]
    fn test_custom_eligibility_keeps_calls_live() {
        let p = post();
        let body = Expr::param(&p)
            .member("Title", TypeRef::Str)
            .eq(Expr::constant("ABC").call(Method::ToLower, Vec::new()));
        let folded = fold(&body, |e| {
            default_eligibility(e) && !matches!(e, Expr::Call { .. })
        })
        .unwrap();
        assert_eq!(folded, body);
    }

    #[test]
    fn test_fold_predicate_keeps_parameters() {
        let p = post();
        let predicate = Lambda::predicate(
            p.clone(),
            Expr::param(&p)
                .member("Views", TypeRef::Int)
                .ge(Expr::constant(1).add(Expr::constant(1))),
        );
        let folded = fold_predicate(&predicate).unwrap();
        assert_eq!(folded.parameters(), predicate.parameters());
        assert_eq!(
            folded.body(),
            &Expr::param(&p)
                .member("Views", TypeRef::Int)
                .ge(Expr::constant_typed(2, TypeRef::Int))
        );
    }
}
