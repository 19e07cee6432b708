//! Deterministic printer for predicate trees.
//!
//! The same printer serves diagnostics (original parameter names) and
//! fingerprinting (parameters renamed by binding position, the outermost
//! one to the entity type name).

use crate::tree::{Expr, Lambda, Parameter, UnaryOp};
use crate::value::Value;
use std::fmt::{self, Write};

/// How bound parameters are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterNaming<'a> {
    /// As written by the caller.
    Original,
    /// Outermost parameters become the entity type name, nested lambda
    /// parameters become `_<depth>_<index>`.
    Entity(&'a str),
}

/// Tree printer with a stack of in-scope parameter renames.
pub struct Printer<'a> {
    naming: ParameterNaming<'a>,
    scopes: Vec<Vec<(String, String)>>,
}

impl<'a> Printer<'a> {
    pub fn new(naming: ParameterNaming<'a>) -> Self {
        Self {
            naming,
            scopes: Vec::new(),
        }
    }

    /// Prints the lambda body with its parameters in scope, omitting the
    /// `p =>` header.
    pub fn print_body(&mut self, lambda: &Lambda) -> String {
        let mut out = String::new();
        self.push_scope(lambda.parameters());
        // Writing into a String cannot fail.
        let _ = self.write_expr(&mut out, lambda.body());
        self.scopes.pop();
        out
    }

    pub fn print(&mut self, expr: &Expr) -> String {
        let mut out = String::new();
        let _ = self.write_expr(&mut out, expr);
        out
    }

    fn push_scope(&mut self, parameters: &[Parameter]) {
        let depth = self.scopes.len();
        let naming = self.naming;
        let scope = parameters
            .iter()
            .enumerate()
            .map(|(index, p)| {
                let printed = match naming {
                    ParameterNaming::Original => p.name().to_string(),
                    ParameterNaming::Entity(entity) if depth == 0 && index == 0 => {
                        entity.to_string()
                    }
                    ParameterNaming::Entity(entity) if depth == 0 => format!("{}_{}", entity, index),
                    ParameterNaming::Entity(_) => format!("_{}_{}", depth, index),
                };
                (p.name().to_string(), printed)
            })
            .collect();
        self.scopes.push(scope);
    }

    fn resolve<'s>(&'s self, parameter: &'s Parameter) -> &'s str {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter())
            .find(|(name, _)| name == parameter.name())
            .map_or(parameter.name(), |(_, printed)| printed.as_str())
    }

    fn write_expr(&mut self, out: &mut String, expr: &Expr) -> fmt::Result {
        match expr {
            Expr::Parameter(p) => out.write_str(self.resolve(p)),
            Expr::Member { target, member, .. } => {
                self.write_expr(out, target)?;
                write!(out, ".{}", member)
            }
            Expr::Constant { value, .. } => match value {
                Value::List(_) | Value::Record(_) => out.write_str(&value.canonical_text()),
                other => write!(out, "{}", other),
            },
            Expr::Binary {
                op, left, right, ..
            } => {
                out.write_char('(')?;
                self.write_expr(out, left)?;
                write!(out, " {} ", op.symbol())?;
                self.write_expr(out, right)?;
                out.write_char(')')
            }
            Expr::Unary { op, operand, .. } => match op {
                UnaryOp::Not => {
                    out.write_str("Not(")?;
                    self.write_expr(out, operand)?;
                    out.write_char(')')
                }
                UnaryOp::Negate => {
                    out.write_char('-')?;
                    self.write_expr(out, operand)
                }
            },
            Expr::Call {
                receiver,
                method,
                args,
                ..
            } => {
                if let Some(receiver) = receiver {
                    self.write_expr(out, receiver)?;
                    out.write_char('.')?;
                }
                write!(out, "{}(", method)?;
                self.write_list(out, args)?;
                out.write_char(')')
            }
            Expr::Construct {
                type_name, fields, ..
            } => {
                write!(out, "new {}(", type_name)?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        out.write_str(", ")?;
                    }
                    write!(out, "{} = ", name)?;
                    self.write_expr(out, value)?;
                }
                out.write_char(')')
            }
            Expr::NewSequence { items, ty } => {
                write!(out, "new {} {{", ty)?;
                self.write_list(out, items)?;
                out.write_char('}')
            }
            Expr::Convert { operand, ty } => {
                out.write_str("Convert(")?;
                self.write_expr(out, operand)?;
                write!(out, ", {})", ty)
            }
            Expr::Lambda(lambda) => {
                self.push_scope(lambda.parameters());
                let names: Vec<String> = lambda
                    .parameters()
                    .iter()
                    .map(|p| self.resolve(p).to_string())
                    .collect();
                let result = if names.len() == 1 {
                    write!(out, "{} => ", names[0])
                } else {
                    write!(out, "({}) => ", names.join(", "))
                }
                .and_then(|()| self.write_expr(out, lambda.body()));
                self.scopes.pop();
                result
            }
        }
    }

    fn write_list(&mut self, out: &mut String, items: &[Expr]) -> fmt::Result {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.write_str(", ")?;
            }
            self.write_expr(out, item)?;
        }
        Ok(())
    }
}

/// Prints an expression with original parameter names.
pub fn print_expr(expr: &Expr) -> String {
    Printer::new(ParameterNaming::Original).print(expr)
}

/// Prints `p => body` with original parameter names.
pub fn print_lambda(lambda: &Lambda) -> String {
    Printer::new(ParameterNaming::Original).print(&Expr::lambda(lambda.clone()))
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print_expr(self))
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print_lambda(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Method;
    use crate::value::{Record, TypeRef};

    fn news_filter(name: &str) -> Lambda {
        let p = Parameter::new(name, TypeRef::entity("Post"));
        Lambda::predicate(
            p.clone(),
            Expr::param(&p)
                .member("IsPublished", TypeRef::Bool)
                .and(
                    Expr::param(&p)
                        .member("Category", TypeRef::Str)
                        .eq(Expr::constant("news")),
                ),
        )
    }

    #[test]
    fn test_print_lambda_original_names() {
        assert_eq!(
            news_filter("p").to_string(),
            "p => (p.IsPublished AndAlso (p.Category == \"news\"))"
        );
    }

    #[test]
    fn test_entity_naming_is_rename_invariant() {
        let a = Printer::new(ParameterNaming::Entity("Post")).print_body(&news_filter("p"));
        let b = Printer::new(ParameterNaming::Entity("Post")).print_body(&news_filter("post"));
        assert_eq!(a, b);
        assert_eq!(a, "(Post.IsPublished AndAlso (Post.Category == \"news\"))");
    }

    #[test]
    fn test_string_literal_is_not_renamed() {
        let p = Parameter::new("p", TypeRef::entity("Post"));
        let lambda = Lambda::predicate(
            p.clone(),
            Expr::param(&p)
                .member("Title", TypeRef::Str)
                .eq(Expr::constant("stop.p.")),
        );
        let printed = Printer::new(ParameterNaming::Entity("Post")).print_body(&lambda);
        assert_eq!(printed, "(Post.Title == \"stop.p.\")");
    }

    #[test]
    fn test_nested_lambda_parameters_use_positions() {
        let p = Parameter::new("p", TypeRef::entity("Post"));
        let t = Parameter::new("t", TypeRef::entity("Tag"));
        let inner = Lambda::predicate(
            t.clone(),
            Expr::param(&t)
                .member("Name", TypeRef::Str)
                .eq(Expr::param(&p).member("Title", TypeRef::Str)),
        );
        let lambda = Lambda::predicate(
            p.clone(),
            Expr::param(&p)
                .member("Tags", TypeRef::sequence_of(TypeRef::entity("Tag")))
                .call(Method::Any, vec![Expr::lambda(inner)]),
        );
        let printed = Printer::new(ParameterNaming::Entity("Post")).print_body(&lambda);
        assert_eq!(
            printed,
            "Post.Tags.Any(_1_0 => (_1_0.Name == Post.Title))"
        );
    }

    #[test]
    fn test_collection_constants_print_by_content() {
        let list = Expr::constant(Value::list(vec![Value::from(1), Value::from(2)]));
        assert_eq!(print_expr(&list), "{1|2}");

        let user = Expr::constant(Record::new("User").with_field("Name", "ada"));
        assert_eq!(print_expr(&user), "User{Name=\"ada\"}");
    }
}
