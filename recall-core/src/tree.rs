//! Predicate tree: the immutable, typed representation of a caller's filter.
//!
//! Trees are built with the combinators on [`Expr`] and wrapped in a
//! [`Lambda`] that binds the row parameter. Every node carries its static
//! type so the evaluator can tell closed local values from lazy remote
//! sequences without looking at runtime data.

use crate::value::{TypeRef, Value};
use std::fmt;

static ANY_TYPE: TypeRef = TypeRef::Any;

// ============================================================================
// PARAMETERS AND OPERATORS
// ============================================================================

/// A bound parameter, e.g. the `p` in `p => p.IsPublished`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    name: String,
    ty: TypeRef,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAlso,
    OrElse,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Coalesce,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::AndAlso => "AndAlso",
            Self::OrElse => "OrElse",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Coalesce => "??",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Self::AndAlso | Self::OrElse)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
}

/// The closed set of methods a filter may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `s.StartsWith(prefix)`
    StartsWith,
    /// `s.EndsWith(suffix)`
    EndsWith,
    /// `s.Contains(fragment)` on strings.
    StrContains,
    ToLower,
    ToUpper,
    Trim,
    /// `s.Length`
    Length,
    /// `list.Contains(item)`: receiver-style membership.
    Contains,
    /// `Contains(list, item)`: static membership, the list is an argument.
    SequenceContains,
    /// `seq.Any()` or `seq.Any(x => ...)`
    Any,
    /// `seq.All(x => ...)`
    All,
    /// `seq.Count()`
    Count,
    /// `Abs(x)`
    Abs,
}

impl Method {
    pub fn name(self) -> &'static str {
        match self {
            Self::StartsWith => "StartsWith",
            Self::EndsWith => "EndsWith",
            Self::StrContains | Self::Contains | Self::SequenceContains => "Contains",
            Self::ToLower => "ToLower",
            Self::ToUpper => "ToUpper",
            Self::Trim => "Trim",
            Self::Length => "Length",
            Self::Any => "Any",
            Self::All => "All",
            Self::Count => "Count",
            Self::Abs => "Abs",
        }
    }

    /// Declared parameter types, excluding the receiver.
    pub fn parameter_types(self) -> Vec<TypeRef> {
        match self {
            Self::StartsWith | Self::EndsWith | Self::StrContains => vec![TypeRef::Str],
            Self::ToLower | Self::ToUpper | Self::Trim | Self::Length | Self::Count => Vec::new(),
            Self::Contains => vec![TypeRef::Any],
            Self::SequenceContains => vec![TypeRef::sequence_of(TypeRef::Any), TypeRef::Any],
            Self::Any | Self::All => vec![TypeRef::Any],
            Self::Abs => vec![TypeRef::Any],
        }
    }

    /// Whether the method is invoked on a receiver.
    pub fn is_instance(self) -> bool {
        !matches!(self, Self::SequenceContains | Self::Abs)
    }

    fn return_type(self, args: &[Expr]) -> TypeRef {
        match self {
            Self::StartsWith
            | Self::EndsWith
            | Self::StrContains
            | Self::Contains
            | Self::SequenceContains
            | Self::Any
            | Self::All => TypeRef::Bool,
            Self::ToLower | Self::ToUpper | Self::Trim => TypeRef::Str,
            Self::Length | Self::Count => TypeRef::Int,
            Self::Abs => args.first().map_or(TypeRef::Any, |a| a.ty().clone()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// NODES
// ============================================================================

/// A predicate tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to a lambda-bound parameter.
    Parameter(Parameter),
    /// `target.member`
    Member {
        target: Box<Expr>,
        member: String,
        ty: TypeRef,
    },
    /// Literal or captured value.
    Constant { value: Value, ty: TypeRef },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        ty: TypeRef,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        ty: TypeRef,
    },
    Call {
        receiver: Option<Box<Expr>>,
        method: Method,
        args: Vec<Expr>,
        ty: TypeRef,
    },
    /// `new Type { field = value, .. }`
    Construct {
        type_name: String,
        fields: Vec<(String, Expr)>,
        ty: TypeRef,
    },
    /// `new [] { a, b, c }`
    NewSequence { items: Vec<Expr>, ty: TypeRef },
    /// Type conversion.
    Convert { operand: Box<Expr>, ty: TypeRef },
    /// Nested predicate, e.g. the argument of `Any`.
    Lambda(Box<Lambda>),
}

impl Expr {
    pub fn param(parameter: &Parameter) -> Self {
        Self::Parameter(parameter.clone())
    }

    /// Constant with a type inferred from the value.
    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        let ty = infer_type(&value);
        Self::Constant { value, ty }
    }

    pub fn constant_typed(value: impl Into<Value>, ty: TypeRef) -> Self {
        Self::Constant {
            value: value.into(),
            ty,
        }
    }

    pub fn member(self, member: impl Into<String>, ty: TypeRef) -> Self {
        Self::Member {
            target: Box::new(self),
            member: member.into(),
            ty,
        }
    }

    pub fn binary(self, op: BinaryOp, right: Expr) -> Self {
        let ty = if op.is_comparison() || op.is_logical() {
            TypeRef::Bool
        } else if op == BinaryOp::Coalesce {
            right.ty().clone()
        } else if *self.ty().underlying() == TypeRef::Float
            || *right.ty().underlying() == TypeRef::Float
        {
            TypeRef::Float
        } else {
            self.ty().clone()
        };
        Self::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right),
            ty,
        }
    }

    pub fn and(self, right: Expr) -> Self {
        self.binary(BinaryOp::AndAlso, right)
    }

    pub fn or(self, right: Expr) -> Self {
        self.binary(BinaryOp::OrElse, right)
    }

    pub fn eq(self, right: Expr) -> Self {
        self.binary(BinaryOp::Eq, right)
    }

    pub fn ne(self, right: Expr) -> Self {
        self.binary(BinaryOp::Ne, right)
    }

    pub fn lt(self, right: Expr) -> Self {
        self.binary(BinaryOp::Lt, right)
    }

    pub fn le(self, right: Expr) -> Self {
        self.binary(BinaryOp::Le, right)
    }

    pub fn gt(self, right: Expr) -> Self {
        self.binary(BinaryOp::Gt, right)
    }

    pub fn ge(self, right: Expr) -> Self {
        self.binary(BinaryOp::Ge, right)
    }

    pub fn add(self, right: Expr) -> Self {
        self.binary(BinaryOp::Add, right)
    }

    pub fn sub(self, right: Expr) -> Self {
        self.binary(BinaryOp::Sub, right)
    }

    pub fn mul(self, right: Expr) -> Self {
        self.binary(BinaryOp::Mul, right)
    }

    pub fn div(self, right: Expr) -> Self {
        self.binary(BinaryOp::Div, right)
    }

    pub fn rem(self, right: Expr) -> Self {
        self.binary(BinaryOp::Mod, right)
    }

    pub fn coalesce(self, right: Expr) -> Self {
        self.binary(BinaryOp::Coalesce, right)
    }

    pub fn not(self) -> Self {
        Self::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
            ty: TypeRef::Bool,
        }
    }

    pub fn negate(self) -> Self {
        let ty = self.ty().clone();
        Self::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(self),
            ty,
        }
    }

    /// Instance call: `self.method(args)`.
    pub fn call(self, method: Method, args: Vec<Expr>) -> Self {
        let ty = method.return_type(&args);
        Self::Call {
            receiver: Some(Box::new(self)),
            method,
            args,
            ty,
        }
    }

    /// Static call: `method(args)`.
    pub fn call_static(method: Method, args: Vec<Expr>) -> Self {
        let ty = method.return_type(&args);
        Self::Call {
            receiver: None,
            method,
            args,
            ty,
        }
    }

    pub fn construct(type_name: impl Into<String>, fields: Vec<(String, Expr)>) -> Self {
        let type_name = type_name.into();
        let ty = TypeRef::entity(type_name.clone());
        Self::Construct {
            type_name,
            fields,
            ty,
        }
    }

    pub fn new_sequence(element: TypeRef, items: Vec<Expr>) -> Self {
        Self::NewSequence {
            items,
            ty: TypeRef::sequence_of(element),
        }
    }

    pub fn convert(self, ty: TypeRef) -> Self {
        Self::Convert {
            operand: Box::new(self),
            ty,
        }
    }

    pub fn lambda(lambda: Lambda) -> Self {
        Self::Lambda(Box::new(lambda))
    }

    /// Static type of this node.
    pub fn ty(&self) -> &TypeRef {
        match self {
            Self::Parameter(p) => p.ty(),
            Self::Member { ty, .. }
            | Self::Constant { ty, .. }
            | Self::Binary { ty, .. }
            | Self::Unary { ty, .. }
            | Self::Call { ty, .. }
            | Self::Construct { ty, .. }
            | Self::NewSequence { ty, .. }
            | Self::Convert { ty, .. } => ty,
            Self::Lambda(_) => &ANY_TYPE,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Constant { .. })
    }

    /// Direct children in a fixed order: target, left/right, receiver then
    /// arguments, fields, items, operand, lambda body.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Self::Parameter(_) | Self::Constant { .. } => Vec::new(),
            Self::Member { target, .. } => vec![&**target],
            Self::Binary { left, right, .. } => vec![&**left, &**right],
            Self::Unary { operand, .. } | Self::Convert { operand, .. } => vec![&**operand],
            Self::Call { receiver, args, .. } => {
                receiver.iter().map(|r| &**r).chain(args.iter()).collect()
            }
            Self::Construct { fields, .. } => fields.iter().map(|(_, e)| e).collect(),
            Self::NewSequence { items, .. } => items.iter().collect(),
            Self::Lambda(lambda) => vec![lambda.body()],
        }
    }

    /// Rebuilds this node with every child replaced by `f(child)`, in the
    /// order of [`Expr::children`].
    pub fn try_map_children<E>(
        &self,
        mut f: impl FnMut(&Expr) -> Result<Expr, E>,
    ) -> Result<Expr, E> {
        Ok(match self {
            Self::Parameter(_) | Self::Constant { .. } => self.clone(),
            Self::Member { target, member, ty } => Self::Member {
                target: Box::new(f(target)?),
                member: member.clone(),
                ty: ty.clone(),
            },
            Self::Binary {
                op,
                left,
                right,
                ty,
            } => Self::Binary {
                op: *op,
                left: Box::new(f(left)?),
                right: Box::new(f(right)?),
                ty: ty.clone(),
            },
            Self::Unary { op, operand, ty } => Self::Unary {
                op: *op,
                operand: Box::new(f(operand)?),
                ty: ty.clone(),
            },
            Self::Call {
                receiver,
                method,
                args,
                ty,
            } => {
                let receiver = match receiver {
                    Some(r) => Some(Box::new(f(r)?)),
                    None => None,
                };
                let args = args.iter().map(&mut f).collect::<Result<Vec<_>, E>>()?;
                Self::Call {
                    receiver,
                    method: *method,
                    args,
                    ty: ty.clone(),
                }
            }
            Self::Construct {
                type_name,
                fields,
                ty,
            } => Self::Construct {
                type_name: type_name.clone(),
                fields: fields
                    .iter()
                    .map(|(name, e)| Ok((name.clone(), f(e)?)))
                    .collect::<Result<Vec<_>, E>>()?,
                ty: ty.clone(),
            },
            Self::NewSequence { items, ty } => Self::NewSequence {
                items: items.iter().map(&mut f).collect::<Result<Vec<_>, E>>()?,
                ty: ty.clone(),
            },
            Self::Convert { operand, ty } => Self::Convert {
                operand: Box::new(f(operand)?),
                ty: ty.clone(),
            },
            Self::Lambda(lambda) => Self::Lambda(Box::new(lambda.with_body(f(lambda.body())?))),
        })
    }

    /// Short node-kind label for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parameter(_) => "parameter",
            Self::Member { .. } => "member access",
            Self::Constant { .. } => "constant",
            Self::Binary { .. } => "binary operator",
            Self::Unary { .. } => "unary operator",
            Self::Call { .. } => "method call",
            Self::Construct { .. } => "construction",
            Self::NewSequence { .. } => "sequence construction",
            Self::Convert { .. } => "conversion",
            Self::Lambda(_) => "lambda",
        }
    }
}

fn infer_type(value: &Value) -> TypeRef {
    match value {
        Value::Null => TypeRef::Any,
        Value::Bool(_) => TypeRef::Bool,
        Value::Int(_) => TypeRef::Int,
        Value::Float(_) => TypeRef::Float,
        Value::Str(_) => TypeRef::Str,
        Value::Timestamp(_) => TypeRef::Timestamp,
        Value::Uuid(_) => TypeRef::Uuid,
        Value::List(items) => TypeRef::sequence_of(
            items
                .first()
                .map_or(TypeRef::Any, |first| infer_type(first)),
        ),
        Value::Record(record) => TypeRef::entity(record.type_name()),
        Value::Canonical(_) => TypeRef::Any,
    }
}

// ============================================================================
// LAMBDAS
// ============================================================================

/// A lambda binding one or more parameters over a body.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    parameters: Vec<Parameter>,
    body: Expr,
}

/// A filter: a lambda whose body is boolean.
pub type Predicate = Lambda;

impl Lambda {
    pub fn new(parameters: Vec<Parameter>, body: Expr) -> Self {
        Self { parameters, body }
    }

    /// Single-parameter lambda, the usual shape of a filter.
    pub fn predicate(parameter: Parameter, body: Expr) -> Self {
        Self::new(vec![parameter], body)
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn body(&self) -> &Expr {
        &self.body
    }

    /// Same parameters, new body.
    pub fn with_body(&self, body: Expr) -> Self {
        Self {
            parameters: self.parameters.clone(),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post() -> Parameter {
        Parameter::new("p", TypeRef::entity("Post"))
    }

    #[test]
    fn test_comparison_and_logic_are_boolean() {
        let p = post();
        let expr = Expr::param(&p)
            .member("Views", TypeRef::Int)
            .gt(Expr::constant(10))
            .and(Expr::param(&p).member("IsPublished", TypeRef::Bool));
        assert_eq!(*expr.ty(), TypeRef::Bool);
    }

    #[test]
    fn test_arithmetic_widens_to_float() {
        let p = post();
        let expr = Expr::param(&p)
            .member("Views", TypeRef::Int)
            .mul(Expr::constant(1.5));
        assert_eq!(*expr.ty(), TypeRef::Float);

        let ints = Expr::constant(1).add(Expr::constant(2));
        assert_eq!(*ints.ty(), TypeRef::Int);
    }

    #[test]
    fn test_constant_list_type_inference() {
        let expr = Expr::constant(Value::list(vec![Value::from("a")]));
        assert_eq!(*expr.ty(), TypeRef::sequence_of(TypeRef::Str));
        assert!(expr.is_constant());
    }

    #[test]
    fn test_method_signatures() {
        assert_eq!(Method::SequenceContains.parameter_types().len(), 2);
        assert!(Method::SequenceContains.parameter_types()[0].is_sequence());
        assert!(!Method::SequenceContains.is_instance());
        assert!(Method::Contains.is_instance());

        let call = Expr::constant("abc").call(Method::Length, Vec::new());
        assert_eq!(*call.ty(), TypeRef::Int);
    }

    #[test]
    fn test_lambda_accessors() {
        let p = post();
        let lambda = Lambda::predicate(p.clone(), Expr::constant(true));
        assert_eq!(lambda.parameters(), &[p]);
        assert_eq!(lambda.body(), &Expr::constant(true));
        assert_eq!(lambda.with_body(Expr::constant(false)).body(), &Expr::constant(false));
    }
}
