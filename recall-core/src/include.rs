//! Eager-load path descriptors.

use crate::error::IncludePathError;
use crate::print::print_lambda;
use crate::tree::{Expr, Lambda};
use std::fmt;

/// A navigation path to eager-load alongside the query, e.g. `Tags.Author`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IncludePath {
    segments: Vec<String>,
}

impl IncludePath {
    pub fn new<I, S>(segments: I) -> Result<Self, IncludePathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() || segments.iter().any(|s| s.trim().is_empty()) {
            return Err(IncludePathError::Empty);
        }
        Ok(Self { segments })
    }

    /// Parses a dotted path such as `"Tags.Author"`.
    pub fn parse(path: &str) -> Result<Self, IncludePathError> {
        Self::new(path.split('.').map(str::trim))
    }

    /// Resolves `p => p.Tags.Author` into `Tags.Author`. The body must be a
    /// chain of member accesses rooted at the lambda's only parameter.
    pub fn from_lambda(lambda: &Lambda) -> Result<Self, IncludePathError> {
        let [parameter] = lambda.parameters() else {
            return Err(IncludePathError::ParameterCount {
                count: lambda.parameters().len(),
            });
        };

        let mut segments = Vec::new();
        let mut node = lambda.body();
        loop {
            match node {
                Expr::Member { target, member, .. } => {
                    segments.push(member.clone());
                    node = target;
                }
                Expr::Parameter(p) if p == parameter => break,
                _ => {
                    return Err(IncludePathError::NotAMemberChain {
                        expression: print_lambda(lambda),
                    })
                }
            }
        }
        segments.reverse();
        Self::new(segments).map_err(|_| IncludePathError::NotAMemberChain {
            expression: print_lambda(lambda),
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

/// Printed form hashed into cache keys.
impl fmt::Display for IncludePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Include({})", self.segments.join("."))
    }
}
