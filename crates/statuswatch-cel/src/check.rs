//! Static validation pass
//!
//! Runs after parsing and before a program is cached. Everything rejected
//! here is a compilation error, so operator-authored expressions fail fast at
//! rule load instead of at evaluation time: undeclared identifiers, unknown
//! functions, wrong arity, mixed-type aggregate literals, and malformed
//! constant arguments to `matches()`, `duration()`, and `timestamp()`.

use chrono::DateTime;
use thiserror::Error;

use crate::ast::{Expr, Literal};
use crate::functions::{GLOBALS, METHODS};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CheckError {
    #[error("undeclared reference to '{0}'")]
    UndeclaredReference(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    #[error("{name}() takes {expected} argument(s), got {got}")]
    WrongArity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("aggregate literal mixes {0} and {1} elements")]
    MixedAggregate(&'static str, &'static str),

    #[error("map literal key must be a string, got {0}")]
    MapKeyNotString(&'static str),

    #[error("invalid regular expression '{pattern}': {detail}")]
    InvalidRegex { pattern: String, detail: String },

    #[error("invalid duration literal '{value}': {detail}")]
    InvalidDuration { value: String, detail: String },

    #[error("invalid timestamp literal '{value}': {detail}")]
    InvalidTimestamp { value: String, detail: String },
}

/// Validates an AST against the set of declared input variables.
pub(crate) fn check(ast: &Expr, declared: &[String]) -> Result<(), CheckError> {
    let mut checker = Checker {
        declared,
        locals: Vec::new(),
    };
    checker.visit(ast)
}

struct Checker<'a> {
    declared: &'a [String],
    /// Comprehension loop variables in scope
    locals: Vec<String>,
}

impl Checker<'_> {
    fn visit(&mut self, expr: &Expr) -> Result<(), CheckError> {
        match expr {
            Expr::Literal(_) => Ok(()),
            Expr::Ident(name) => {
                if self.locals.iter().any(|v| v == name)
                    || self.declared.iter().any(|v| v == name)
                {
                    Ok(())
                } else {
                    Err(CheckError::UndeclaredReference(name.clone()))
                }
            }
            Expr::List(elements) => {
                check_homogeneous(elements.iter())?;
                elements.iter().try_for_each(|e| self.visit(e))
            }
            Expr::Map(entries) => {
                check_homogeneous(entries.iter().map(|(k, _)| k))?;
                check_homogeneous(entries.iter().map(|(_, v)| v))?;
                for (key, value) in entries {
                    // Constant keys must already be strings; dynamic keys are
                    // checked when the map is built
                    if let Expr::Literal(lit) = key
                        && !matches!(lit, Literal::String(_))
                    {
                        return Err(CheckError::MapKeyNotString(lit.kind()));
                    }
                    self.visit(key)?;
                    self.visit(value)?;
                }
                Ok(())
            }
            Expr::Unary { expr, .. } => self.visit(expr),
            Expr::Binary { lhs, rhs, .. } => {
                self.visit(lhs)?;
                self.visit(rhs)
            }
            Expr::Ternary { cond, then, otherwise } => {
                self.visit(cond)?;
                self.visit(then)?;
                self.visit(otherwise)
            }
            Expr::Field { target, .. } => self.visit(target),
            Expr::Index { target, index } => {
                self.visit(target)?;
                self.visit(index)
            }
            Expr::Call { target, name, args } => {
                self.check_call(target.as_deref(), name, args)?;
                if let Some(receiver) = target {
                    self.visit(receiver)?;
                }
                args.iter().try_for_each(|a| self.visit(a))
            }
            Expr::Comprehension { target, var, body, .. } => {
                self.visit(target)?;
                self.locals.push(var.clone());
                let result = self.visit(body);
                self.locals.pop();
                result
            }
            Expr::Has(inner) => {
                // has(a.b): only the target is a real evaluation, the final
                // selection is the presence test itself
                match inner.as_ref() {
                    Expr::Field { target, .. } => self.visit(target),
                    other => self.visit(other),
                }
            }
        }
    }

    fn check_call(
        &self,
        target: Option<&Expr>,
        name: &str,
        args: &[Expr],
    ) -> Result<(), CheckError> {
        let table_entry = match target {
            Some(_) => METHODS
                .get(name)
                .copied()
                .ok_or_else(|| CheckError::UnknownMethod(name.to_string()))?,
            None => GLOBALS
                .get(name)
                .copied()
                .ok_or_else(|| CheckError::UnknownFunction(name.to_string()))?,
        };

        let (min, max) = table_entry;
        if args.len() < min as usize || args.len() > max as usize {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{min} to {max}")
            };
            return Err(CheckError::WrongArity {
                name: name.to_string(),
                expected,
                got: args.len(),
            });
        }

        self.check_constant_args(target, name, args)
    }

    /// Constant arguments to the temporal and regex builtins are validated
    /// now so a typo in a pattern is a compile error, not a runtime one.
    fn check_constant_args(
        &self,
        target: Option<&Expr>,
        name: &str,
        args: &[Expr],
    ) -> Result<(), CheckError> {
        let constant_str = |expr: &Expr| match expr {
            Expr::Literal(Literal::String(s)) => Some(s.clone()),
            _ => None,
        };

        match (target.is_some(), name) {
            (_, "matches") => {
                // Pattern is the last argument for both forms
                if let Some(pattern) = args.last().and_then(constant_str) {
                    regex::Regex::new(&pattern).map_err(|e| CheckError::InvalidRegex {
                        pattern,
                        detail: e.to_string(),
                    })?;
                }
            }
            (false, "duration") => {
                if let Some(value) = args.first().and_then(constant_str) {
                    let body = value.strip_prefix('-').unwrap_or(&value);
                    humantime::parse_duration(body).map_err(|e| CheckError::InvalidDuration {
                        value,
                        detail: e.to_string(),
                    })?;
                }
            }
            (false, "timestamp") => {
                if let Some(value) = args.first().and_then(constant_str) {
                    DateTime::parse_from_rfc3339(&value).map_err(|e| {
                        CheckError::InvalidTimestamp {
                            value,
                            detail: e.to_string(),
                        }
                    })?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Aggregate literals whose elements are themselves literals must share a
/// single kind
fn check_homogeneous<'a>(elements: impl Iterator<Item = &'a Expr>) -> Result<(), CheckError> {
    let mut seen: Option<&'static str> = None;
    for element in elements {
        let Expr::Literal(lit) = element else {
            continue;
        };
        let kind = lit.kind();
        match seen {
            None => seen = Some(kind),
            Some(first) if first != kind => {
                return Err(CheckError::MixedAggregate(first, kind));
            }
            Some(_) => {}
        }
    }
    Ok(())
}
