//! Compiled programs and evaluation profiles
//!
//! A [`Program`] is an expression that survived parsing and static checking
//! against a fixed set of declared variables. An [`Evaluator`] runs programs
//! against input documents under one of two profiles: metered, which enforces
//! the per-call cost ceiling and reports consumed cost, and unmetered, for
//! trusted callers that want neither.

use indexmap::IndexMap;
use serde::Serialize;

use crate::ast::Expr;
use crate::check;
use crate::error::{CelError, Result};
use crate::eval::{self, ExecError};
use crate::parser;
use crate::value::Value;

/// Cost ceiling applied to a single evaluation under the metered profile.
///
/// Matches the per-call expression budget the Kubernetes apiserver enforces
/// for admission-time CEL.
pub const PER_CALL_COST_LIMIT: u64 = 2_000_000;

/// A compiled, validated expression
#[derive(Debug)]
pub struct Program {
    expression: String,
    variables: Vec<String>,
    ast: Expr,
}

impl Program {
    /// Parses and statically checks `expression`, which may reference only
    /// the variables named in `variables`.
    pub fn compile(expression: &str, variables: &[&str]) -> Result<Program> {
        let compilation_err = |detail: String| CelError::Compilation {
            expression: expression.to_string(),
            detail,
        };

        let ast = parser::parse(expression).map_err(|e| compilation_err(e.to_string()))?;
        let variables: Vec<String> = variables.iter().map(|v| v.to_string()).collect();
        check::check(&ast, &variables).map_err(|e| compilation_err(e.to_string()))?;

        Ok(Program {
            expression: expression.to_string(),
            variables,
            ast,
        })
    }

    /// The original expression text
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The variable names the program may reference
    pub fn variables(&self) -> &[String] {
        &self.variables
    }
}

/// Outcome of one evaluation. `cost` is present only under a cost-tracking
/// profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvalResponse {
    pub result: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<u64>,
}

/// Evaluation profile: cost ceiling plus whether consumed cost is reported
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    cost_limit: Option<u64>,
    track_cost: bool,
}

impl Evaluator {
    /// The profile for operator-authored expressions: the per-call cost
    /// ceiling is enforced and consumed cost is reported.
    pub fn metered() -> Evaluator {
        Evaluator {
            cost_limit: Some(PER_CALL_COST_LIMIT),
            track_cost: true,
        }
    }

    /// No ceiling, no cost reporting
    pub fn unmetered() -> Evaluator {
        Evaluator {
            cost_limit: None,
            track_cost: false,
        }
    }

    /// Metered profile with a custom ceiling
    pub fn with_cost_limit(limit: u64) -> Evaluator {
        Evaluator {
            cost_limit: Some(limit),
            track_cost: true,
        }
    }

    /// Evaluates `program` with the given variable bindings. Variables
    /// declared at compile time but absent from `bindings` are an error only
    /// if the expression actually dereferences them.
    pub fn evaluate(
        &self,
        program: &Program,
        bindings: &[(&str, &serde_json::Value)],
    ) -> Result<EvalResponse> {
        let env: IndexMap<String, Value> = bindings
            .iter()
            .map(|(name, doc)| (name.to_string(), Value::from_json(doc)))
            .collect();

        let (value, cost) =
            eval::execute(&program.ast, &env, self.cost_limit).map_err(|e| match e {
                ExecError::CostLimit { cost, limit } => {
                    CelError::CostLimitExceeded { cost, limit }
                }
                other => CelError::Runtime {
                    expression: program.expression.clone(),
                    detail: other.to_string(),
                },
            })?;

        let result = match value {
            Value::Bool(b) => b,
            other => {
                return Err(CelError::UnsupportedResultType {
                    type_name: other.type_name(),
                });
            }
        };

        Ok(EvalResponse {
            result,
            cost: self.track_cost.then_some(cost),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compile_and_evaluate() {
        let program = Program::compile("self.status.phase == 'Running'", &["self"]).unwrap();
        let doc = json!({"status": {"phase": "Running"}});
        let response = Evaluator::metered().evaluate(&program, &[("self", &doc)]).unwrap();
        assert!(response.result);
        assert!(response.cost.is_some_and(|c| c > 0));
    }

    #[test]
    fn test_compile_rejects_bad_syntax() {
        let err = Program::compile("1 +", &[]).unwrap_err();
        assert!(!err.is_runtime());
        assert!(matches!(err, CelError::Compilation { .. }));
    }

    #[test]
    fn test_compile_rejects_deep_nesting() {
        let expr = format!("{}true{}", "(".repeat(5_000), ")".repeat(5_000));
        let err = Program::compile(&expr, &[]).unwrap_err();
        let CelError::Compilation { detail, .. } = err else {
            panic!("expected a compilation error");
        };
        assert!(detail.contains("nesting depth"));
    }

    #[test]
    fn test_compile_rejects_undeclared_variable() {
        let err = Program::compile("resource.ready", &["self"]).unwrap_err();
        let CelError::Compilation { detail, .. } = err else {
            panic!("expected a compilation error");
        };
        assert!(detail.contains("resource"));
    }

    #[test]
    fn test_unmetered_profile_reports_no_cost() {
        let program = Program::compile("true", &[]).unwrap();
        let response = Evaluator::unmetered().evaluate(&program, &[]).unwrap();
        assert!(response.result);
        assert_eq!(response.cost, None);
    }

    #[test]
    fn test_non_boolean_result_rejected() {
        let program = Program::compile("1 + 2", &[]).unwrap();
        let err = Evaluator::metered().evaluate(&program, &[]).unwrap_err();
        assert!(matches!(
            err,
            CelError::UnsupportedResultType { type_name: "int" }
        ));
    }

    #[test]
    fn test_runtime_error_carries_expression() {
        let program = Program::compile("self.status.ready", &["self"]).unwrap();
        let doc = json!({"spec": {}});
        let err = Evaluator::metered().evaluate(&program, &[("self", &doc)]).unwrap_err();
        let CelError::Runtime { expression, detail } = err else {
            panic!("expected a runtime error");
        };
        assert_eq!(expression, "self.status.ready");
        assert!(detail.contains("no such key"));
    }

    #[test]
    fn test_cost_limit_enforced() {
        let items: Vec<i64> = (0..200).collect();
        let doc = json!({"items": items});
        let program = Program::compile(
            "self.items.all(a, self.items.all(b, self.items.all(c, a + b + c >= 0)))",
            &["self"],
        )
        .unwrap();

        let err = Evaluator::metered().evaluate(&program, &[("self", &doc)]).unwrap_err();
        let CelError::CostLimitExceeded { cost, limit } = err else {
            panic!("expected a cost limit error");
        };
        assert_eq!(limit, PER_CALL_COST_LIMIT);
        assert!(cost > limit);
    }

    #[test]
    fn test_custom_cost_limit() {
        let program = Program::compile("[1, 2, 3].all(n, n > 0)", &[]).unwrap();
        let err = Evaluator::with_cost_limit(2).evaluate(&program, &[]).unwrap_err();
        assert!(matches!(err, CelError::CostLimitExceeded { limit: 2, .. }));
    }

    #[test]
    fn test_eval_response_serialization() {
        let with_cost = EvalResponse { result: true, cost: Some(12) };
        assert_eq!(
            serde_json::to_string(&with_cost).unwrap(),
            r#"{"result":true,"cost":12}"#
        );
        let without = EvalResponse { result: false, cost: None };
        assert_eq!(serde_json::to_string(&without).unwrap(), r#"{"result":false}"#);
    }

    #[test]
    fn test_cost_deterministic_across_calls() {
        let program =
            Program::compile("self.conds.filter(c, c.ok).size() == 1", &["self"]).unwrap();
        let doc = json!({"conds": [{"ok": true}, {"ok": false}]});
        let evaluator = Evaluator::metered();
        let first = evaluator.evaluate(&program, &[("self", &doc)]).unwrap();
        let second = evaluator.evaluate(&program, &[("self", &doc)]).unwrap();
        assert_eq!(first.cost, second.cost);
    }
}
