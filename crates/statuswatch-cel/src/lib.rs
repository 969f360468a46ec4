//! Sandboxed, cost-metered boolean expression engine.
//!
//! Implements the CEL subset used by health rules: literals, arithmetic,
//! comparisons, short-circuit logic, field selection, indexing, comprehension
//! macros (`all`, `exists`, `exists_one`, `filter`, `map`), the `has()`
//! presence test, and a string/list/temporal function library.
//!
//! Expressions compile once against a declared variable set and are cached;
//! evaluation walks the AST with no I/O, no clock access, and — under the
//! metered profile — a hard cost ceiling ([`PER_CALL_COST_LIMIT`]) that
//! aborts runaway expressions.
//!
//! ```
//! use statuswatch_cel::{Evaluator, cached_program};
//!
//! let doc = serde_json::json!({"status": {"phase": "Running"}});
//! let program = cached_program("self.status.phase == 'Running'", &["self"]).unwrap();
//! let response = Evaluator::metered().evaluate(&program, &[("self", &doc)]).unwrap();
//! assert!(response.result);
//! ```

mod ast;
mod cache;
mod check;
mod error;
mod eval;
mod functions;
mod parser;
mod program;
mod value;

pub use cache::cached_program;
pub use error::{CelError, Result};
pub use program::{EvalResponse, Evaluator, PER_CALL_COST_LIMIT, Program};
pub use value::Value;

/// Compiles (through the cache) and evaluates a single-variable expression
/// under the metered profile.
pub fn eval(
    expression: &str,
    variable: &str,
    document: &serde_json::Value,
) -> Result<EvalResponse> {
    let program = cached_program(expression, &[variable])?;
    Evaluator::metered().evaluate(&program, &[(variable, document)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_eval_shorthand() {
        let doc = json!({"status": {"conditions": [{"type": "Ready", "status": "True"}]}});
        let response = eval(
            "self.status.conditions.filter(c, c.type == 'Ready').all(c, c.status == 'True')",
            "self",
            &doc,
        )
        .unwrap();
        assert!(response.result);
        assert!(response.cost.is_some());
    }

    #[test]
    fn test_eval_shorthand_compile_error() {
        let doc = json!({});
        let err = eval("self.status ==", "self", &doc).unwrap_err();
        assert!(matches!(err, CelError::Compilation { .. }));
    }
}
