//! Cost-metered tree-walking interpreter
//!
//! Every AST node evaluation charges at least one abstract cost unit;
//! comprehension iterations and size-dependent operations charge
//! proportionally to the data they touch. When a cost limit is configured,
//! crossing it aborts the evaluation immediately with
//! [`ExecError::CostLimit`] — this is the defense against operator-authored
//! expressions consuming unbounded CPU. The accounting is purely structural,
//! so cost is deterministic for identical expression and input.

use indexmap::IndexMap;
use thiserror::Error;

use crate::ast::{BinaryOp, ComprehensionKind, Expr, Literal, UnaryOp};
use crate::functions;
use crate::value::Value;

/// Execution failure, before the expression text is attached
#[derive(Debug, Error)]
pub(crate) enum ExecError {
    #[error("expression cost limit exceeded: consumed {cost} of {limit} allowed units")]
    CostLimit { cost: u64, limit: u64 },

    #[error("no such key '{0}'")]
    NoSuchKey(String),

    #[error("{0}")]
    Runtime(String),
}

pub(crate) fn runtime(message: impl Into<String>) -> ExecError {
    ExecError::Runtime(message.into())
}

/// Tracks consumed cost units against an optional ceiling
#[derive(Debug)]
pub(crate) struct CostTracker {
    consumed: u64,
    limit: Option<u64>,
}

impl CostTracker {
    fn new(limit: Option<u64>) -> Self {
        Self { consumed: 0, limit }
    }

    pub(crate) fn charge(&mut self, units: u64) -> Result<(), ExecError> {
        self.consumed = self.consumed.saturating_add(units);
        if let Some(limit) = self.limit
            && self.consumed > limit
        {
            return Err(ExecError::CostLimit {
                cost: self.consumed,
                limit,
            });
        }
        Ok(())
    }

    fn consumed(&self) -> u64 {
        self.consumed
    }
}

#[cfg(test)]
impl CostTracker {
    pub(crate) fn for_tests() -> Self {
        Self::new(None)
    }
}

/// Executes a checked AST against an input environment.
///
/// Returns the resulting value and the total cost consumed.
pub(crate) fn execute(
    ast: &Expr,
    env: &IndexMap<String, Value>,
    cost_limit: Option<u64>,
) -> Result<(Value, u64), ExecError> {
    let mut interp = Interp {
        env,
        scopes: Vec::new(),
        cost: CostTracker::new(cost_limit),
    };
    let value = interp.eval(ast)?;
    Ok((value, interp.cost.consumed()))
}

struct Interp<'a> {
    env: &'a IndexMap<String, Value>,
    /// Comprehension loop variables, innermost last
    scopes: Vec<(String, Value)>,
    cost: CostTracker,
}

impl Interp<'_> {
    fn eval(&mut self, expr: &Expr) -> Result<Value, ExecError> {
        self.cost.charge(1)?;
        match expr {
            Expr::Literal(lit) => Ok(literal_value(lit)),
            Expr::Ident(name) => self.lookup(name),
            Expr::List(elements) => {
                self.cost.charge(elements.len() as u64)?;
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(self.eval(element)?);
                }
                Ok(Value::List(items))
            }
            Expr::Map(entries) => {
                self.cost.charge(entries.len() as u64)?;
                let mut fields = IndexMap::with_capacity(entries.len());
                for (key_expr, value_expr) in entries {
                    let key = match self.eval(key_expr)? {
                        Value::String(s) => s,
                        other => {
                            return Err(runtime(format!(
                                "map keys must be strings, got {}",
                                other.type_name()
                            )));
                        }
                    };
                    let value = self.eval(value_expr)?;
                    fields.insert(key, value);
                }
                Ok(Value::Map(fields))
            }
            Expr::Unary { op, expr } => self.eval_unary(*op, expr),
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs),
            Expr::Ternary { cond, then, otherwise } => {
                match self.eval(cond)? {
                    Value::Bool(true) => self.eval(then),
                    Value::Bool(false) => self.eval(otherwise),
                    other => Err(runtime(format!(
                        "ternary condition must be bool, got {}",
                        other.type_name()
                    ))),
                }
            }
            Expr::Field { target, name } => match self.eval(target)? {
                Value::Map(fields) => fields
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ExecError::NoSuchKey(name.clone())),
                Value::Null => Err(runtime(format!("cannot select field '{name}' from null"))),
                other => Err(runtime(format!(
                    "cannot select field '{name}' from {}",
                    other.type_name()
                ))),
            },
            Expr::Index { target, index } => self.eval_index(target, index),
            Expr::Call { target, name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                match target {
                    Some(receiver) => {
                        let receiver = self.eval(receiver)?;
                        functions::call_method(name, receiver, values, &mut self.cost)
                    }
                    None => functions::call_global(name, values, &mut self.cost),
                }
            }
            Expr::Comprehension { target, var, kind, body } => {
                self.eval_comprehension(target, var, *kind, body)
            }
            Expr::Has(inner) => self.eval_has(inner),
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, ExecError> {
        for (var, value) in self.scopes.iter().rev() {
            if var == name {
                return Ok(value.clone());
            }
        }
        self.env
            .get(name)
            .cloned()
            .ok_or_else(|| runtime(format!("undeclared reference to '{name}'")))
    }

    fn eval_unary(&mut self, op: UnaryOp, expr: &Expr) -> Result<Value, ExecError> {
        let value = self.eval(expr)?;
        match (op, value) {
            (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (UnaryOp::Neg, Value::Int(i)) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| runtime("integer overflow in negation")),
            (UnaryOp::Neg, Value::Double(d)) => Ok(Value::Double(-d)),
            (UnaryOp::Not, other) => Err(runtime(format!(
                "'!' requires bool, got {}",
                other.type_name()
            ))),
            (UnaryOp::Neg, other) => Err(runtime(format!(
                "'-' requires a number, got {}",
                other.type_name()
            ))),
        }
    }

    fn eval_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<Value, ExecError> {
        // Short-circuit logic first
        match op {
            BinaryOp::And => {
                return match self.eval_bool(lhs, "&&")? {
                    false => Ok(Value::Bool(false)),
                    true => Ok(Value::Bool(self.eval_bool(rhs, "&&")?)),
                };
            }
            BinaryOp::Or => {
                return match self.eval_bool(lhs, "||")? {
                    true => Ok(Value::Bool(true)),
                    false => Ok(Value::Bool(self.eval_bool(rhs, "||")?)),
                };
            }
            _ => {}
        }

        let lhs = self.eval(lhs)?;
        let rhs = self.eval(rhs)?;
        match op {
            BinaryOp::Eq | BinaryOp::Ne => {
                self.cost.charge(lhs.weight().min(rhs.weight()))?;
                let eq = lhs.equals(&rhs);
                Ok(Value::Bool(if op == BinaryOp::Eq { eq } else { !eq }))
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = lhs.try_cmp(&rhs).ok_or_else(|| {
                    runtime(format!(
                        "cannot compare {} and {}",
                        lhs.type_name(),
                        rhs.type_name()
                    ))
                })?;
                let result = match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                };
                Ok(Value::Bool(result))
            }
            BinaryOp::In => {
                self.cost.charge(rhs.weight())?;
                match rhs {
                    Value::List(items) => {
                        Ok(Value::Bool(items.iter().any(|item| item.equals(&lhs))))
                    }
                    Value::Map(fields) => match lhs {
                        Value::String(key) => Ok(Value::Bool(fields.contains_key(&key))),
                        _ => Ok(Value::Bool(false)),
                    },
                    other => Err(runtime(format!(
                        "'in' requires a list or map on the right, got {}",
                        other.type_name()
                    ))),
                }
            }
            _ => arith(op, lhs, rhs, &mut self.cost),
        }
    }

    fn eval_bool(&mut self, expr: &Expr, op: &str) -> Result<bool, ExecError> {
        match self.eval(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(runtime(format!(
                "'{op}' requires bool operands, got {}",
                other.type_name()
            ))),
        }
    }

    fn eval_index(&mut self, target: &Expr, index: &Expr) -> Result<Value, ExecError> {
        let target = self.eval(target)?;
        let index = self.eval(index)?;
        match (target, index) {
            (Value::List(items), index) => {
                let i = match index {
                    Value::Int(i) if i >= 0 => i as usize,
                    Value::UInt(u) => u as usize,
                    other => {
                        return Err(runtime(format!(
                            "list index must be a non-negative integer, got {}",
                            other.type_name()
                        )));
                    }
                };
                items.get(i).cloned().ok_or_else(|| {
                    runtime(format!("index {i} out of range (list has {} elements)", items.len()))
                })
            }
            (Value::Map(fields), Value::String(key)) => fields
                .get(&key)
                .cloned()
                .ok_or(ExecError::NoSuchKey(key)),
            (Value::Map(_), other) => Err(runtime(format!(
                "map index must be a string, got {}",
                other.type_name()
            ))),
            (other, _) => Err(runtime(format!(
                "cannot index into {}",
                other.type_name()
            ))),
        }
    }

    fn eval_comprehension(
        &mut self,
        target: &Expr,
        var: &str,
        kind: ComprehensionKind,
        body: &Expr,
    ) -> Result<Value, ExecError> {
        let items = match self.eval(target)? {
            Value::List(items) => items,
            // Map comprehensions range over the keys
            Value::Map(fields) => fields.into_keys().map(Value::String).collect(),
            other => {
                return Err(runtime(format!(
                    "{}() requires a list or map, got {}",
                    kind.name(),
                    other.type_name()
                )));
            }
        };

        match kind {
            ComprehensionKind::All => {
                for item in items {
                    self.cost.charge(1)?;
                    if !self.eval_predicate(var, item, body, kind)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            ComprehensionKind::Exists => {
                for item in items {
                    self.cost.charge(1)?;
                    if self.eval_predicate(var, item, body, kind)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            ComprehensionKind::ExistsOne => {
                let mut matched = 0u64;
                for item in items {
                    self.cost.charge(1)?;
                    if self.eval_predicate(var, item, body, kind)? {
                        matched += 1;
                    }
                }
                Ok(Value::Bool(matched == 1))
            }
            ComprehensionKind::Filter => {
                let mut kept = Vec::new();
                for item in items {
                    self.cost.charge(1)?;
                    if self.eval_predicate(var, item.clone(), body, kind)? {
                        kept.push(item);
                    }
                }
                Ok(Value::List(kept))
            }
            ComprehensionKind::Map => {
                let mut mapped = Vec::new();
                for item in items {
                    self.cost.charge(1)?;
                    mapped.push(self.eval_with(var, item, body)?);
                }
                Ok(Value::List(mapped))
            }
        }
    }

    fn eval_predicate(
        &mut self,
        var: &str,
        item: Value,
        body: &Expr,
        kind: ComprehensionKind,
    ) -> Result<bool, ExecError> {
        match self.eval_with(var, item, body)? {
            Value::Bool(b) => Ok(b),
            other => Err(runtime(format!(
                "{}() predicate must evaluate to bool, got {}",
                kind.name(),
                other.type_name()
            ))),
        }
    }

    fn eval_with(&mut self, var: &str, value: Value, body: &Expr) -> Result<Value, ExecError> {
        self.scopes.push((var.to_string(), value));
        let result = self.eval(body);
        self.scopes.pop();
        result
    }

    /// `has(a.b)`: true when the map `a` carries the key `b`. Missing keys
    /// anywhere along the selection chain yield false rather than an error,
    /// so operators can guard optional fields.
    fn eval_has(&mut self, inner: &Expr) -> Result<Value, ExecError> {
        let Expr::Field { target, name } = inner else {
            // The parser only builds Has over field selections
            return Err(runtime("has() requires a field selection"));
        };
        match self.eval(target) {
            Ok(Value::Map(fields)) => Ok(Value::Bool(fields.contains_key(name.as_str()))),
            Ok(Value::Null) => Ok(Value::Bool(false)),
            Ok(other) => Err(runtime(format!(
                "has() cannot test a field of {}",
                other.type_name()
            ))),
            Err(ExecError::NoSuchKey(_)) => Ok(Value::Bool(false)),
            Err(e) => Err(e),
        }
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Int(i) => Value::Int(*i),
        Literal::UInt(u) => Value::UInt(*u),
        Literal::Double(d) => Value::Double(*d),
        Literal::String(s) => Value::String(s.clone()),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}

fn arith(op: BinaryOp, lhs: Value, rhs: Value, cost: &mut CostTracker) -> Result<Value, ExecError> {
    use Value::*;

    match (op, lhs, rhs) {
        (BinaryOp::Add, String(a), String(b)) => {
            cost.charge(1 + (a.len() + b.len()) as u64 / 8)?;
            Ok(String(a + &b))
        }
        (BinaryOp::Add, List(mut a), List(b)) => {
            cost.charge(1 + (a.len() + b.len()) as u64)?;
            a.extend(b);
            Ok(List(a))
        }
        (BinaryOp::Add, Timestamp(t), Duration(d)) | (BinaryOp::Add, Duration(d), Timestamp(t)) => t
            .checked_add_signed(d)
            .map(Timestamp)
            .ok_or_else(|| runtime("timestamp overflow in addition")),
        (BinaryOp::Sub, Timestamp(t), Duration(d)) => t
            .checked_sub_signed(d)
            .map(Timestamp)
            .ok_or_else(|| runtime("timestamp overflow in subtraction")),
        (BinaryOp::Sub, Timestamp(a), Timestamp(b)) => Ok(Duration(a.signed_duration_since(b))),
        (BinaryOp::Add, Duration(a), Duration(b)) => a
            .checked_add(&b)
            .map(Duration)
            .ok_or_else(|| runtime("duration overflow in addition")),
        (BinaryOp::Sub, Duration(a), Duration(b)) => a
            .checked_sub(&b)
            .map(Duration)
            .ok_or_else(|| runtime("duration overflow in subtraction")),
        (op, lhs, rhs) => numeric_arith(op, lhs, rhs),
    }
}

fn numeric_arith(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, ExecError> {
    let overload_err = |lhs: &Value, rhs: &Value| {
        runtime(format!(
            "no such overload: {} {} {}",
            lhs.type_name(),
            op,
            rhs.type_name()
        ))
    };

    // Either operand being a double promotes the operation to doubles
    if matches!(lhs, Value::Double(_)) || matches!(rhs, Value::Double(_)) {
        let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) else {
            return Err(overload_err(&lhs, &rhs));
        };
        let result = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Mod => a % b,
            _ => return Err(overload_err(&lhs, &rhs)),
        };
        return Ok(Value::Double(result));
    }

    match (&lhs, &rhs) {
        (Value::UInt(a), Value::UInt(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div if b == 0 => return Err(runtime("division by zero")),
                BinaryOp::Div => a.checked_div(b),
                BinaryOp::Mod if b == 0 => return Err(runtime("modulo by zero")),
                BinaryOp::Mod => a.checked_rem(b),
                _ => return Err(overload_err(&lhs, &rhs)),
            };
            result
                .map(Value::UInt)
                .ok_or_else(|| runtime(format!("unsigned integer overflow in '{op}'")))
        }
        _ => {
            let a = int_operand(&lhs).ok_or_else(|| overload_err(&lhs, &rhs))?;
            let b = int_operand(&rhs).ok_or_else(|| overload_err(&lhs, &rhs))?;
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div if b == 0 => return Err(runtime("division by zero")),
                BinaryOp::Div => a.checked_div(b),
                BinaryOp::Mod if b == 0 => return Err(runtime("modulo by zero")),
                BinaryOp::Mod => a.checked_rem(b),
                _ => return Err(overload_err(&lhs, &rhs)),
            };
            result
                .map(Value::Int)
                .ok_or_else(|| runtime(format!("integer overflow in '{op}'")))
        }
    }
}

/// Accepts int directly and uint when it fits an i64
fn int_operand(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::UInt(u) => i64::try_from(*u).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use serde_json::json;

    fn env(pairs: &[(&str, serde_json::Value)]) -> IndexMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from_json(v)))
            .collect()
    }

    fn run(expr: &str, env: &IndexMap<String, Value>) -> Result<Value, ExecError> {
        let ast = parser::parse(expr).expect("expression should parse");
        execute(&ast, env, None).map(|(value, _)| value)
    }

    fn run_bool(expr: &str, vars: &[(&str, serde_json::Value)]) -> bool {
        match run(expr, &env(vars)) {
            Ok(Value::Bool(b)) => b,
            other => panic!("expected bool from '{expr}', got {other:?}"),
        }
    }

    #[test]
    fn test_arithmetic() {
        assert!(run_bool("1 + 2 * 3 == 7", &[]));
        assert!(run_bool("10 / 3 == 3", &[]));
        assert!(run_bool("10 % 3 == 1", &[]));
        assert!(run_bool("7.5 / 2.5 == 3.0", &[]));
        assert!(run_bool("2 + 0.5 == 2.5", &[]));
        assert!(run_bool("'a' + 'b' == 'ab'", &[]));
        assert!(run_bool("[1] + [2] == [1, 2]", &[]));
    }

    #[test]
    fn test_division_by_zero() {
        let err = run("1 / 0", &env(&[])).unwrap_err();
        assert!(err.to_string().contains("division by zero"));
        let err = run("1 % 0", &env(&[])).unwrap_err();
        assert!(err.to_string().contains("modulo by zero"));
    }

    #[test]
    fn test_integer_overflow() {
        let err = run("9223372036854775807 + 1", &env(&[])).unwrap_err();
        assert!(err.to_string().contains("overflow"));
    }

    #[test]
    fn test_comparisons() {
        assert!(run_bool("1 < 2", &[]));
        assert!(run_bool("2.5 >= 2", &[]));
        assert!(run_bool("'abc' < 'abd'", &[]));
        assert!(!run_bool("3 <= 2", &[]));
    }

    #[test]
    fn test_incomparable_types() {
        let err = run("'a' < 1", &env(&[])).unwrap_err();
        assert!(err.to_string().contains("cannot compare"));
    }

    #[test]
    fn test_logic_short_circuit() {
        // The rhs would fail at runtime; short-circuit must skip it
        assert!(!run_bool("false && (1 / 0 == 0)", &[]));
        assert!(run_bool("true || (1 / 0 == 0)", &[]));
    }

    #[test]
    fn test_logic_requires_bool() {
        let err = run("1 && true", &env(&[])).unwrap_err();
        assert!(err.to_string().contains("requires bool"));
    }

    #[test]
    fn test_ternary() {
        assert!(run_bool("2 > 1 ? true : false", &[]));
        assert!(!run_bool("2 < 1 ? true : false", &[]));
    }

    #[test]
    fn test_field_selection() {
        let vars = [("self", json!({"status": {"phase": "Running"}}))];
        assert!(run_bool("self.status.phase == 'Running'", &vars));
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let vars = env(&[("self", json!({"spec": {}}))]);
        let err = run("self.status.phase == 'Running'", &vars).unwrap_err();
        assert!(err.to_string().contains("no such key 'status'"));
    }

    #[test]
    fn test_field_on_null() {
        let vars = env(&[("self", json!({"status": null}))]);
        let err = run("self.status.phase", &vars).unwrap_err();
        assert!(err.to_string().contains("null"));
    }

    #[test]
    fn test_indexing() {
        let vars = [("items", json!(["a", "b"])), ("meta", json!({"k": 1}))];
        assert!(run_bool("items[1] == 'b'", &vars));
        assert!(run_bool("meta['k'] == 1", &vars));

        let err = run("items[5]", &env(&vars)).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_in_operator() {
        let vars = [("kinds", json!(["Deployment", "Job"])), ("m", json!({"a": 1}))];
        assert!(run_bool("'Job' in kinds", &vars));
        assert!(!run_bool("'Pod' in kinds", &vars));
        assert!(run_bool("'a' in m", &vars));
        assert!(!run_bool("'b' in m", &vars));
    }

    #[test]
    fn test_all_macro() {
        let vars = [("nums", json!([2, 4, 6]))];
        assert!(run_bool("nums.all(n, n % 2 == 0)", &vars));
        assert!(!run_bool("nums.all(n, n > 2)", &vars));
    }

    #[test]
    fn test_all_vacuously_true_on_empty_list() {
        let vars = [("nums", json!([]))];
        assert!(run_bool("nums.all(n, n > 100)", &vars));
    }

    #[test]
    fn test_exists_macros() {
        let vars = [("nums", json!([1, 2, 3]))];
        assert!(run_bool("nums.exists(n, n == 2)", &vars));
        assert!(!run_bool("nums.exists(n, n == 9)", &vars));
        assert!(run_bool("nums.exists_one(n, n == 2)", &vars));
        assert!(!run_bool("nums.exists_one(n, n > 1)", &vars));
    }

    #[test]
    fn test_filter_macro() {
        let vars = [("conds", json!([
            {"type": "Ready", "status": "True"},
            {"type": "Synced", "status": "False"},
        ]))];
        assert!(run_bool(
            "conds.filter(c, c.type == 'Ready').all(c, c.status == 'True')",
            &vars
        ));
        assert!(run_bool("conds.filter(c, c.type == 'Gone') == []", &vars));
    }

    #[test]
    fn test_map_macro() {
        let vars = [("nums", json!([1, 2]))];
        assert!(run_bool("nums.map(n, n * 10) == [10, 20]", &vars));
    }

    #[test]
    fn test_comprehension_over_map_keys() {
        let vars = [("labels", json!({"app": "web", "tier": "front"}))];
        assert!(run_bool("labels.all(k, k.size() >= 3)", &vars));
        assert!(run_bool("labels.exists(k, k == 'tier')", &vars));
    }

    #[test]
    fn test_nested_comprehension_scoping() {
        let vars = [("xs", json!([1, 2])), ("ys", json!([3, 4]))];
        assert!(run_bool("xs.all(x, ys.all(y, y > x))", &vars));
    }

    #[test]
    fn test_predicate_must_be_bool() {
        let vars = env(&[("nums", json!([1]))]);
        let err = run("nums.all(n, n + 1)", &vars).unwrap_err();
        assert!(err.to_string().contains("must evaluate to bool"));
    }

    #[test]
    fn test_has() {
        let vars = [("self", json!({"status": {"phase": "Running"}}))];
        assert!(run_bool("has(self.status)", &vars));
        assert!(run_bool("has(self.status.phase)", &vars));
        assert!(!run_bool("has(self.spec)", &vars));
        // Missing intermediate keys also yield false, not an error
        assert!(!run_bool("has(self.spec.replicas)", &vars));
    }

    #[test]
    fn test_has_on_explicit_null() {
        let vars = [("self", json!({"status": null}))];
        assert!(run_bool("has(self.status)", &vars));
        assert!(!run_bool("has(self.status.phase)", &vars));
    }

    #[test]
    fn test_cost_limit_aborts() {
        let items: Vec<i64> = (0..100).collect();
        let vars = env(&[("items", json!(items))]);
        let ast = parser::parse("items.all(a, items.all(b, a + b >= 0))").unwrap();

        let err = execute(&ast, &vars, Some(1_000)).unwrap_err();
        let ExecError::CostLimit { cost, limit } = err else {
            panic!("expected cost limit error, got {err:?}");
        };
        assert_eq!(limit, 1_000);
        assert!(cost > 1_000);
    }

    #[test]
    fn test_cost_is_deterministic() {
        let vars = env(&[("items", json!([1, 2, 3, 4, 5]))]);
        let ast = parser::parse("items.filter(i, i % 2 == 1).size() == 3").unwrap();

        let (_, first) = execute(&ast, &vars, None).unwrap();
        let (_, second) = execute(&ast, &vars, None).unwrap();
        assert_eq!(first, second);
        assert!(first > 0);
    }

    #[test]
    fn test_unary_operators() {
        assert!(run_bool("!false", &[]));
        assert!(run_bool("-3 < 0", &[]));
        assert!(run_bool("!!true", &[]));
    }

    #[test]
    fn test_map_literal_keys_must_be_strings() {
        let err = run("{1: 'a'}", &env(&[])).unwrap_err();
        assert!(err.to_string().contains("keys must be strings"));
    }
}
