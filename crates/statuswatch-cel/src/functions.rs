//! Built-in function library
//!
//! Two static dispatch tables map function names to their arity range: one
//! for globals (`size(x)`, `timestamp(s)`) and one for receiver-style methods
//! (`s.contains('x')`). The static checker consults the tables to reject
//! unknown names and wrong arity at compile time; the interpreter dispatches
//! through [`call_global`] and [`call_method`] at evaluation time. String and
//! regex operations charge cost proportional to the data they scan.

use chrono::{DateTime, TimeDelta, Utc};
use phf::phf_map;
use regex::Regex;

use crate::eval::{CostTracker, ExecError, runtime};
use crate::value::Value;

/// Global functions, name to (min arity, max arity)
pub(crate) static GLOBALS: phf::Map<&'static str, (u8, u8)> = phf_map! {
    "size" => (1, 1),
    "abs" => (1, 1),
    "min" => (2, 8),
    "max" => (2, 8),
    "ceil" => (1, 1),
    "floor" => (1, 1),
    "round" => (1, 1),
    "int" => (1, 1),
    "double" => (1, 1),
    "string" => (1, 1),
    "duration" => (1, 1),
    "timestamp" => (1, 1),
    "matches" => (2, 2),
};

/// Receiver-style methods, name to (min arity, max arity)
pub(crate) static METHODS: phf::Map<&'static str, (u8, u8)> = phf_map! {
    "size" => (0, 0),
    "contains" => (1, 1),
    "startsWith" => (1, 1),
    "endsWith" => (1, 1),
    "matches" => (1, 1),
    "lowerAscii" => (0, 0),
    "upperAscii" => (0, 0),
    "trim" => (0, 0),
    "replace" => (2, 2),
    "split" => (1, 1),
    "join" => (0, 1),
    "intersects" => (1, 1),
    "isSubsetOf" => (1, 1),
};

pub(crate) fn call_global(
    name: &str,
    mut args: Vec<Value>,
    cost: &mut CostTracker,
) -> Result<Value, ExecError> {
    match name {
        "size" => size_of(&args[0], cost),
        "abs" => match &args[0] {
            Value::Int(i) => i
                .checked_abs()
                .map(Value::Int)
                .ok_or_else(|| runtime("integer overflow in abs()")),
            Value::UInt(u) => Ok(Value::UInt(*u)),
            Value::Double(d) => Ok(Value::Double(d.abs())),
            other => Err(arg_type_err("abs", "a number", other)),
        },
        "min" => fold_extremum(name, args, |o| o.is_lt()),
        "max" => fold_extremum(name, args, |o| o.is_gt()),
        "ceil" => rounding(name, &args[0], f64::ceil),
        "floor" => rounding(name, &args[0], f64::floor),
        "round" => rounding(name, &args[0], f64::round),
        "int" => convert_int(&args[0]),
        "double" => convert_double(&args[0]),
        "string" => convert_string(args.remove(0), cost),
        "duration" => match &args[0] {
            Value::String(s) => parse_duration(s),
            Value::Duration(_) => Ok(args.remove(0)),
            other => Err(arg_type_err("duration", "a string", other)),
        },
        "timestamp" => match &args[0] {
            Value::String(s) => parse_timestamp(s),
            Value::Timestamp(_) => Ok(args.remove(0)),
            other => Err(arg_type_err("timestamp", "a string", other)),
        },
        "matches" => match (&args[0], &args[1]) {
            (Value::String(s), Value::String(pattern)) => regex_match(s, pattern, cost),
            (other, _) => Err(arg_type_err("matches", "a string", other)),
        },
        // The checker rejects unknown names before execution
        _ => Err(runtime(format!("unknown function '{name}'"))),
    }
}

pub(crate) fn call_method(
    name: &str,
    receiver: Value,
    mut args: Vec<Value>,
    cost: &mut CostTracker,
) -> Result<Value, ExecError> {
    match name {
        "size" => size_of(&receiver, cost),
        "contains" => {
            let (s, needle) = str_pair(name, &receiver, &args[0])?;
            cost.charge(1 + s.len() as u64 / 8)?;
            Ok(Value::Bool(s.contains(needle)))
        }
        "startsWith" => {
            let (s, prefix) = str_pair(name, &receiver, &args[0])?;
            Ok(Value::Bool(s.starts_with(prefix)))
        }
        "endsWith" => {
            let (s, suffix) = str_pair(name, &receiver, &args[0])?;
            Ok(Value::Bool(s.ends_with(suffix)))
        }
        "matches" => {
            let (s, pattern) = str_pair(name, &receiver, &args[0])?;
            regex_match(s, pattern, cost)
        }
        "lowerAscii" => {
            let s = str_receiver(name, &receiver)?;
            cost.charge(1 + s.len() as u64 / 8)?;
            Ok(Value::String(s.to_ascii_lowercase()))
        }
        "upperAscii" => {
            let s = str_receiver(name, &receiver)?;
            cost.charge(1 + s.len() as u64 / 8)?;
            Ok(Value::String(s.to_ascii_uppercase()))
        }
        "trim" => {
            let s = str_receiver(name, &receiver)?;
            Ok(Value::String(s.trim().to_string()))
        }
        "replace" => {
            let (s, from) = str_pair(name, &receiver, &args[0])?;
            let Value::String(to) = &args[1] else {
                return Err(arg_type_err(name, "a string", &args[1]));
            };
            cost.charge(1 + s.len() as u64 / 8)?;
            Ok(Value::String(s.replace(from, to)))
        }
        "split" => {
            let (s, sep) = str_pair(name, &receiver, &args[0])?;
            cost.charge(1 + s.len() as u64 / 8)?;
            Ok(Value::List(
                s.split(sep)
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            ))
        }
        "join" => {
            let Value::List(items) = receiver else {
                return Err(arg_type_err(name, "a list", &receiver));
            };
            let sep = match args.pop() {
                None => String::new(),
                Some(Value::String(s)) => s,
                Some(other) => return Err(arg_type_err(name, "a string", &other)),
            };
            cost.charge(1 + items.len() as u64)?;
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => parts.push(s),
                    other => {
                        return Err(runtime(format!(
                            "join() requires a list of strings, found {}",
                            other.type_name()
                        )));
                    }
                }
            }
            Ok(Value::String(parts.join(&sep)))
        }
        "intersects" => {
            let (a, b) = list_pair(name, &receiver, &args[0])?;
            cost.charge((a.len() as u64 + 1) * (b.len() as u64 + 1) / 4)?;
            Ok(Value::Bool(
                a.iter().any(|x| b.iter().any(|y| x.equals(y))),
            ))
        }
        "isSubsetOf" => {
            let (a, b) = list_pair(name, &receiver, &args[0])?;
            cost.charge((a.len() as u64 + 1) * (b.len() as u64 + 1) / 4)?;
            Ok(Value::Bool(
                a.iter().all(|x| b.iter().any(|y| x.equals(y))),
            ))
        }
        _ => Err(runtime(format!("unknown method '{name}'"))),
    }
}

fn size_of(value: &Value, cost: &mut CostTracker) -> Result<Value, ExecError> {
    cost.charge(1)?;
    match value {
        Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::List(items) => Ok(Value::Int(items.len() as i64)),
        Value::Map(fields) => Ok(Value::Int(fields.len() as i64)),
        other => Err(arg_type_err("size", "a string, list, or map", other)),
    }
}

fn fold_extremum(
    name: &str,
    args: Vec<Value>,
    pick: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<Value, ExecError> {
    let mut args = args.into_iter();
    // Arity is checked before dispatch, at least two args are present
    let mut best = args.next().ok_or_else(|| runtime(format!("{name}() requires arguments")))?;
    for arg in args {
        let ordering = arg.try_cmp(&best).ok_or_else(|| {
            runtime(format!(
                "{name}() cannot compare {} and {}",
                arg.type_name(),
                best.type_name()
            ))
        })?;
        if pick(ordering) {
            best = arg;
        }
    }
    Ok(best)
}

fn rounding(name: &str, value: &Value, f: impl Fn(f64) -> f64) -> Result<Value, ExecError> {
    match value {
        Value::Double(d) => {
            let rounded = f(*d);
            if rounded < i64::MIN as f64 || rounded > i64::MAX as f64 {
                return Err(runtime(format!("{name}() result out of int range")));
            }
            Ok(Value::Int(rounded as i64))
        }
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::UInt(u) => i64::try_from(*u)
            .map(Value::Int)
            .map_err(|_| runtime(format!("{name}() result out of int range"))),
        other => Err(arg_type_err(name, "a number", other)),
    }
}

fn convert_int(value: &Value) -> Result<Value, ExecError> {
    match value {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::UInt(u) => i64::try_from(*u)
            .map(Value::Int)
            .map_err(|_| runtime("uint value out of int range")),
        Value::Double(d) => {
            if *d < i64::MIN as f64 || *d > i64::MAX as f64 || d.is_nan() {
                return Err(runtime("double value out of int range"));
            }
            Ok(Value::Int(*d as i64))
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| runtime(format!("cannot parse '{s}' as int"))),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        other => Err(arg_type_err("int", "a number, string, or bool", other)),
    }
}

fn convert_double(value: &Value) -> Result<Value, ExecError> {
    match value {
        Value::Double(d) => Ok(Value::Double(*d)),
        Value::Int(i) => Ok(Value::Double(*i as f64)),
        Value::UInt(u) => Ok(Value::Double(*u as f64)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| runtime(format!("cannot parse '{s}' as double"))),
        other => Err(arg_type_err("double", "a number or string", other)),
    }
}

fn convert_string(value: Value, cost: &mut CostTracker) -> Result<Value, ExecError> {
    cost.charge(value.weight())?;
    match value {
        Value::String(_) => Ok(value),
        Value::Int(i) => Ok(Value::String(i.to_string())),
        Value::UInt(u) => Ok(Value::String(u.to_string())),
        Value::Double(d) => Ok(Value::String(d.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        Value::Timestamp(t) => Ok(Value::String(t.to_rfc3339())),
        other => Err(arg_type_err("string", "a scalar", &other)),
    }
}

pub(crate) fn parse_duration(s: &str) -> Result<Value, ExecError> {
    let negative = s.starts_with('-');
    let body = s.strip_prefix('-').unwrap_or(s);
    let parsed = humantime::parse_duration(body)
        .map_err(|e| runtime(format!("invalid duration '{s}': {e}")))?;
    let delta = TimeDelta::from_std(parsed)
        .map_err(|_| runtime(format!("duration '{s}' out of range")))?;
    Ok(Value::Duration(if negative { -delta } else { delta }))
}

pub(crate) fn parse_timestamp(s: &str) -> Result<Value, ExecError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| Value::Timestamp(t.with_timezone(&Utc)))
        .map_err(|e| runtime(format!("invalid timestamp '{s}': {e}")))
}

fn regex_match(s: &str, pattern: &str, cost: &mut CostTracker) -> Result<Value, ExecError> {
    // Compilation plus a linear scan of the subject
    cost.charge(1 + pattern.len() as u64 + s.len() as u64 / 4)?;
    let re = Regex::new(pattern)
        .map_err(|e| runtime(format!("invalid regular expression '{pattern}': {e}")))?;
    Ok(Value::Bool(re.is_match(s)))
}

fn str_receiver<'a>(name: &str, receiver: &'a Value) -> Result<&'a str, ExecError> {
    match receiver {
        Value::String(s) => Ok(s),
        other => Err(arg_type_err(name, "a string", other)),
    }
}

fn str_pair<'a>(
    name: &str,
    receiver: &'a Value,
    arg: &'a Value,
) -> Result<(&'a str, &'a str), ExecError> {
    match (receiver, arg) {
        (Value::String(a), Value::String(b)) => Ok((a, b)),
        (Value::String(_), other) | (other, _) => Err(arg_type_err(name, "a string", other)),
    }
}

fn list_pair<'a>(
    name: &str,
    receiver: &'a Value,
    arg: &'a Value,
) -> Result<(&'a [Value], &'a [Value]), ExecError> {
    match (receiver, arg) {
        (Value::List(a), Value::List(b)) => Ok((a, b)),
        (Value::List(_), other) | (other, _) => Err(arg_type_err(name, "a list", other)),
    }
}

fn arg_type_err(name: &str, expected: &str, got: &Value) -> ExecError {
    runtime(format!(
        "{name}() requires {expected}, got {}",
        got.type_name()
    ))
}
