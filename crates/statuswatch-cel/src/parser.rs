//! CEL-subset expression parser
//!
//! Parses expression text into an AST using pest. Comprehension macros
//! (`all`, `exists`, `exists_one`, `filter`, `map`) and the `has()` presence
//! test are recognized here so that malformed macro calls fail at compile
//! time rather than at execution time.

use pest::Parser;
use pest::iterators::{Pair, Pairs};
use pest_derive::Parser;
use thiserror::Error;

use crate::ast::*;

#[derive(Parser)]
#[grammar = "cel.pest"]
struct CelParser;

/// Deepest expression nesting accepted. Both the grammar and the AST passes
/// (build, check, evaluate) recurse per nesting level, so unbounded depth in
/// a hostile expression would overflow the stack instead of erroring.
const MAX_NESTING_DEPTH: usize = 200;

/// Parser error
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{0}")]
    Pest(Box<pest::error::Error<Rule>>),

    #[error("expression nesting depth {depth} exceeds the limit of {limit}")]
    TooDeep { depth: usize, limit: usize },

    #[error("invalid number: {0}")]
    InvalidNumber(String),

    #[error("invalid string literal: {0}")]
    InvalidString(String),

    #[error("invalid macro call: {0}")]
    InvalidMacro(String),

    #[error("malformed expression tree at rule {0:?}")]
    MalformedTree(Rule),
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(e: pest::error::Error<Rule>) -> Self {
        ParseError::Pest(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Parse an expression string into an AST
pub fn parse(input: &str) -> Result<Expr> {
    let depth = nesting_depth(input);
    if depth > MAX_NESTING_DEPTH {
        return Err(ParseError::TooDeep {
            depth,
            limit: MAX_NESTING_DEPTH,
        });
    }

    let mut pairs = CelParser::parse(Rule::program, input)?;
    let program = next_pair(&mut pairs, Rule::program)?;
    let mut inner = program.into_inner();
    let expression = next_pair(&mut inner, Rule::expression)?;
    parse_expression(expression)
}

/// Bounds expression depth with a linear scan of the raw text, before any
/// recursive pass touches it. Every nesting construct opens with a bracket
/// except the ternary, whose else-branch nests one level per `?`; counting
/// the maximum open-bracket depth plus the ternary count over-approximates
/// the real depth, which is all the limit needs.
fn nesting_depth(input: &str) -> usize {
    let mut depth = 0usize;
    let mut max_depth = 0usize;
    let mut ternaries = 0usize;
    let mut quote: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => match c {
                '\\' => {
                    chars.next();
                }
                c if c == q => quote = None,
                _ => {}
            },
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' | '[' | '{' => {
                    depth += 1;
                    max_depth = max_depth.max(depth);
                }
                ')' | ']' | '}' => depth = depth.saturating_sub(1),
                '?' => ternaries += 1,
                _ => {}
            },
        }
    }
    max_depth + ternaries
}

fn next_pair<'a>(pairs: &mut Pairs<'a, Rule>, context: Rule) -> Result<Pair<'a, Rule>> {
    pairs.next().ok_or(ParseError::MalformedTree(context))
}

fn parse_expression(pair: Pair<Rule>) -> Result<Expr> {
    let mut inner = pair.into_inner();
    let cond = parse_or(next_pair(&mut inner, Rule::expression)?)?;

    match (inner.next(), inner.next()) {
        (Some(then), Some(otherwise)) => Ok(Expr::Ternary {
            cond: Box::new(cond),
            then: Box::new(parse_or(then)?),
            otherwise: Box::new(parse_expression(otherwise)?),
        }),
        _ => Ok(cond),
    }
}

fn parse_or(pair: Pair<Rule>) -> Result<Expr> {
    let mut inner = pair.into_inner();
    let mut expr = parse_and(next_pair(&mut inner, Rule::or_expr)?)?;
    while inner.next().is_some() {
        let rhs = parse_and(next_pair(&mut inner, Rule::or_expr)?)?;
        expr = binary(BinaryOp::Or, expr, rhs);
    }
    Ok(expr)
}

fn parse_and(pair: Pair<Rule>) -> Result<Expr> {
    let mut inner = pair.into_inner();
    let mut expr = parse_rel(next_pair(&mut inner, Rule::and_expr)?)?;
    while inner.next().is_some() {
        let rhs = parse_rel(next_pair(&mut inner, Rule::and_expr)?)?;
        expr = binary(BinaryOp::And, expr, rhs);
    }
    Ok(expr)
}

fn parse_rel(pair: Pair<Rule>) -> Result<Expr> {
    let mut inner = pair.into_inner();
    let expr = parse_add(next_pair(&mut inner, Rule::rel_expr)?)?;
    // The grammar allows at most one relation per level
    let Some(op_pair) = inner.next() else {
        return Ok(expr);
    };
    let op = match op_pair.as_str() {
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        "<=" => BinaryOp::Le,
        ">=" => BinaryOp::Ge,
        "<" => BinaryOp::Lt,
        ">" => BinaryOp::Gt,
        "in" => BinaryOp::In,
        _ => return Err(ParseError::MalformedTree(Rule::rel_op)),
    };
    let rhs = parse_add(next_pair(&mut inner, Rule::rel_expr)?)?;
    Ok(binary(op, expr, rhs))
}

fn parse_add(pair: Pair<Rule>) -> Result<Expr> {
    let mut inner = pair.into_inner();
    let mut expr = parse_mul(next_pair(&mut inner, Rule::add_expr)?)?;
    while let Some(op_pair) = inner.next() {
        let op = match op_pair.as_str() {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            _ => return Err(ParseError::MalformedTree(Rule::add_op)),
        };
        let rhs = parse_mul(next_pair(&mut inner, Rule::add_expr)?)?;
        expr = binary(op, expr, rhs);
    }
    Ok(expr)
}

fn parse_mul(pair: Pair<Rule>) -> Result<Expr> {
    let mut inner = pair.into_inner();
    let mut expr = parse_unary(next_pair(&mut inner, Rule::mul_expr)?)?;
    while let Some(op_pair) = inner.next() {
        let op = match op_pair.as_str() {
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            _ => return Err(ParseError::MalformedTree(Rule::mul_op)),
        };
        let rhs = parse_unary(next_pair(&mut inner, Rule::mul_expr)?)?;
        expr = binary(op, expr, rhs);
    }
    Ok(expr)
}

fn parse_unary(pair: Pair<Rule>) -> Result<Expr> {
    let mut ops = Vec::new();
    let mut member = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::unary_op => ops.push(match inner.as_str() {
                "!" => UnaryOp::Not,
                _ => UnaryOp::Neg,
            }),
            Rule::member_expr => member = Some(parse_member(inner)?),
            rule => return Err(ParseError::MalformedTree(rule)),
        }
    }

    let mut expr = member.ok_or(ParseError::MalformedTree(Rule::unary_expr))?;
    for op in ops.into_iter().rev() {
        expr = Expr::Unary {
            op,
            expr: Box::new(expr),
        };
    }
    Ok(expr)
}

fn parse_member(pair: Pair<Rule>) -> Result<Expr> {
    let mut inner = pair.into_inner();
    let mut expr = parse_primary(next_pair(&mut inner, Rule::member_expr)?)?;

    for postfix in inner {
        let suffix = postfix
            .into_inner()
            .next()
            .ok_or(ParseError::MalformedTree(Rule::postfix))?;
        expr = match suffix.as_rule() {
            Rule::field_suffix => {
                let mut parts = suffix.into_inner();
                let name = next_pair(&mut parts, Rule::field_suffix)?.as_str().to_string();
                Expr::Field {
                    target: Box::new(expr),
                    name,
                }
            }
            Rule::index_suffix => {
                let mut parts = suffix.into_inner();
                let index = parse_expression(next_pair(&mut parts, Rule::index_suffix)?)?;
                Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                }
            }
            Rule::call_suffix => {
                let mut parts = suffix.into_inner();
                let name = next_pair(&mut parts, Rule::call_suffix)?.as_str().to_string();
                let args = match parts.next() {
                    Some(list) => parse_arg_list(list)?,
                    None => Vec::new(),
                };
                build_method_call(expr, name, args)?
            }
            rule => return Err(ParseError::MalformedTree(rule)),
        };
    }
    Ok(expr)
}

/// Turns a receiver-style call into either a comprehension node (for the
/// macro names) or a plain method call.
fn build_method_call(target: Expr, name: String, mut args: Vec<Expr>) -> Result<Expr> {
    let Some(kind) = ComprehensionKind::from_name(&name) else {
        return Ok(Expr::Call {
            target: Some(Box::new(target)),
            name,
            args,
        });
    };

    if args.len() != 2 {
        return Err(ParseError::InvalidMacro(format!(
            "{name}() takes a loop variable and an expression, e.g. x.{name}(e, ...)"
        )));
    }
    let body = args.pop().unwrap_or(Expr::Literal(Literal::Null));
    let var = match args.pop() {
        Some(Expr::Ident(var)) => var,
        _ => {
            return Err(ParseError::InvalidMacro(format!(
                "the first argument to {name}() must be a simple identifier"
            )));
        }
    };

    Ok(Expr::Comprehension {
        target: Box::new(target),
        var,
        kind,
        body: Box::new(body),
    })
}

fn parse_primary(pair: Pair<Rule>) -> Result<Expr> {
    let mut inner = pair.into_inner();
    let node = next_pair(&mut inner, Rule::primary)?;

    match node.as_rule() {
        Rule::literal => Ok(Expr::Literal(parse_literal(node)?)),
        Rule::ident => Ok(Expr::Ident(node.as_str().to_string())),
        Rule::paren_expr => {
            let mut parts = node.into_inner();
            parse_expression(next_pair(&mut parts, Rule::paren_expr)?)
        }
        Rule::func_call => {
            let mut parts = node.into_inner();
            let name = next_pair(&mut parts, Rule::func_call)?.as_str().to_string();
            let args = match parts.next() {
                Some(list) => parse_arg_list(list)?,
                None => Vec::new(),
            };
            build_global_call(name, args)
        }
        Rule::list_lit => {
            let mut elements = Vec::new();
            for element in node.into_inner() {
                elements.push(parse_expression(element)?);
            }
            Ok(Expr::List(elements))
        }
        Rule::map_lit => {
            let mut entries = Vec::new();
            for entry in node.into_inner() {
                let mut parts = entry.into_inner();
                let key = parse_expression(next_pair(&mut parts, Rule::map_entry)?)?;
                let value = parse_expression(next_pair(&mut parts, Rule::map_entry)?)?;
                entries.push((key, value));
            }
            Ok(Expr::Map(entries))
        }
        rule => Err(ParseError::MalformedTree(rule)),
    }
}

fn build_global_call(name: String, mut args: Vec<Expr>) -> Result<Expr> {
    if name == "has" {
        if args.len() != 1 {
            return Err(ParseError::InvalidMacro(
                "has() requires exactly one argument".to_string(),
            ));
        }
        let arg = args.pop().unwrap_or(Expr::Literal(Literal::Null));
        if !matches!(arg, Expr::Field { .. }) {
            return Err(ParseError::InvalidMacro(
                "the argument to has() must be a field selection, e.g. has(self.status)".to_string(),
            ));
        }
        return Ok(Expr::Has(Box::new(arg)));
    }

    if ComprehensionKind::from_name(&name).is_some() {
        return Err(ParseError::InvalidMacro(format!(
            "{name}() must be called as a method on a list or map"
        )));
    }

    Ok(Expr::Call {
        target: None,
        name,
        args,
    })
}

fn parse_arg_list(pair: Pair<Rule>) -> Result<Vec<Expr>> {
    let mut args = Vec::new();
    for arg in pair.into_inner() {
        args.push(parse_expression(arg)?);
    }
    Ok(args)
}

fn parse_literal(pair: Pair<Rule>) -> Result<Literal> {
    let mut inner = pair.into_inner();
    let node = next_pair(&mut inner, Rule::literal)?;
    let text = node.as_str();

    match node.as_rule() {
        Rule::float_lit => text
            .parse::<f64>()
            .map(Literal::Double)
            .map_err(|_| ParseError::InvalidNumber(text.to_string())),
        Rule::uint_lit => text[..text.len() - 1]
            .parse::<u64>()
            .map(Literal::UInt)
            .map_err(|_| ParseError::InvalidNumber(text.to_string())),
        Rule::int_lit => text
            .parse::<i64>()
            .map(Literal::Int)
            .map_err(|_| ParseError::InvalidNumber(text.to_string())),
        Rule::string_lit => Ok(Literal::String(unescape(&text[1..text.len() - 1])?)),
        Rule::bool_lit => Ok(Literal::Bool(text == "true")),
        Rule::null_lit => Ok(Literal::Null),
        rule => Err(ParseError::MalformedTree(rule)),
    }
}

fn unescape(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some(other) => {
                return Err(ParseError::InvalidString(format!(
                    "unsupported escape sequence '\\{other}'"
                )));
            }
            None => {
                return Err(ParseError::InvalidString(
                    "trailing backslash".to_string(),
                ));
            }
        }
    }
    Ok(out)
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Expr {
        Expr::Ident(name.to_string())
    }

    #[test]
    fn test_parse_comparison() {
        let expr = parse("replicas >= 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Ge,
                lhs: Box::new(ident("replicas")),
                rhs: Box::new(Expr::Literal(Literal::Int(3))),
            }
        );
    }

    #[test]
    fn test_parse_field_chain() {
        let expr = parse("self.status.phase").unwrap();
        assert_eq!(
            expr,
            Expr::Field {
                target: Box::new(Expr::Field {
                    target: Box::new(ident("self")),
                    name: "status".to_string(),
                }),
                name: "phase".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let expr = parse("1 + 2 * 3").unwrap();
        let Expr::Binary { op: BinaryOp::Add, rhs, .. } = expr else {
            panic!("expected addition at the top");
        };
        assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_parse_logical_precedence() {
        // a || b && c parses as a || (b && c)
        let expr = parse("a || b && c").unwrap();
        let Expr::Binary { op: BinaryOp::Or, rhs, .. } = expr else {
            panic!("expected || at the top");
        };
        assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn test_parse_ternary() {
        let expr = parse("ready ? a : b").unwrap();
        assert!(matches!(expr, Expr::Ternary { .. }));
    }

    #[test]
    fn test_parse_filter_all_chain() {
        let expr =
            parse("self.status.conditions.filter(e, e.type == 'Ready').all(e, e.status == 'True')")
                .unwrap();
        let Expr::Comprehension { kind: ComprehensionKind::All, target, var, .. } = expr else {
            panic!("expected all() at the top");
        };
        assert_eq!(var, "e");
        assert!(matches!(
            *target,
            Expr::Comprehension { kind: ComprehensionKind::Filter, .. }
        ));
    }

    #[test]
    fn test_parse_has() {
        let expr = parse("has(self.status)").unwrap();
        assert!(matches!(expr, Expr::Has(_)));
    }

    #[test]
    fn test_has_requires_field_selection() {
        let err = parse("has(self)").unwrap_err();
        assert!(err.to_string().contains("field selection"));
    }

    #[test]
    fn test_macro_requires_identifier_variable() {
        let err = parse("items.all(1 + 1, true)").unwrap_err();
        assert!(err.to_string().contains("simple identifier"));
    }

    #[test]
    fn test_macro_requires_two_arguments() {
        let err = parse("items.all(e)").unwrap_err();
        assert!(err.to_string().contains("loop variable"));
    }

    #[test]
    fn test_macro_not_global() {
        let err = parse("filter(items, e)").unwrap_err();
        assert!(err.to_string().contains("method"));
    }

    #[test]
    fn test_parse_in_operator() {
        let expr = parse("'Ready' in kinds").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::In, .. }));
    }

    #[test]
    fn test_in_does_not_swallow_identifiers() {
        // `index` starts with "in" but must parse as one identifier
        let expr = parse("index > 0").unwrap();
        assert!(matches!(
            expr,
            Expr::Binary { op: BinaryOp::Gt, .. }
        ));
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse("5").unwrap(), Expr::Literal(Literal::Int(5)));
        assert_eq!(parse("5u").unwrap(), Expr::Literal(Literal::UInt(5)));
        assert_eq!(parse("5.5").unwrap(), Expr::Literal(Literal::Double(5.5)));
        assert_eq!(parse("true").unwrap(), Expr::Literal(Literal::Bool(true)));
        assert_eq!(parse("null").unwrap(), Expr::Literal(Literal::Null));
        assert_eq!(
            parse("'it\\'s'").unwrap(),
            Expr::Literal(Literal::String("it's".to_string()))
        );
        assert_eq!(
            parse("\"quoted\"").unwrap(),
            Expr::Literal(Literal::String("quoted".to_string()))
        );
    }

    #[test]
    fn test_parse_unary() {
        let expr = parse("!ready").unwrap();
        assert!(matches!(expr, Expr::Unary { op: UnaryOp::Not, .. }));
        let expr = parse("-x").unwrap();
        assert!(matches!(expr, Expr::Unary { op: UnaryOp::Neg, .. }));
    }

    #[test]
    fn test_parse_list_and_map_literals() {
        let expr = parse("[1, 2, 3]").unwrap();
        assert!(matches!(expr, Expr::List(ref e) if e.len() == 3));
        let expr = parse("{'a': 1, 'b': 2}").unwrap();
        assert!(matches!(expr, Expr::Map(ref e) if e.len() == 2));
    }

    #[test]
    fn test_parse_index() {
        let expr = parse("conditions[0]").unwrap();
        assert!(matches!(expr, Expr::Index { .. }));
    }

    #[test]
    fn test_parse_method_call() {
        let expr = parse("name.startsWith('prod-')").unwrap();
        let Expr::Call { target: Some(_), name, args } = expr else {
            panic!("expected method call");
        };
        assert_eq!(name, "startsWith");
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("(a > 1").is_err());
        assert!(parse("a >").is_err());
        assert!(parse("a b").is_err());
    }

    #[test]
    fn test_relations_are_non_associative() {
        assert!(parse("1 < 2 < 3").is_err());
        assert!(parse("a == b == c").is_err());
        assert!(parse("a in b in c").is_err());
        // Parenthesized and conjoined forms stay valid
        assert!(parse("(1 < 2) == true").is_ok());
        assert!(parse("1 < 2 && 2 < 3").is_ok());
    }

    #[test]
    fn test_deep_nesting_rejected_not_overflowed() {
        // Must come back as an error; recursing into it would blow the stack
        let expr = format!("{}true{}", "(".repeat(5_000), ")".repeat(5_000));
        let err = parse(&expr).unwrap_err();
        assert!(matches!(err, ParseError::TooDeep { depth: 5_000, .. }));

        let unclosed = "[".repeat(5_000);
        assert!(matches!(
            parse(&unclosed).unwrap_err(),
            ParseError::TooDeep { .. }
        ));
    }

    #[test]
    fn test_deep_ternary_chain_rejected() {
        let expr = format!("{}false", "true ? true : ".repeat(5_000));
        assert!(matches!(
            parse(&expr).unwrap_err(),
            ParseError::TooDeep { .. }
        ));
    }

    #[test]
    fn test_reasonable_nesting_accepted() {
        let expr = format!("{}1 + 1 == 2{}", "(".repeat(50), ")".repeat(50));
        assert!(parse(&expr).is_ok());
    }

    #[test]
    fn test_brackets_in_strings_do_not_count_as_nesting() {
        let literal = format!("'{}'", "(".repeat(1_000));
        let expr = format!("x == {literal}");
        assert!(parse(&expr).is_ok());

        let escaped = format!("x == '{}\\''", "[".repeat(1_000));
        assert!(parse(&escaped).is_ok());
    }

    #[test]
    fn test_unsupported_escape() {
        let err = parse("'bad\\q'").unwrap_err();
        assert!(err.to_string().contains("escape"));
    }
}
