//! AST for the CEL-subset expression language
//!
//! Produced by the parser, validated by the static checker, and walked by the
//! cost-metered interpreter. Comprehension macros (`all`, `exists`, `filter`,
//! ...) are desugared into a dedicated node at parse time so the interpreter
//! can meter each iteration.

use std::fmt;

/// A parsed expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// Variable reference
    Ident(String),
    /// List literal: `[1, 2, 3]`
    List(Vec<Expr>),
    /// Map literal: `{'a': 1}`
    Map(Vec<(Expr, Expr)>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `cond ? then : otherwise`
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// Field selection: `self.status`
    Field {
        target: Box<Expr>,
        name: String,
    },
    /// Indexing: `list[0]`, `map['key']`
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    /// Function or method call. `target` is `Some` for receiver-style calls
    /// (`s.contains('x')`) and `None` for globals (`size(s)`).
    Call {
        target: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
    },
    /// Comprehension macro over a list (or the keys of a map):
    /// `items.all(e, e.ready)`
    Comprehension {
        target: Box<Expr>,
        var: String,
        kind: ComprehensionKind,
        body: Box<Expr>,
    },
    /// Field presence test: `has(self.status)`
    Has(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `-`
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Membership: `x in list`, `key in map`
    In,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComprehensionKind {
    All,
    Exists,
    ExistsOne,
    Filter,
    Map,
}

impl ComprehensionKind {
    /// The macro name as written in expressions
    pub fn name(&self) -> &'static str {
        match self {
            ComprehensionKind::All => "all",
            ComprehensionKind::Exists => "exists",
            ComprehensionKind::ExistsOne => "exists_one",
            ComprehensionKind::Filter => "filter",
            ComprehensionKind::Map => "map",
        }
    }

    /// Maps a macro name to its kind, if the name is a comprehension macro
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "all" => Some(ComprehensionKind::All),
            "exists" => Some(ComprehensionKind::Exists),
            "exists_one" => Some(ComprehensionKind::ExistsOne),
            "filter" => Some(ComprehensionKind::Filter),
            "map" => Some(ComprehensionKind::Map),
            _ => None,
        }
    }
}

/// A literal value appearing in expression text
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    UInt(u64),
    Double(f64),
    String(String),
    Bool(bool),
    Null,
}

impl Literal {
    /// Kind name used by the homogeneous-aggregate-literal validation
    pub fn kind(&self) -> &'static str {
        match self {
            Literal::Int(_) => "int",
            Literal::UInt(_) => "uint",
            Literal::Double(_) => "double",
            Literal::String(_) => "string",
            Literal::Bool(_) => "bool",
            Literal::Null => "null",
        }
    }
}
