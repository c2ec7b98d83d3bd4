//! Owned syntax tree of a candidate program
//!
//! Produced by [`crate::parser`] from the tree-sitter parse. Constructs the
//! interpreter does not execute are kept as `Unsupported` nodes so the
//! validator can report them in source order alongside policy violations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 1-based line and column of a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Line, starting at 1
    pub line: usize,
    /// Column, starting at 1
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A whole program
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    /// Top-level statements in order
    pub body: Vec<Stmt>,
}

/// A statement with its location
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub at: Location,
}

/// Statement forms
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Expression evaluated for its effect
    Expr(Expression),
    /// `a = b = value`
    Assign {
        targets: Vec<Target>,
        value: Expression,
    },
    /// `target op= value`
    AugAssign {
        target: Target,
        op: BinOp,
        value: Expression,
    },
    /// `import a.b as c`
    Import {
        module: String,
        alias: Option<String>,
    },
    /// `from a import b as c, d` or `from a import *`
    ImportFrom {
        module: String,
        names: Vec<(String, Option<String>)>,
        star: bool,
    },
    /// `if` / `elif` chain with optional `else`
    If {
        branches: Vec<(Expression, Vec<Stmt>)>,
        orelse: Vec<Stmt>,
    },
    /// `for target in iter`
    For {
        target: Target,
        iter: Expression,
        body: Vec<Stmt>,
    },
    /// `while test`
    While { test: Expression, body: Vec<Stmt> },
    /// `def`
    FunctionDef(Arc<FunctionDef>),
    /// `return`
    Return(Option<Expression>),
    Break,
    Continue,
    Pass,
    /// Construct the sandbox does not execute
    Unsupported { construct: String },
}

/// Function definition shared by every closure created from it
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

/// Positional parameter with optional default
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expression>,
    pub at: Location,
}

/// Assignment target
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Bare name
    Name(String, Location),
    /// Tuple or list unpacking
    Unpack(Vec<Target>),
    /// `object[index] = …`
    Subscript {
        object: Box<Expression>,
        index: Box<Expression>,
    },
}

/// An expression with its location
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    pub at: Location,
}

/// Expression forms
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Integer, float or imaginary literal as written
    Number(String),
    Str(String),
    /// f-string pieces
    FString(Vec<FPart>),
    Bool(bool),
    None,
    Name(String),
    Attribute {
        object: Box<Expression>,
        name: String,
    },
    Subscript {
        object: Box<Expression>,
        index: Box<Expression>,
    },
    /// `lower:upper:step` inside a subscript
    Slice {
        lower: Option<Box<Expression>>,
        upper: Option<Box<Expression>>,
        step: Option<Box<Expression>>,
    },
    Call {
        func: Box<Expression>,
        args: Vec<Expression>,
        keywords: Vec<(String, Expression)>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Binary {
        op: BinOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// Short-circuit `and` / `or`
    Logical {
        and: bool,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// Chained comparison
    Compare {
        left: Box<Expression>,
        rest: Vec<(CmpOp, Expression)>,
    },
    /// `body if test else orelse`
    IfExp {
        body: Box<Expression>,
        test: Box<Expression>,
        orelse: Box<Expression>,
    },
    List(Vec<Expression>),
    Tuple(Vec<Expression>),
    Dict(Vec<(Expression, Expression)>),
    /// List comprehension or generator expression (evaluated eagerly)
    Comprehension {
        element: Box<Expression>,
        clauses: Vec<Clause>,
    },
    Lambda {
        params: Vec<Param>,
        body: Arc<Expression>,
    },
    /// Construct the sandbox does not execute
    Unsupported { construct: String },
}

/// Piece of an f-string
#[derive(Debug, Clone, PartialEq)]
pub enum FPart {
    Literal(String),
    Value {
        expr: Expression,
        spec: Option<String>,
    },
}

/// `for` or `if` clause of a comprehension
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    For { target: Target, iter: Expression },
    If(Expression),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    MatMul,
}

impl BinOp {
    /// Operator as written in source
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::MatMul => "@",
        }
    }

    /// Parse an operator token; augmented forms drop the trailing `=`
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token.trim_end_matches('=') {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "//" => Self::FloorDiv,
            "%" => Self::Mod,
            "**" => Self::Pow,
            "@" => Self::MatMul,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    /// Parse a comparison token
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "==" => Self::Eq,
            "!=" | "<>" => Self::NotEq,
            "<" => Self::Lt,
            "<=" => Self::LtE,
            ">" => Self::Gt,
            ">=" => Self::GtE,
            "in" => Self::In,
            "not in" => Self::NotIn,
            "is" => Self::Is,
            "is not" => Self::IsNot,
            _ => return None,
        })
    }
}

impl Target {
    /// Names bound by assigning to this target
    pub fn bound_names(&self, out: &mut Vec<(String, Location)>) {
        match self {
            Self::Name(name, at) => out.push((name.clone(), *at)),
            Self::Unpack(items) => {
                for item in items {
                    item.bound_names(out);
                }
            }
            Self::Subscript { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_tokens() {
        assert_eq!(BinOp::from_token("**="), Some(BinOp::Pow));
        assert_eq!(BinOp::from_token("//"), Some(BinOp::FloorDiv));
        assert_eq!(BinOp::from_token("<<"), None);
        assert_eq!(CmpOp::from_token("not in"), Some(CmpOp::NotIn));
        assert_eq!(BinOp::Mod.symbol(), "%");
    }

    #[test]
    fn unpack_binds_all_names() {
        let at = Location { line: 1, column: 1 };
        let target = Target::Unpack(vec![
            Target::Name("a".into(), at),
            Target::Unpack(vec![Target::Name("b".into(), at)]),
        ]);
        let mut names = Vec::new();
        target.bound_names(&mut names);
        let names: Vec<String> = names.into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
