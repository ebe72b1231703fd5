//! Program AST produced by the parser
//!
//! A program is a header (declared inputs and the output format) plus a
//! single body expression. Nodes that can fail at evaluation time carry the
//! source [`Position`] they were parsed at, so runtime errors point back
//! into the script.

use crate::error::Position;
use crate::format::{Format, FormatOptions};
use crate::udm::Udm;
use smallvec::SmallVec;
use std::rc::Rc;

/// A parsed transformation program
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub header: Header,
    pub body: Expr,
}

/// The script header: version directive, input declarations, output format
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// Language version from the `%utlx` directive, e.g. "1.0"
    pub version: String,
    pub inputs: Vec<InputDecl>,
    pub output: OutputDecl,
}

/// One declared input: `input name format [{ options }]`
#[derive(Debug, Clone, PartialEq)]
pub struct InputDecl {
    pub name: String,
    pub format: Format,
    pub options: FormatOptions,
    pub position: Position,
}

/// The declared output: `output format [{ options }]`
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDecl {
    pub format: Format,
    pub options: FormatOptions,
    pub position: Position,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation `-`
    Neg,
    /// Boolean negation `!`
    Not,
}

/// Binary operators, loosest first in the precedence table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Coalesce,
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl BinaryOp {
    /// The operator's surface syntax, used in error messages
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Coalesce => "??",
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
        }
    }
}

/// One element of an array literal
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayItem {
    Item(Expr),
    /// `...expr` — elements of the operand array are inlined in order
    Spread(Expr, Position),
}

/// One member of an object literal
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectItem {
    /// `key: value` with a static identifier or string key
    Field { key: String, value: Expr },
    /// `...expr` — entries of the operand object are merged in
    Spread(Expr, Position),
    /// `let name = expr;` visible to the remainder of the literal
    Let { name: String, value: Expr },
}

/// A `match` arm: pattern, optional guard, result expression
#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Expr,
}

/// Patterns accepted in match arms
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// A literal scalar, compared by equality
    Literal(Udm),
    /// `_` matches anything without binding
    Wildcard,
    /// An identifier binds the subject for the arm's guard and body
    Binding(String),
}

/// The target of a call expression
#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// A bare name: a lambda binding in scope, else a stdlib function
    Named(String),
    /// Any expression evaluating to a lambda, e.g. `(x => x)(1)`
    Expr(Box<Expr>),
}

/// Expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value lifted straight from the source
    Literal(Udm),
    /// `$name` — reference to a declared input
    InputRef { name: String, position: Position },
    /// A bare identifier resolved against the environment
    Identifier { name: String, position: Position },
    /// `target.key`
    Property {
        target: Box<Expr>,
        key: String,
        position: Position,
    },
    /// `target.@name` — attribute side-channel access
    Attribute {
        target: Box<Expr>,
        name: String,
        position: Position,
    },
    /// `target[index]`
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
        position: Position,
    },
    /// `target.__metadata` — the dedicated metadata accessor
    MetadataAccess { target: Box<Expr> },
    /// `target?.key` — yields null instead of erroring
    SafeNav { target: Box<Expr>, key: String },
    ArrayLit(Vec<ArrayItem>),
    ObjectLit(Vec<ObjectItem>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        position: Position,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        position: Position,
    },
    /// `if (c) t else e` and the ternary `c ? t : e` share this node
    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Match {
        subject: Box<Expr>,
        arms: Vec<MatchArm>,
        position: Position,
    },
    /// `let name = value` scoped over `body`
    Let {
        name: String,
        value: Box<Expr>,
        body: Box<Expr>,
    },
    /// `(params) => body`
    Lambda {
        params: SmallVec<[String; 4]>,
        body: Rc<Expr>,
    },
    Call {
        callee: Callee,
        args: Vec<Expr>,
        position: Position,
    },
    /// `left |> right` where `right` is a call or lambda reference
    Pipe {
        left: Box<Expr>,
        right: Box<Expr>,
        position: Position,
    },
}

impl Expr {
    /// Best-effort source position for error reporting
    pub fn position(&self) -> Position {
        match self {
            Expr::InputRef { position, .. }
            | Expr::Identifier { position, .. }
            | Expr::Property { position, .. }
            | Expr::Attribute { position, .. }
            | Expr::Index { position, .. }
            | Expr::Unary { position, .. }
            | Expr::Binary { position, .. }
            | Expr::Match { position, .. }
            | Expr::Call { position, .. }
            | Expr::Pipe { position, .. } => *position,
            Expr::MetadataAccess { target } | Expr::SafeNav { target, .. } => target.position(),
            Expr::If { condition, .. } => condition.position(),
            Expr::Let { value, .. } => value.position(),
            _ => Position::new(),
        }
    }
}
