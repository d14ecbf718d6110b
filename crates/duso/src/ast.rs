//! Syntax tree produced by the parser and walked by the evaluator.
//!
//! Nodes are plain data: no environment references, no interior mutability.
//! Function bodies and whole programs are shared behind `Arc` so closures and
//! `Code` values can be cloned and moved across threads without copying the
//! tree.

use std::{fmt, sync::Arc};

/// Source position of a token or node (1-based line and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl Pos {
    pub(crate) fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A sequence of statements: a program, a function body, or a control-flow arm.
pub type Block = Vec<Stmt>;

/// Assignment destination: a bare name, an object member, or a container index.
#[derive(Debug, Clone)]
pub enum AssignTarget {
    Name(String),
    Member { object: Expr, key: String },
    Index { object: Expr, index: Expr },
}

#[derive(Debug, Clone)]
pub enum Stmt {
    /// `var x = e` — always creates a fresh binding in the innermost scope.
    Var { name: String, value: Expr, pos: Pos },
    /// `target = e` — upward-walking assignment.
    Assign { target: AssignTarget, value: Expr, pos: Pos },
    If {
        /// Condition/body pairs: the `if` arm followed by any `elseif` arms.
        arms: Vec<(Expr, Block)>,
        else_body: Option<Block>,
        pos: Pos,
    },
    While { cond: Expr, body: Block, pos: Pos },
    /// `for i = start, end [, step] do ... end`
    ForRange {
        var: String,
        start: Expr,
        end: Expr,
        step: Option<Expr>,
        body: Block,
        pos: Pos,
    },
    /// `for x in c do ... end`
    ForIn { var: String, iterable: Expr, body: Block, pos: Pos },
    Try {
        body: Block,
        /// First catch variable, bound to the error message.
        catch_name: String,
        /// Optional second catch variable, bound to the full error value.
        catch_detail: Option<String>,
        handler: Block,
        pos: Pos,
    },
    Return { value: Option<Expr>, pos: Pos },
    Break { pos: Pos },
    Continue { pos: Pos },
    Expr(Expr),
}

impl Stmt {
    pub fn pos(&self) -> Pos {
        match self {
            Self::Var { pos, .. }
            | Self::Assign { pos, .. }
            | Self::If { pos, .. }
            | Self::While { pos, .. }
            | Self::ForRange { pos, .. }
            | Self::ForIn { pos, .. }
            | Self::Try { pos, .. }
            | Self::Return { pos, .. }
            | Self::Break { pos }
            | Self::Continue { pos } => *pos,
            Self::Expr(e) => e.pos,
        }
    }
}

/// An expression together with its source position.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

impl Expr {
    pub(crate) fn new(kind: ExprKind, pos: Pos) -> Self {
        Self { kind, pos }
    }
}

/// One argument at a call site; `name` is set for `name = value` arguments.
#[derive(Debug, Clone)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
        };
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Nil,
    Bool(bool),
    Number(f64),
    Str(String),
    Name(String),
    Array(Vec<Expr>),
    /// `{k = v, ...}` — field order is preserved.
    Object(Vec<(String, Expr)>),
    Function {
        params: Vec<String>,
        body: Arc<Block>,
        /// Present for `function name(...)` statements, used in traces.
        name: Option<String>,
    },
    Call { callee: Box<Expr>, args: Vec<Arg> },
    Member { object: Box<Expr>, key: String },
    Index { object: Box<Expr>, index: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    /// `and`/`or` — short-circuiting, returns the deciding operand.
    Logical { op: LogicalOp, lhs: Box<Expr>, rhs: Box<Expr> },
    /// `c ? a : b` — only the selected branch is evaluated.
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}
