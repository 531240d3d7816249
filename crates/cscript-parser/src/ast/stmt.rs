//! Statement AST nodes.

use cscript_core::Span;

use super::expr::Expr;

/// A statement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stmt<'ast> {
    /// Variable declaration (local or `$global`), optionally arrayed and
    /// optionally initialized.
    VarDecl(&'ast VarDeclStmt<'ast>),
    /// Assignment (`=`, `+=`, `-=`, `*=`, `/=`) to a variable, element, or
    /// dereferenced pointer. Assignments exist only at statement level.
    Assign(&'ast AssignStmt<'ast>),
    /// Prefix `++` / `--`.
    IncDec(&'ast IncDecStmt<'ast>),
    /// `if` / `else if` / `else`.
    If(&'ast IfStmt<'ast>),
    /// `for (init; cond; inc) { ... }`.
    For(&'ast ForStmt<'ast>),
    /// Bare expression; the last one's value is the function's return.
    Expr(ExprStmt<'ast>),
}

impl<'ast> Stmt<'ast> {
    /// Get the span of this statement.
    pub fn span(&self) -> Span {
        match self {
            Self::VarDecl(s) => s.span,
            Self::Assign(s) => s.span,
            Self::IncDec(s) => s.span,
            Self::If(s) => s.span,
            Self::For(s) => s.span,
            Self::Expr(s) => s.span,
        }
    }

    /// Source line of this statement.
    #[inline]
    pub fn line(&self) -> u32 {
        self.span().line
    }
}

/// Base type of a declaration or parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclType {
    Int,
    Float,
}

/// A variable declaration.
///
/// `sizes` holds one entry per bracket pair; more than one is a
/// multi-dimension array, which the code generator rejects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VarDeclStmt<'ast> {
    pub base: DeclType,
    pub pointer: bool,
    pub global: bool,
    pub name: &'ast str,
    pub sizes: &'ast [Expr<'ast>],
    pub init: Option<Expr<'ast>>,
    pub span: Span,
}

/// An assignable place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Place<'ast> {
    /// Plain local variable.
    Var(&'ast str),
    /// Plain global.
    Global(&'ast str),
    /// Array or pointer element, local or global base.
    Elem {
        name: &'ast str,
        global: bool,
        index: Expr<'ast>,
    },
    /// Dereferenced pointer.
    Deref(&'ast str),
}

/// An assignment statement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssignStmt<'ast> {
    pub place: Place<'ast>,
    pub op: AssignOp,
    pub value: Expr<'ast>,
    pub span: Span,
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`
    Set,
    /// `+=`
    Add,
    /// `-=`
    Sub,
    /// `*=`
    Mul,
    /// `/=`
    Div,
}

/// Prefix increment/decrement statement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IncDecStmt<'ast> {
    pub place: Place<'ast>,
    /// true for `++`, false for `--`.
    pub increment: bool,
    pub span: Span,
}

/// An `if` statement. `else if` chains nest through `else_body`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IfStmt<'ast> {
    pub cond: Expr<'ast>,
    pub then_body: &'ast [Stmt<'ast>],
    pub else_body: Option<&'ast [Stmt<'ast>]>,
    pub span: Span,
}

/// A `for` loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForStmt<'ast> {
    pub init: Option<Stmt<'ast>>,
    pub cond: Expr<'ast>,
    pub inc: Option<Stmt<'ast>>,
    pub body: &'ast [Stmt<'ast>],
    pub span: Span,
}

/// A bare expression statement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExprStmt<'ast> {
    pub expr: Expr<'ast>,
    pub span: Span,
}

/// A function parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Param<'ast> {
    pub base: DeclType,
    pub pointer: bool,
    pub name: &'ast str,
    pub span: Span,
}

/// A parsed script: `(parameter-list) statement*`.
///
/// The parameter list is optional; a leading `(` is treated as a parameter
/// list only when followed by a type keyword or `)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Script<'ast> {
    pub params: &'ast [Param<'ast>],
    pub body: &'ast [Stmt<'ast>],
}
