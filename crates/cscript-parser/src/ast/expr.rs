//! Expression AST nodes.
//!
//! Expressions follow a 4-level operator-precedence grammar:
//!
//! 1. expression — relational chains (`< <= > >= == !=`)
//! 2. relation — additive chains (`+ -`)
//! 3. term — multiplicative chains (`* / %`)
//! 4. factor — literals, variables, element access, dereference, foreign
//!    calls, unary minus, parenthesized expressions
//!
//! Comparison operators normalize to a 0/1 fixnum.

use cscript_core::Span;

/// An expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expr<'ast> {
    /// Integer literal.
    IntLit(IntLitExpr),
    /// Float literal.
    FloatLit(FloatLitExpr),
    /// Local variable or parameter reference.
    Var(NameExpr<'ast>),
    /// Global reference (`$name`).
    Global(NameExpr<'ast>),
    /// Element access (`base[index]`).
    Index(&'ast IndexExpr<'ast>),
    /// Pointer dereference (`*name`).
    Deref(NameExpr<'ast>),
    /// Foreign function call.
    Call(&'ast CallExpr<'ast>),
    /// Unary negation.
    Neg(&'ast NegExpr<'ast>),
    /// Binary operation.
    Binary(&'ast BinaryExpr<'ast>),
}

impl<'ast> Expr<'ast> {
    /// Get the span of this expression.
    pub fn span(&self) -> Span {
        match self {
            Self::IntLit(e) => e.span,
            Self::FloatLit(e) => e.span,
            Self::Var(e) => e.span,
            Self::Global(e) => e.span,
            Self::Index(e) => e.span,
            Self::Deref(e) => e.span,
            Self::Call(e) => e.span,
            Self::Neg(e) => e.span,
            Self::Binary(e) => e.span,
        }
    }

    /// Source line of this expression.
    #[inline]
    pub fn line(&self) -> u32 {
        self.span().line
    }
}

/// Integer literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntLitExpr {
    pub value: i64,
    pub span: Span,
}

/// Float literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatLitExpr {
    pub value: f64,
    pub span: Span,
}

/// A bare name: variable, parameter, global, or dereference target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NameExpr<'ast> {
    pub name: &'ast str,
    pub span: Span,
}

/// Element access. The base must name an array or pointer; anything else —
/// including a nested index, which would be a second dimension — is a
/// compile error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexExpr<'ast> {
    pub base: Expr<'ast>,
    pub index: Expr<'ast>,
    pub span: Span,
}

/// Foreign function call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallExpr<'ast> {
    pub name: &'ast str,
    pub args: &'ast [Expr<'ast>],
    pub span: Span,
}

/// Unary negation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NegExpr<'ast> {
    pub operand: Expr<'ast>,
    pub span: Span,
}

/// Binary operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinaryExpr<'ast> {
    pub op: BinaryOp,
    pub lhs: Expr<'ast>,
    pub rhs: Expr<'ast>,
    pub span: Span,
}

/// Binary operators across the three infix precedence levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinaryOp {
    /// Whether this operator is a relational comparison.
    #[inline]
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }
}
