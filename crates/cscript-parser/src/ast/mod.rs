//! Abstract syntax tree for cscript.
//!
//! All nodes are arena-allocated; the `'ast` lifetime ties them to the
//! [`bumpalo::Bump`] handed to the parser. Nodes exist only for one
//! compilation.

pub mod expr;
pub mod stmt;

pub use expr::{
    BinaryExpr, BinaryOp, CallExpr, Expr, FloatLitExpr, IndexExpr, IntLitExpr, NameExpr, NegExpr,
};
pub use stmt::{
    AssignOp, AssignStmt, DeclType, ExprStmt, ForStmt, IfStmt, IncDecStmt, Param, Place, Script,
    Stmt, VarDeclStmt,
};
