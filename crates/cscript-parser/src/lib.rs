//! cscript parser crate.
//!
//! Lexer, arena-allocated AST, and recursive-descent parser for cscript
//! source. The grammar is `(parameter-list) statement*` over a 4-level
//! operator-precedence expression grammar.
//!
//! # Example
//!
//! ```
//! use cscript_parser::Parser;
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let script = Parser::parse("(int i) i + 1;", &arena).unwrap();
//! assert_eq!(script.params.len(), 1);
//! ```

pub mod ast;
pub mod lexer;
mod parser;

pub use ast::{Expr, Script, Stmt};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;
