//! Unified error types for cscript.
//!
//! One error enum per pipeline phase, all convertible into the top-level
//! [`CScriptError`] wrapper:
//!
//! ```text
//! CScriptError
//! ├── LexError     - tokenization errors
//! ├── ParseError   - recursive-descent parser errors
//! ├── CompileError - code-generation errors (carry the source line)
//! ├── EncodeError  - bytecode encoding errors
//! └── ExecError    - interpreter errors
//! ```
//!
//! Every error is detect → report with context → stop. There is no retry or
//! recovery anywhere in the pipeline: a compile error discards the partial
//! instruction stream, and an interpreter error leaves the register file in
//! an undefined state that must not be reused.

use thiserror::Error;

use crate::span::Span;

// ============================================================================
// Lexer Errors
// ============================================================================

/// Errors that occur during tokenization.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    /// An unexpected character was encountered.
    #[error("unexpected character '{ch}' at {span}")]
    UnexpectedChar { ch: char, span: Span },

    /// A numeric literal could not be parsed.
    #[error("invalid number '{text}' at {span}")]
    InvalidNumber { text: String, span: Span },

    /// A block comment was not properly terminated.
    #[error("unterminated comment at {span}")]
    UnterminatedComment { span: Span },
}

impl LexError {
    /// Get the span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedChar { span, .. } => *span,
            LexError::InvalidNumber { span, .. } => *span,
            LexError::UnterminatedComment { span } => *span,
        }
    }
}

// ============================================================================
// Parse Errors
// ============================================================================

/// Errors that occur during parsing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// A specific token was expected but something else was found.
    #[error("expected {expected}, found '{found}' at {span}")]
    ExpectedToken {
        expected: &'static str,
        found: String,
        span: Span,
    },

    /// A token that cannot start the current construct.
    #[error("unexpected token '{found}' at {span}")]
    UnexpectedToken { found: String, span: Span },

    /// Source ended in the middle of a construct.
    #[error("unexpected end of input at {span}")]
    UnexpectedEof { span: Span },
}

impl ParseError {
    /// Get the span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            ParseError::ExpectedToken { span, .. } => *span,
            ParseError::UnexpectedToken { span, .. } => *span,
            ParseError::UnexpectedEof { span } => *span,
        }
    }
}

// ============================================================================
// Compile Errors
// ============================================================================

/// Errors raised by the native code generator.
///
/// Every variant carries the source line of the offending construct.
/// Generation aborts immediately; there is no partial recovery.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// A name was used before being declared.
    #[error("line {line}: undeclared variable '{name}'")]
    UndeclaredVariable { name: String, line: u32 },

    /// A name was declared twice in the same function (or global scope).
    #[error("line {line}: variable '{name}' already declared")]
    RedeclaredVariable { name: String, line: u32 },

    /// The register pool for the requested kind is exhausted.
    #[error("line {line}: out of registers")]
    OutOfRegisters { line: u32 },

    /// `name[i]` applied to something that is not an array or pointer.
    #[error("line {line}: '{name}' cannot be indexed")]
    NotIndexable { name: String, line: u32 },

    /// `*name` applied to something that is not a pointer.
    #[error("line {line}: '{name}' is not a pointer")]
    NotAPointer { name: String, line: u32 },

    /// A scalar was expected but an array or pointer name was used bare.
    #[error("line {line}: '{name}' is not a scalar")]
    NotAScalar { name: String, line: u32 },

    /// Arrays are single-dimension only.
    #[error("line {line}: multi-dimension arrays are not supported")]
    MultiDimArray { line: u32 },

    /// Array sizes must be integer literals.
    #[error("line {line}: array size must be an integer constant")]
    NonConstArraySize { line: u32 },

    /// A call to a foreign function that was never registered.
    #[error("line {line}: unknown function '{name}'")]
    UnknownFunction { name: String, line: u32 },

    /// Argument count does not match the foreign descriptor.
    #[error("line {line}: '{name}' expects {expected} arguments, found {found}")]
    WrongArity {
        name: String,
        expected: usize,
        found: usize,
        line: u32,
    },

    /// An argument cannot be converted to the declared parameter kind.
    #[error("line {line}: argument {index} of '{name}' has the wrong type")]
    ArgTypeMismatch {
        name: String,
        index: usize,
        line: u32,
    },

    /// `if`/`for` conditions must be a relational comparison.
    #[error("line {line}: condition must be a comparison")]
    NonBooleanCondition { line: u32 },

    /// `%` is defined for fixnums only.
    #[error("line {line}: '%' requires integer operands")]
    FloatRemainder { line: u32 },
}

impl CompileError {
    /// The source line this error refers to.
    pub fn line(&self) -> u32 {
        match self {
            CompileError::UndeclaredVariable { line, .. }
            | CompileError::RedeclaredVariable { line, .. }
            | CompileError::OutOfRegisters { line }
            | CompileError::NotIndexable { line, .. }
            | CompileError::NotAPointer { line, .. }
            | CompileError::NotAScalar { line, .. }
            | CompileError::MultiDimArray { line }
            | CompileError::NonConstArraySize { line }
            | CompileError::UnknownFunction { line, .. }
            | CompileError::WrongArity { line, .. }
            | CompileError::ArgTypeMismatch { line, .. }
            | CompileError::NonBooleanCondition { line }
            | CompileError::FloatRemainder { line } => *line,
        }
    }
}

// ============================================================================
// Encode Errors
// ============================================================================

/// Errors raised while serializing an instruction stream to bytecode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    /// The operand combination has no encoding.
    #[error("no encoding for operands of '{op}'")]
    UnencodableOperands { op: &'static str },

    /// A branch or call referenced a label that was never defined.
    #[error("unresolved label '{name}'")]
    UnresolvedLabel { name: String },

    /// A foreign call referenced a name missing from the externals table.
    #[error("unresolved external '{name}'")]
    UnresolvedExternal { name: String },

    /// A label was defined more than once.
    #[error("duplicate label '{name}'")]
    DuplicateLabel { name: String },

    /// An instruction still carried an unresolved stack slot.
    #[error("unresolved stack slot in '{op}'")]
    UnresolvedSlot { op: &'static str },
}

// ============================================================================
// Interpreter Errors
// ============================================================================

/// Fatal errors raised by the bytecode interpreter.
///
/// After any of these, the register file is undefined and must not be
/// reused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    /// The opcode byte does not name an instruction.
    #[error("unknown opcode {byte:#04x} at offset {offset}")]
    UnknownOpcode { byte: u8, offset: usize },

    /// An operand byte decoded to an impossible register or mode.
    #[error("invalid operand at offset {offset}")]
    InvalidOperand { offset: usize },

    /// Decoding ran off the end of the buffer.
    #[error("truncated instruction at offset {offset}")]
    Truncated { offset: usize },

    /// A foreign call's address is not in the externals table.
    #[error("unknown foreign function address {addr:#x} at offset {offset}")]
    UnknownForeign { addr: u64, offset: usize },

    /// Integer division or remainder by zero.
    #[error("integer division by zero at offset {offset}")]
    DivideByZero { offset: usize },
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error wrapper for all cscript phases.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CScriptError {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("execution error: {0}")]
    Exec(#[from] ExecError),
}
