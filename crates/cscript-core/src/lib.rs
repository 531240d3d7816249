//! cscript core crate.
//!
//! Shared foundation for the cscript pipeline:
//!
//! - Source spans and the per-phase error hierarchy
//! - Value and variable kinds (the fixnum/flonum duality)
//! - The machine model: registers, opcodes, the instruction stream, and
//!   the calling convention
//! - Foreign-function descriptors and marshaling
//! - The shared compilation [`Environment`] (globals + foreign table)

pub mod env;
pub mod error;
pub mod foreign;
pub mod isa;
pub mod span;
pub mod value;

pub use env::{Environment, Global};
pub use error::{CScriptError, CompileError, EncodeError, ExecError, LexError, ParseError};
pub use foreign::{ForeignFn, ForeignKind, ForeignSig, ForeignValue};
pub use span::Span;
pub use value::{ValueKind, VarKind};
