//! cscript compiler crate.
//!
//! Turns a parsed script into an instruction stream: register allocation,
//! depth-addressed expression generation, the deferred frame pass, and
//! the peephole pass that folds scratch moves back into their consumers.

pub mod codegen;
pub mod frame;
pub mod peephole;
pub mod regalloc;
pub mod symtab;

pub use codegen::{CompiledFunction, compile};
