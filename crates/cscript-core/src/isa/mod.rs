//! The machine model: registers, opcodes, and the instruction stream.
//!
//! This is the interface between the native code generator and the
//! bytecode engine. The generator appends [`Insn`](insn::Insn) records to a
//! [`Stream`](insn::Stream); the engine serializes that stream to compact
//! bytes and interprets them against a register file.

pub mod abi;
pub mod insn;
pub mod op;
pub mod reg;

pub use insn::{Block, Disp, Insn, Label, MemRef, Operand, Stream};
pub use op::Op;
pub use reg::{Fpr, Gpr, Reg};
