//! cscript vm crate.
//!
//! Bytecode back end of the pipeline: the compact instruction encoding,
//! its decoder, and a hardware-emulating interpreter over a register file
//! with an owned stack region.

pub mod decode;
pub mod encode;
pub mod exec;
pub mod regfile;
mod wire;

pub use decode::{Decoded, decode};
pub use encode::encode;
pub use exec::execute;
pub use regfile::{Flags, RegisterFile, STACK_BYTES};
