//! The peephole pass.
//!
//! One rewrite, applied within each block: a move that parks a value in an
//! expression scratch register, immediately followed by an instruction
//! that reads that scratch as its source, folds into the consumer reading
//! the moved value directly.
//!
//! ```text
//! mov  r10, [rsp-24]          add  rbx, [rsp-24]
//! add  rbx, r10        =>
//! ```
//!
//! The fold is skipped when the consumer writes the would-be source (the
//! move is a deliberate copy) and when the substituted operand has no
//! encoding in the consumer's slot. Blocks bound the window, so folds
//! never cross a label.
//!
//! The pass runs a fixed number of times; each run rescans because a fold
//! can bring a new producer/consumer pair adjacent.

use cscript_core::isa::abi;
use cscript_core::isa::insn::{Block, Insn, Operand, Stream};
use cscript_core::isa::op::Op;
use cscript_core::isa::reg::Reg;

/// Number of times the pass is applied.
pub const PASSES: usize = 3;

/// Run the pass [`PASSES`] times. Returns the total number of folds.
pub fn run(stream: &mut Stream) -> usize {
    let mut folds = 0;
    for _ in 0..PASSES {
        folds += run_once(stream);
    }
    if folds > 0 {
        tracing::debug!(folds, "peephole folded scratch moves");
    }
    folds
}

/// One application of the pass over every block.
pub fn run_once(stream: &mut Stream) -> usize {
    stream.blocks.iter_mut().map(fold_block).sum()
}

fn fold_block(block: &mut Block) -> usize {
    let mut folds = 0;
    let mut i = 0;
    while i + 1 < block.insns.len() {
        if let Some(src) = folded_source(&block.insns[i], &block.insns[i + 1]) {
            block.insns[i + 1].src = Some(src);
            block.insns.remove(i);
            folds += 1;
        } else {
            i += 1;
        }
    }
    folds
}

/// If `consumer` can absorb `mover`'s source, the operand it should read.
fn folded_source(mover: &Insn, consumer: &Insn) -> Option<Operand> {
    if !matches!(mover.op, Op::Mov | Op::Movsd) {
        return None;
    }
    let scratch = mover.dst?.as_reg()?;
    if !is_scratch(scratch) {
        return None;
    }
    let moved = mover.src?;
    if consumer.src != Some(Operand::Reg(scratch)) {
        return None;
    }
    // The consumer may not write either end of the move: overwriting the
    // moved operand would clobber the value being read, and overwriting
    // the scratch means the move's result feeds the consumer's own
    // accumulation.
    if consumer.dst == Some(moved) || consumer.dst == Some(Operand::Reg(scratch)) {
        return None;
    }
    if !encodable(consumer.op, moved) {
        return None;
    }
    Some(moved)
}

fn is_scratch(reg: Reg) -> bool {
    match reg {
        Reg::Gpr(g) => abi::GPR_SCRATCH.contains(&g),
        Reg::Fpr(f) => abi::FPR_SCRATCH.contains(&f),
    }
}

/// Whether `op` accepts `src` in its source slot.
fn encodable(op: Op, src: Operand) -> bool {
    match src {
        Operand::Reg(_) | Operand::Mem(_) => true,
        // Immediates only feed the integer forms.
        Operand::Imm(_) => !matches!(
            op,
            Op::Movsd
                | Op::Movq
                | Op::Addsd
                | Op::Subsd
                | Op::Mulsd
                | Op::Divsd
                | Op::Cvtsi2sd
                | Op::Cvttsd2si
                | Op::Movmskpd
                | Op::Cmpeqsd
                | Op::Cmpltsd
                | Op::Cmplesd
                | Op::Cmpneqsd
                | Op::Cmpnltsd
                | Op::Cmpnlesd
        ),
    }
}
