//! The deferred frame pass.
//!
//! During generation, stack-resident variables are addressed by virtual
//! slot index because the final frame shape is unknown until the whole
//! function has been walked: expression spills (nesting depth three and
//! beyond) claim the bytes directly below the stack pointer, and variable
//! slots stack up underneath them.
//!
//! ```text
//! [rsp - 8*(d-2)]                   spill for scratch depth d (d >= 3)
//! [rsp - 8*(spills + slot + 1)]     variable slot
//! ```
//!
//! Everything lives below the caller's stack pointer; the generated code
//! never adjusts `rsp` itself, so no epilogue bookkeeping is needed.

use cscript_core::isa::insn::{Disp, Operand, Stream};

/// Byte displacement of an expression spill at the given nesting depth.
#[inline]
pub fn spill_disp(depth: u32) -> i32 {
    -8 * (depth as i32 - 2)
}

/// Rewrite every [`Disp::Slot`] into a concrete byte displacement.
///
/// `spill_slots` is the number of expression-spill slots the function
/// needs (its deepest scratch depth minus two, or zero).
pub fn resolve_slots(stream: &mut Stream, spill_slots: u32) {
    for insn in stream.iter_mut() {
        for operand in [&mut insn.dst, &mut insn.src] {
            if let Some(Operand::Mem(mem)) = operand
                && let Disp::Slot(slot) = mem.disp
            {
                mem.disp = Disp::Bytes(-8 * (spill_slots as i32 + slot as i32 + 1));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cscript_core::isa::insn::{Insn, MemRef};
    use cscript_core::isa::op::Op;
    use cscript_core::isa::reg::Gpr;

    #[test]
    fn slots_land_below_the_spill_region() {
        let mut stream = Stream::new();
        stream.push(Insn::binary(Op::Mov, Gpr::Rbx, MemRef::slot(Gpr::Rsp, 0)));
        stream.push(Insn::binary(Op::Mov, MemRef::slot(Gpr::Rsp, 2), Gpr::Rbx));

        // Two spill slots: depth-3 and depth-4 scratch.
        resolve_slots(&mut stream, 2);

        let insns: Vec<_> = stream.iter().collect();
        assert_eq!(insns[0].src, Some(Operand::Mem(MemRef::bytes(Gpr::Rsp, -24))));
        assert_eq!(insns[1].dst, Some(Operand::Mem(MemRef::bytes(Gpr::Rsp, -40))));
    }

    #[test]
    fn no_spills_puts_slot_zero_at_minus_eight() {
        let mut stream = Stream::new();
        stream.push(Insn::binary(Op::Movsd, MemRef::slot(Gpr::Rsp, 0), Gpr::Rbx));
        resolve_slots(&mut stream, 0);
        assert_eq!(
            stream.last().unwrap().dst,
            Some(Operand::Mem(MemRef::bytes(Gpr::Rsp, -8)))
        );
    }

    #[test]
    fn spill_disp_starts_at_depth_three() {
        assert_eq!(spill_disp(3), -8);
        assert_eq!(spill_disp(4), -16);
    }
}
