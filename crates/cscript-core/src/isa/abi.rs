//! Register roles and the calling convention.
//!
//! One module owns every fixed register assignment so the code generator,
//! the interpreter, and the embedding facade agree on where values live.
//!
//! Two argument-passing styles exist, selected at build time like the
//! original `#ifdef` pair:
//!
//! - **Per-position pairing** (Windows x64): argument *i* occupies the
//!   *i*-th register of whichever file matches its kind, and the paired
//!   register of the other file is skipped.
//! - **Flat enumeration** (System V): the *n*-th integer argument takes the
//!   *n*-th integer register and the *n*-th float argument the *n*-th float
//!   register, counted independently.

use super::reg::{Fpr, Gpr};

/// Expression scratch registers by nesting depth, integer file.
///
/// Depths 0..=2 evaluate in these; deeper nesting spills to stack slots
/// directly below the stack pointer.
pub const GPR_SCRATCH: [Gpr; 3] = [Gpr::Rbx, Gpr::R10, Gpr::R11];

/// Expression scratch registers by nesting depth, float file.
pub const FPR_SCRATCH: [Fpr; 3] = [Fpr::Xmm4, Fpr::Xmm5, Fpr::Xmm6];

/// Address-computation scratch. Element accesses scale the index and add
/// the base here instead of mutating the stack pointer. Also stages flonum
/// literal bit patterns on their way into a float register.
pub const ADDR_SCRATCH: Gpr = Gpr::R12;

/// Base register of the global-variable region.
pub const GLOBALS_BASE: Gpr = Gpr::R15;

/// Integer return register.
pub const INT_RETURN: Gpr = Gpr::Rax;

/// Float return register.
pub const FLOAT_RETURN: Fpr = Fpr::Xmm0;

/// Maximum number of foreign-call arguments.
pub const MAX_FOREIGN_ARGS: usize = 4;

/// Whether argument registers are assigned per absolute argument position
/// (Windows x64) rather than enumerated per register file (System V).
pub const POSITIONAL_ARGS: bool = cfg!(windows);

/// Allocatable integer registers, ordered so the calling convention's
/// argument registers occupy the lowest indices. The allocator hands out
/// the highest free index first, keeping argument registers available for
/// parameter binding.
#[cfg(windows)]
pub const INT_POOL: [Gpr; 8] = [
    Gpr::Rcx,
    Gpr::Rdx,
    Gpr::R8,
    Gpr::R9,
    Gpr::Rsi,
    Gpr::Rdi,
    Gpr::R13,
    Gpr::R14,
];

/// Allocatable integer registers (System V argument order).
#[cfg(not(windows))]
pub const INT_POOL: [Gpr; 8] = [
    Gpr::Rdi,
    Gpr::Rsi,
    Gpr::Rdx,
    Gpr::Rcx,
    Gpr::R8,
    Gpr::R9,
    Gpr::R13,
    Gpr::R14,
];

/// Allocatable float registers; `xmm0..xmm3` are the argument registers.
pub const FLOAT_POOL: [Fpr; 8] = [
    Fpr::Xmm0,
    Fpr::Xmm1,
    Fpr::Xmm2,
    Fpr::Xmm3,
    Fpr::Xmm7,
    Fpr::Xmm8,
    Fpr::Xmm9,
    Fpr::Xmm10,
];

/// Integer argument register for a convention slot.
#[inline]
pub fn int_arg(slot: usize) -> Gpr {
    INT_POOL[slot]
}

/// Float argument register for a convention slot.
#[inline]
pub fn float_arg(slot: usize) -> Fpr {
    FLOAT_POOL[slot]
}

/// Map an argument to its convention slot.
///
/// `position` is the absolute argument index; `nth_of_kind` counts prior
/// arguments of the same register file.
#[inline]
pub fn arg_slot(position: usize, nth_of_kind: usize) -> usize {
    if POSITIONAL_ARGS { position } else { nth_of_kind }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_registers_stay_out_of_the_pools() {
        for r in GPR_SCRATCH {
            assert!(!INT_POOL.contains(&r));
        }
        for r in FPR_SCRATCH {
            assert!(!FLOAT_POOL.contains(&r));
        }
        assert!(!INT_POOL.contains(&ADDR_SCRATCH));
        assert!(!INT_POOL.contains(&GLOBALS_BASE));
        assert!(!INT_POOL.contains(&Gpr::Rsp));
        assert!(!INT_POOL.contains(&INT_RETURN));
    }

    #[test]
    fn arg_slots_follow_the_selected_convention() {
        // Second argument overall, first of its kind.
        let slot = arg_slot(1, 0);
        if POSITIONAL_ARGS {
            assert_eq!(slot, 1);
        } else {
            assert_eq!(slot, 0);
        }
    }
}
