//! The register allocator.
//!
//! Two free-lists of eight registers each, one per value kind, indexing
//! into [`abi::INT_POOL`] and [`abi::FLOAT_POOL`]. Allocation hands out
//! the *highest* free index first, so the calling convention's argument
//! registers (the low indices) stay free for parameter binding and are
//! touched only under register pressure.
//!
//! Registers homed to variables stay allocated for the whole function;
//! there is no liveness analysis and no spilling of variable homes.

use cscript_core::ValueKind;
use cscript_core::isa::abi;
use cscript_core::isa::reg::Reg;

/// The register pool for one kind is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistersExhausted;

/// Free-list allocator over the two pools.
#[derive(Debug, Clone)]
pub struct RegisterAllocator {
    int_free: [bool; abi::INT_POOL.len()],
    float_free: [bool; abi::FLOAT_POOL.len()],
}

impl Default for RegisterAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterAllocator {
    pub fn new() -> Self {
        Self {
            int_free: [true; abi::INT_POOL.len()],
            float_free: [true; abi::FLOAT_POOL.len()],
        }
    }

    fn pool(&self, kind: ValueKind) -> &[bool] {
        match kind {
            ValueKind::Fixnum => &self.int_free,
            ValueKind::Flonum => &self.float_free,
        }
    }

    fn pool_mut(&mut self, kind: ValueKind) -> &mut [bool] {
        match kind {
            ValueKind::Fixnum => &mut self.int_free,
            ValueKind::Flonum => &mut self.float_free,
        }
    }

    /// The physical register behind a pool index.
    pub fn physical(kind: ValueKind, index: usize) -> Reg {
        match kind {
            ValueKind::Fixnum => Reg::Gpr(abi::INT_POOL[index]),
            ValueKind::Flonum => Reg::Fpr(abi::FLOAT_POOL[index]),
        }
    }

    /// Whether any register of this kind is free.
    pub fn is_free(&self, kind: ValueKind) -> bool {
        self.pool(kind).iter().any(|&f| f)
    }

    /// Whether the given pool index is currently handed out.
    pub fn is_allocated(&self, kind: ValueKind, index: usize) -> bool {
        !self.pool(kind)[index]
    }

    /// Allocate the highest free index of the pool.
    pub fn allocate_next(&mut self, kind: ValueKind) -> Result<usize, RegistersExhausted> {
        let pool = self.pool_mut(kind);
        for index in (0..pool.len()).rev() {
            if pool[index] {
                pool[index] = false;
                return Ok(index);
            }
        }
        Err(RegistersExhausted)
    }

    /// Allocate a specific index (parameter binding).
    pub fn claim(&mut self, kind: ValueKind, index: usize) -> Result<(), RegistersExhausted> {
        let pool = self.pool_mut(kind);
        if !pool[index] {
            return Err(RegistersExhausted);
        }
        pool[index] = false;
        Ok(())
    }

    /// Return an index to the pool.
    pub fn release(&mut self, kind: ValueKind, index: usize) {
        self.pool_mut(kind)[index] = true;
    }

    /// Free the whole pool of one kind.
    pub fn reset_all(&mut self, kind: ValueKind) {
        for slot in self.pool_mut(kind) {
            *slot = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_highest_index_first() {
        let mut regs = RegisterAllocator::new();
        assert_eq!(regs.allocate_next(ValueKind::Fixnum), Ok(7));
        assert_eq!(regs.allocate_next(ValueKind::Fixnum), Ok(6));
        assert_eq!(regs.allocate_next(ValueKind::Flonum), Ok(7));
    }

    #[test]
    fn release_makes_an_index_reusable() {
        let mut regs = RegisterAllocator::new();
        let idx = regs.allocate_next(ValueKind::Fixnum).unwrap();
        assert!(regs.is_allocated(ValueKind::Fixnum, idx));
        regs.release(ValueKind::Fixnum, idx);
        assert_eq!(regs.allocate_next(ValueKind::Fixnum), Ok(idx));
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut regs = RegisterAllocator::new();
        for _ in 0..8 {
            regs.allocate_next(ValueKind::Fixnum).unwrap();
        }
        assert!(!regs.is_free(ValueKind::Fixnum));
        assert_eq!(
            regs.allocate_next(ValueKind::Fixnum),
            Err(RegistersExhausted)
        );
        // The float pool is untouched.
        assert!(regs.is_free(ValueKind::Flonum));
    }

    #[test]
    fn claim_takes_a_specific_argument_register() {
        let mut regs = RegisterAllocator::new();
        regs.claim(ValueKind::Fixnum, 0).unwrap();
        assert!(regs.is_allocated(ValueKind::Fixnum, 0));
        assert_eq!(regs.claim(ValueKind::Fixnum, 0), Err(RegistersExhausted));
        regs.reset_all(ValueKind::Fixnum);
        assert!(!regs.is_allocated(ValueKind::Fixnum, 0));
    }
}
