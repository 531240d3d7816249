//! The emulated register file.
//!
//! Sixteen integer and sixteen float registers, each a raw 64-bit word,
//! plus the condition flags and an owned stack region. The stack pointer
//! starts at the region's top and holds a real host address, so stack
//! slots and host pointers go through the same memory path.

use bitflags::bitflags;

use cscript_core::isa::reg::{Fpr, Gpr, Reg};

/// Stack region size. Generated frames are shallow (no recursion), so
/// this is generous.
pub const STACK_BYTES: usize = 64 * 1024;

bitflags! {
    /// Condition flags written by `cmp` and read by `set`/`j` forms.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u8 {
        /// Zero.
        const ZF = 1 << 0;
        /// Sign.
        const SF = 1 << 1;
        /// Unsigned borrow.
        const CF = 1 << 2;
        /// Signed overflow.
        const OF = 1 << 3;
    }
}

/// One execution's register state.
#[derive(Debug)]
pub struct RegisterFile {
    gpr: [u64; 16],
    xmm: [u64; 16],
    pub flags: Flags,
    /// Owned stack region; `rsp` points into it.
    stack: Vec<u8>,
}

impl RegisterFile {
    /// Fresh state with `rsp` at the top of an owned stack region.
    pub fn new() -> Self {
        let stack = vec![0u8; STACK_BYTES];
        let top = stack.as_ptr() as u64 + STACK_BYTES as u64;
        let mut regs = Self {
            gpr: [0; 16],
            xmm: [0; 16],
            flags: Flags::empty(),
            stack,
        };
        regs.set_gpr(Gpr::Rsp, top);
        regs
    }

    #[inline]
    pub fn gpr(&self, reg: Gpr) -> u64 {
        self.gpr[reg as usize]
    }

    #[inline]
    pub fn set_gpr(&mut self, reg: Gpr, value: u64) {
        self.gpr[reg as usize] = value;
    }

    #[inline]
    pub fn xmm(&self, reg: Fpr) -> u64 {
        self.xmm[reg as usize]
    }

    #[inline]
    pub fn set_xmm(&mut self, reg: Fpr, value: u64) {
        self.xmm[reg as usize] = value;
    }

    /// Read either file through the unified register namespace.
    #[inline]
    pub fn read(&self, reg: Reg) -> u64 {
        match reg {
            Reg::Gpr(g) => self.gpr(g),
            Reg::Fpr(f) => self.xmm(f),
        }
    }

    #[inline]
    pub fn write(&mut self, reg: Reg, value: u64) {
        match reg {
            Reg::Gpr(g) => self.set_gpr(g, value),
            Reg::Fpr(f) => self.set_xmm(f, value),
        }
    }

    /// Whether an address falls inside the owned stack region.
    pub fn on_stack(&self, addr: u64) -> bool {
        let base = self.stack.as_ptr() as u64;
        addr >= base && addr < base + self.stack.len() as u64
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_pointer_starts_at_the_top() {
        let regs = RegisterFile::new();
        let rsp = regs.gpr(Gpr::Rsp);
        assert!(regs.on_stack(rsp - 8));
        assert!(!regs.on_stack(rsp));
    }

    #[test]
    fn files_are_independent() {
        let mut regs = RegisterFile::new();
        regs.write(Reg::Gpr(Gpr::Rax), 7);
        regs.write(Reg::Fpr(Fpr::Xmm0), 9);
        assert_eq!(regs.read(Reg::Gpr(Gpr::Rax)), 7);
        assert_eq!(regs.read(Reg::Fpr(Fpr::Xmm0)), 9);
    }
}
