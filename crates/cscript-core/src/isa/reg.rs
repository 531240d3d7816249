//! Physical register names.
//!
//! The machine model is x86-64 shaped: sixteen 64-bit general-purpose
//! registers and sixteen 64-bit float registers (the low lane of the XMM
//! file; cscript values are always 64-bit).

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// General-purpose (integer-capable) registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Gpr {
    Rax = 0,
    Rcx,
    Rdx,
    Rbx,
    Rsp,
    Rbp,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

/// Float-capable registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Fpr {
    Xmm0 = 0,
    Xmm1,
    Xmm2,
    Xmm3,
    Xmm4,
    Xmm5,
    Xmm6,
    Xmm7,
    Xmm8,
    Xmm9,
    Xmm10,
    Xmm11,
    Xmm12,
    Xmm13,
    Xmm14,
    Xmm15,
}

/// Either register file.
///
/// Operand bytes in the encoded form use a single 5-bit id space:
/// 0..=15 for [`Gpr`], 16..=31 for [`Fpr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    Gpr(Gpr),
    Fpr(Fpr),
}

impl Reg {
    /// Encoded 5-bit register id.
    #[inline]
    pub fn id(self) -> u8 {
        match self {
            Reg::Gpr(r) => u8::from(r),
            Reg::Fpr(r) => u8::from(r) + 16,
        }
    }

    /// Recover a register from its encoded id.
    pub fn from_id(id: u8) -> Option<Reg> {
        if id < 16 {
            Gpr::try_from(id).ok().map(Reg::Gpr)
        } else {
            Fpr::try_from(id - 16).ok().map(Reg::Fpr)
        }
    }

    /// Whether this names a float register.
    #[inline]
    pub fn is_float(self) -> bool {
        matches!(self, Reg::Fpr(_))
    }
}

impl From<Gpr> for Reg {
    fn from(r: Gpr) -> Reg {
        Reg::Gpr(r)
    }
}

impl From<Fpr> for Reg {
    fn from(r: Fpr) -> Reg {
        Reg::Fpr(r)
    }
}

impl fmt::Display for Gpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Gpr::Rax => "rax",
            Gpr::Rcx => "rcx",
            Gpr::Rdx => "rdx",
            Gpr::Rbx => "rbx",
            Gpr::Rsp => "rsp",
            Gpr::Rbp => "rbp",
            Gpr::Rsi => "rsi",
            Gpr::Rdi => "rdi",
            Gpr::R8 => "r8",
            Gpr::R9 => "r9",
            Gpr::R10 => "r10",
            Gpr::R11 => "r11",
            Gpr::R12 => "r12",
            Gpr::R13 => "r13",
            Gpr::R14 => "r14",
            Gpr::R15 => "r15",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Fpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xmm{}", u8::from(*self))
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reg::Gpr(r) => r.fmt(f),
            Reg::Fpr(r) => r.fmt(f),
        }
    }
}
