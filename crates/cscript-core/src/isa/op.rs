//! Instruction opcodes.
//!
//! Each opcode is a single byte in the encoded form. The set covers what
//! the code generator emits plus the structural instructions the
//! interpreter needs (push/pop, register-indirect jump); full native
//! instruction-set coverage is a non-goal.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// Operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Op {
    /// No operation. Also used as alignment padding for aligned labels.
    Nop = 0,

    // =========================================================================
    // Data movement
    // =========================================================================
    /// Move between general-purpose registers, memory, and immediates.
    Mov,
    /// Move a 64-bit float word (xmm-xmm, xmm-mem, mem-xmm).
    Movsd,
    /// Bit-for-bit move between a general-purpose and a float register.
    Movq,
    /// Push a general-purpose register onto the stack region.
    Push,
    /// Pop the stack region into a general-purpose register.
    Pop,

    // =========================================================================
    // Integer ALU
    // =========================================================================
    /// dst += src (64-bit wrapping).
    Add,
    /// dst -= src.
    Sub,
    /// dst *= src.
    Imul,
    /// dst /= src (truncating signed division).
    Idiv,
    /// dst %= src (signed remainder).
    Irem,
    /// dst = -dst.
    Neg,

    // =========================================================================
    // Float ALU
    // =========================================================================
    /// dst += src (doubles).
    Addsd,
    /// dst -= src.
    Subsd,
    /// dst *= src.
    Mulsd,
    /// dst /= src.
    Divsd,
    /// Convert a signed integer source into a double destination.
    Cvtsi2sd,
    /// Convert a double source into a truncated signed integer destination.
    Cvttsd2si,

    // =========================================================================
    // Compares and condition materialization
    // =========================================================================
    /// Integer compare: set flags from dst - src.
    Cmp,
    /// dst = 1 if equal else 0 (reads flags).
    Sete,
    /// dst = 1 if not equal else 0.
    Setne,
    /// dst = 1 if signed less else 0.
    Setl,
    /// dst = 1 if signed less-or-equal else 0.
    Setle,
    /// dst = 1 if signed greater else 0.
    Setg,
    /// dst = 1 if signed greater-or-equal else 0.
    Setge,
    /// SIMD double compare: dst = all-ones mask if dst == src else zero.
    Cmpeqsd,
    /// Mask compare, dst < src.
    Cmpltsd,
    /// Mask compare, dst <= src.
    Cmplesd,
    /// Mask compare, dst != src.
    Cmpneqsd,
    /// Mask compare, !(dst < src), i.e. dst >= src.
    Cmpnltsd,
    /// Mask compare, !(dst <= src), i.e. dst > src.
    Cmpnlesd,
    /// Extract the sign bit of a float register's 64-bit lane into a
    /// general-purpose register (0 or 1).
    Movmskpd,

    // =========================================================================
    // Control flow
    // =========================================================================
    /// Unconditional branch to a label (relative) or through a register.
    Jmp,
    /// Branch if equal (ZF).
    Je,
    /// Branch if not equal.
    Jne,
    /// Branch if signed less.
    Jl,
    /// Branch if signed less-or-equal.
    Jle,
    /// Branch if signed greater.
    Jg,
    /// Branch if signed greater-or-equal.
    Jge,
    /// Push the return offset and branch to a label.
    Call,
    /// Call a foreign function by absolute dispatch address.
    CallF,
    /// Pop a return offset and branch to it; popping the sentinel ends
    /// execution.
    Ret,
}

impl Op {
    /// Assembly mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Nop => "nop",
            Op::Mov => "mov",
            Op::Movsd => "movsd",
            Op::Movq => "movq",
            Op::Push => "push",
            Op::Pop => "pop",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Imul => "imul",
            Op::Idiv => "idiv",
            Op::Irem => "irem",
            Op::Neg => "neg",
            Op::Addsd => "addsd",
            Op::Subsd => "subsd",
            Op::Mulsd => "mulsd",
            Op::Divsd => "divsd",
            Op::Cvtsi2sd => "cvtsi2sd",
            Op::Cvttsd2si => "cvttsd2si",
            Op::Cmp => "cmp",
            Op::Sete => "sete",
            Op::Setne => "setne",
            Op::Setl => "setl",
            Op::Setle => "setle",
            Op::Setg => "setg",
            Op::Setge => "setge",
            Op::Cmpeqsd => "cmpeqsd",
            Op::Cmpltsd => "cmpltsd",
            Op::Cmplesd => "cmplesd",
            Op::Cmpneqsd => "cmpneqsd",
            Op::Cmpnltsd => "cmpnltsd",
            Op::Cmpnlesd => "cmpnlesd",
            Op::Movmskpd => "movmskpd",
            Op::Jmp => "jmp",
            Op::Je => "je",
            Op::Jne => "jne",
            Op::Jl => "jl",
            Op::Jle => "jle",
            Op::Jg => "jg",
            Op::Jge => "jge",
            Op::Call => "call",
            Op::CallF => "callf",
            Op::Ret => "ret",
        }
    }

    /// Whether this opcode branches to a symbolic label.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Op::Jmp | Op::Je | Op::Jne | Op::Jl | Op::Jle | Op::Jg | Op::Jge | Op::Call
        )
    }

    /// Whether this opcode writes its destination operand.
    ///
    /// Used by the peephole pass to tell consumers from mutators.
    pub fn writes_dst(self) -> bool {
        !matches!(self, Op::Cmp | Op::Push | Op::Nop | Op::Ret)
    }

    /// Number of encoded operands.
    ///
    /// Branches and foreign calls count one: the target, materialized as
    /// an immediate at encode time.
    pub fn operand_count(self) -> usize {
        match self {
            Op::Nop | Op::Ret => 0,
            Op::Push
            | Op::Pop
            | Op::Neg
            | Op::Sete
            | Op::Setne
            | Op::Setl
            | Op::Setle
            | Op::Setg
            | Op::Setge
            | Op::Jmp
            | Op::Je
            | Op::Jne
            | Op::Jl
            | Op::Jle
            | Op::Jg
            | Op::Jge
            | Op::Call
            | Op::CallF => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
