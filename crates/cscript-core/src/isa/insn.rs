//! The instruction stream: a language-neutral model of native instructions.
//!
//! The code generator appends [`Insn`] records into labeled [`Block`]s of a
//! [`Stream`]. Nothing is validated at append time; invalid operand
//! combinations surface only when the stream is encoded.

use std::fmt;

use super::op::Op;
use super::reg::{Gpr, Reg};

/// A memory displacement.
///
/// During generation, variables that live on the stack are referenced by
/// [`Disp::Slot`] — a virtual slot index that only becomes a concrete byte
/// displacement once the whole function has been generated and the deepest
/// scratch depth is known. A final frame pass rewrites every `Slot` into
/// `Bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disp {
    /// Concrete byte displacement from the base register.
    Bytes(i32),
    /// Virtual stack slot, resolved by the frame pass.
    Slot(u32),
}

/// A memory operand: base register plus displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemRef {
    pub base: Gpr,
    pub disp: Disp,
}

impl MemRef {
    /// Memory at `base + bytes`.
    #[inline]
    pub fn bytes(base: Gpr, bytes: i32) -> Self {
        Self {
            base,
            disp: Disp::Bytes(bytes),
        }
    }

    /// Memory at a virtual stack slot off `base`.
    #[inline]
    pub fn slot(base: Gpr, slot: u32) -> Self {
        Self {
            base,
            disp: Disp::Slot(slot),
        }
    }
}

/// An instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(Reg),
    Mem(MemRef),
    Imm(i64),
}

impl Operand {
    /// The register named by this operand, if it is one.
    #[inline]
    pub fn as_reg(self) -> Option<Reg> {
        match self {
            Operand::Reg(r) => Some(r),
            _ => None,
        }
    }
}

impl From<Reg> for Operand {
    fn from(r: Reg) -> Operand {
        Operand::Reg(r)
    }
}

impl From<Gpr> for Operand {
    fn from(r: Gpr) -> Operand {
        Operand::Reg(Reg::Gpr(r))
    }
}

impl From<MemRef> for Operand {
    fn from(m: MemRef) -> Operand {
        Operand::Mem(m)
    }
}

/// A single instruction: opcode, up to two operands, and optional symbolic
/// text for a not-yet-resolved branch or external-call target.
#[derive(Debug, Clone, PartialEq)]
pub struct Insn {
    pub op: Op,
    pub dst: Option<Operand>,
    pub src: Option<Operand>,
    /// Label name (branches) or external name (foreign calls).
    pub sym: Option<String>,
}

impl Insn {
    /// Instruction with no operands.
    pub fn nullary(op: Op) -> Self {
        Self {
            op,
            dst: None,
            src: None,
            sym: None,
        }
    }

    /// Instruction with a single operand.
    pub fn unary(op: Op, dst: impl Into<Operand>) -> Self {
        Self {
            op,
            dst: Some(dst.into()),
            src: None,
            sym: None,
        }
    }

    /// Instruction with destination and source operands.
    pub fn binary(op: Op, dst: impl Into<Operand>, src: impl Into<Operand>) -> Self {
        Self {
            op,
            dst: Some(dst.into()),
            src: Some(src.into()),
            sym: None,
        }
    }

    /// Branch or call to a symbolic target.
    pub fn to_sym(op: Op, name: impl Into<String>) -> Self {
        Self {
            op,
            dst: None,
            src: None,
            sym: Some(name.into()),
        }
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)?;
        if let Some(sym) = &self.sym {
            write!(f, " {sym}")?;
        }
        if let Some(dst) = &self.dst {
            write!(f, " {dst}")?;
        }
        if let Some(src) = &self.src {
            write!(f, ", {src}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => r.fmt(f),
            Operand::Mem(m) => match m.disp {
                Disp::Bytes(0) => write!(f, "[{}]", m.base),
                Disp::Bytes(b) if b < 0 => write!(f, "[{}-{}]", m.base, -(b as i64)),
                Disp::Bytes(b) => write!(f, "[{}+{}]", m.base, b),
                Disp::Slot(s) => write!(f, "[{}+slot{}]", m.base, s),
            },
            Operand::Imm(v) => write!(f, "{v}"),
        }
    }
}

/// A label: named position in the stream.
///
/// Aligned labels are padded with no-ops to an 8-byte boundary at encode
/// time. Only call targets are aligned; jump targets are not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub aligned: bool,
}

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aligned: false,
        }
    }

    pub fn aligned(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aligned: true,
        }
    }
}

/// An ordered run of instructions, optionally starting at a label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub label: Option<Label>,
    pub insns: Vec<Insn>,
}

/// The ordered instruction blocks produced by one function compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub blocks: Vec<Block>,
}

impl Stream {
    /// An empty stream with one open unlabeled block.
    pub fn new() -> Self {
        Self {
            blocks: vec![Block::default()],
        }
    }

    /// Append an instruction to the current block.
    pub fn push(&mut self, insn: Insn) {
        if let Some(block) = self.blocks.last_mut() {
            block.insns.push(insn);
        } else {
            self.blocks.push(Block {
                label: None,
                insns: vec![insn],
            });
        }
    }

    /// Start a new block at the given label.
    pub fn open_block(&mut self, label: Label) {
        self.blocks.push(Block {
            label: Some(label),
            insns: Vec::new(),
        });
    }

    /// Remove and return the last instruction of the current block.
    pub fn pop(&mut self) -> Option<Insn> {
        self.blocks.last_mut().and_then(|b| b.insns.pop())
    }

    /// The last instruction of the current block.
    pub fn last(&self) -> Option<&Insn> {
        self.blocks.last().and_then(|b| b.insns.last())
    }

    /// Total instruction count across all blocks.
    pub fn len(&self) -> usize {
        self.blocks.iter().map(|b| b.insns.len()).sum()
    }

    /// Whether the stream holds no instructions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over every instruction in order.
    pub fn iter(&self) -> impl Iterator<Item = &Insn> {
        self.blocks.iter().flat_map(|b| b.insns.iter())
    }

    /// Mutably iterate over every instruction in order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Insn> {
        self.blocks.iter_mut().flat_map(|b| b.insns.iter_mut())
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in &self.blocks {
            if let Some(label) = &block.label {
                writeln!(f, "{}:", label.name)?;
            }
            for insn in &block.insns {
                writeln!(f, "    {insn}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::reg::{Fpr, Gpr};

    #[test]
    fn renders_register_and_memory_operands() {
        let insn = Insn::binary(Op::Mov, Gpr::Rbx, MemRef::bytes(Gpr::Rsp, -8));
        assert_eq!(insn.to_string(), "mov rbx, [rsp-8]");

        let insn = Insn::binary(Op::Movsd, Reg::Fpr(Fpr::Xmm4), MemRef::slot(Gpr::Rsp, 2));
        assert_eq!(insn.to_string(), "movsd xmm4, [rsp+slot2]");
    }

    #[test]
    fn renders_symbolic_branches() {
        assert_eq!(Insn::to_sym(Op::Jl, "L3").to_string(), "jl L3");
        assert_eq!(Insn::to_sym(Op::CallF, "add").to_string(), "callf add");
    }

    #[test]
    fn stream_rendering_includes_labels() {
        let mut stream = Stream::new();
        stream.push(Insn::binary(Op::Mov, Gpr::Rbx, Operand::Imm(5)));
        stream.open_block(Label::new("L0"));
        stream.push(Insn::nullary(Op::Ret));

        let text = stream.to_string();
        assert!(text.contains("    mov rbx, 5\n"));
        assert!(text.contains("L0:\n    ret\n"));
    }

    #[test]
    fn push_appends_to_newest_block() {
        let mut stream = Stream::new();
        stream.open_block(Label::new("L1"));
        stream.push(Insn::nullary(Op::Nop));
        assert_eq!(stream.blocks[0].insns.len(), 0);
        assert_eq!(stream.blocks[1].insns.len(), 1);
        assert_eq!(stream.len(), 1);
    }
}
