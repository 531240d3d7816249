//! Two-pass bytecode encoder.
//!
//! The first pass measures every instruction and fixes label offsets,
//! padding aligned labels to an 8-byte boundary with no-ops. The second
//! pass emits bytes, resolving branch targets to next-instruction-relative
//! displacements and foreign names to their dispatch addresses.
//!
//! Sizes never depend on label placement (branch displacements are a
//! fixed width), so one measuring pass suffices.

use rustc_hash::FxHashMap;

use cscript_core::error::EncodeError;
use cscript_core::isa::insn::{Disp, Insn, Operand, Stream};
use cscript_core::isa::op::Op;

use crate::wire;

/// Encode a stream against the environment's name → address table.
pub fn encode(
    stream: &Stream,
    externals: &FxHashMap<String, u64>,
) -> Result<Vec<u8>, EncodeError> {
    let labels = collect_labels(stream)?;

    let mut code = Vec::new();
    for block in &stream.blocks {
        if let Some(label) = &block.label
            && label.aligned
        {
            while code.len() % wire::LABEL_ALIGN != 0 {
                code.push(u8::from(Op::Nop));
            }
        }
        for insn in &block.insns {
            emit(insn, &labels, externals, &mut code)?;
        }
    }
    tracing::debug!(bytes = code.len(), "encoded stream");
    Ok(code)
}

/// First pass: label name → byte offset.
fn collect_labels(stream: &Stream) -> Result<FxHashMap<String, usize>, EncodeError> {
    let mut labels = FxHashMap::default();
    let mut offset = 0usize;
    for block in &stream.blocks {
        if let Some(label) = &block.label {
            if label.aligned {
                offset = offset.next_multiple_of(wire::LABEL_ALIGN);
            }
            if labels.insert(label.name.clone(), offset).is_some() {
                return Err(EncodeError::DuplicateLabel {
                    name: label.name.clone(),
                });
            }
        }
        for insn in &block.insns {
            offset += encoded_len(insn)?;
        }
    }
    Ok(labels)
}

/// Encoded byte length of one instruction.
fn encoded_len(insn: &Insn) -> Result<usize, EncodeError> {
    if insn.op.is_branch() {
        // opcode + operand byte + size byte + rel32
        return Ok(3 + wire::CLASS_WIDTH[wire::BRANCH_CLASS as usize]);
    }
    if insn.op == Op::CallF {
        return Ok(3 + wire::CLASS_WIDTH[wire::EXTERNAL_CLASS as usize]);
    }
    let mut len = 1;
    let mut sized = false;
    for operand in [insn.dst, insn.src].into_iter().flatten() {
        len += 1;
        let (_, class, carries) = operand_parts(insn.op, operand)?;
        sized |= carries;
        len += wire::CLASS_WIDTH[class as usize];
    }
    if sized {
        len += 1;
    }
    Ok(len)
}

/// Operand byte, payload class, and whether the operand claims a size
/// nibble (immediates always do, even zero-valued ones).
fn operand_parts(op: Op, operand: Operand) -> Result<(u8, u8, bool), EncodeError> {
    match operand {
        Operand::Reg(r) => Ok((wire::MODE_REG << wire::MODE_SHIFT | r.id(), 0, false)),
        Operand::Mem(mem) => {
            let base = mem.base as u8;
            match mem.disp {
                Disp::Bytes(0) => Ok((
                    wire::MODE_MEM << wire::MODE_SHIFT | base | wire::FLAG_NO_DISP,
                    0,
                    false,
                )),
                Disp::Bytes(disp) => Ok((
                    wire::MODE_MEM << wire::MODE_SHIFT | base,
                    wire::class_for(disp as i64),
                    true,
                )),
                Disp::Slot(_) => Err(EncodeError::UnresolvedSlot {
                    op: op.mnemonic(),
                }),
            }
        }
        Operand::Imm(value) => Ok((
            wire::MODE_IMM << wire::MODE_SHIFT,
            wire::class_for(value),
            true,
        )),
    }
}

fn payload(value: i64, class: u8, code: &mut Vec<u8>) {
    let width = wire::CLASS_WIDTH[class as usize];
    code.extend_from_slice(&value.to_le_bytes()[..width]);
}

fn operand_value(operand: Operand) -> i64 {
    match operand {
        Operand::Mem(mem) => match mem.disp {
            Disp::Bytes(d) => d as i64,
            Disp::Slot(_) => 0,
        },
        Operand::Imm(v) => v,
        Operand::Reg(_) => 0,
    }
}

fn emit(
    insn: &Insn,
    labels: &FxHashMap<String, usize>,
    externals: &FxHashMap<String, u64>,
    code: &mut Vec<u8>,
) -> Result<(), EncodeError> {
    if insn.op.is_branch() {
        let name = insn.sym.as_deref().ok_or(EncodeError::UnencodableOperands {
            op: insn.op.mnemonic(),
        })?;
        let target = *labels
            .get(name)
            .ok_or_else(|| EncodeError::UnresolvedLabel {
                name: name.to_string(),
            })?;
        let len = encoded_len(insn)?;
        let rel = target as i64 - (code.len() + len) as i64;
        code.push(u8::from(insn.op));
        code.push(wire::MODE_IMM << wire::MODE_SHIFT);
        code.push(wire::BRANCH_CLASS);
        payload(rel, wire::BRANCH_CLASS, code);
        return Ok(());
    }
    if insn.op == Op::CallF {
        let name = insn.sym.as_deref().ok_or(EncodeError::UnencodableOperands {
            op: insn.op.mnemonic(),
        })?;
        let addr = *externals
            .get(name)
            .ok_or_else(|| EncodeError::UnresolvedExternal {
                name: name.to_string(),
            })?;
        code.push(u8::from(insn.op));
        code.push(wire::MODE_IMM << wire::MODE_SHIFT);
        code.push(wire::EXTERNAL_CLASS);
        payload(addr as i64, wire::EXTERNAL_CLASS, code);
        return Ok(());
    }

    // Immediate destinations only exist for branch targets.
    if matches!(insn.dst, Some(Operand::Imm(_))) {
        return Err(EncodeError::UnencodableOperands {
            op: insn.op.mnemonic(),
        });
    }

    code.push(u8::from(insn.op));
    let mut classes = [0u8; 2];
    let mut sized = false;
    let operands = [insn.dst, insn.src];
    for (i, operand) in operands.iter().enumerate() {
        if let Some(operand) = operand {
            let (byte, class, carries) = operand_parts(insn.op, *operand)?;
            code.push(byte);
            classes[i] = class;
            sized |= carries;
        }
    }
    if sized {
        code.push(classes[1] << 4 | classes[0]);
        for (i, operand) in operands.iter().enumerate() {
            if let Some(operand) = operand {
                payload(operand_value(*operand), classes[i], code);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cscript_core::isa::insn::{Label, MemRef};
    use cscript_core::isa::reg::{Fpr, Gpr, Reg};

    fn no_externals() -> FxHashMap<String, u64> {
        FxHashMap::default()
    }

    #[test]
    fn register_only_forms_have_no_size_byte() {
        let mut stream = Stream::new();
        stream.push(Insn::binary(Op::Add, Gpr::Rbx, Gpr::R10));
        let code = encode(&stream, &no_externals()).unwrap();
        // opcode + two operand bytes
        assert_eq!(code.len(), 3);
        assert_eq!(code[0], u8::from(Op::Add));
    }

    #[test]
    fn zero_displacement_memory_sets_the_flag() {
        let mut stream = Stream::new();
        stream.push(Insn::binary(Op::Mov, Gpr::Rbx, MemRef::bytes(Gpr::R12, 0)));
        let code = encode(&stream, &no_externals()).unwrap();
        assert_eq!(code.len(), 3);
        assert_ne!(code[2] & wire::FLAG_NO_DISP, 0);
    }

    #[test]
    fn small_displacements_use_one_byte() {
        let mut stream = Stream::new();
        stream.push(Insn::binary(Op::Mov, Gpr::Rbx, MemRef::bytes(Gpr::Rsp, -8)));
        let code = encode(&stream, &no_externals()).unwrap();
        // opcode + 2 operand bytes + size byte + 1 payload byte
        assert_eq!(code.len(), 5);
        assert_eq!(code[4], (-8i8) as u8);
    }

    #[test]
    fn wide_immediates_take_eight_bytes() {
        let bits = 3.14f64.to_bits() as i64;
        let mut stream = Stream::new();
        stream.push(Insn::binary(Op::Mov, Gpr::R12, Operand::Imm(bits)));
        let code = encode(&stream, &no_externals()).unwrap();
        assert_eq!(code.len(), 12);
        assert_eq!(i64::from_le_bytes(code[4..12].try_into().unwrap()), bits);
    }

    #[test]
    fn zero_immediates_still_emit_the_size_byte() {
        let mut stream = Stream::new();
        stream.push(Insn::binary(Op::Cmp, Gpr::Rbx, Operand::Imm(0)));
        let code = encode(&stream, &no_externals()).unwrap();
        // opcode + 2 operand bytes + size byte, zero payload bytes
        assert_eq!(code.len(), 4);
        assert_eq!(code[3], 0);
    }

    #[test]
    fn branches_are_relative_to_the_next_instruction() {
        let mut stream = Stream::new();
        stream.push(Insn::to_sym(Op::Jmp, "top"));
        stream.open_block(Label::new("top"));
        stream.push(Insn::nullary(Op::Ret));
        let code = encode(&stream, &no_externals()).unwrap();
        // jmp is 7 bytes; the label sits right after it.
        assert_eq!(code.len(), 8);
        assert_eq!(i32::from_le_bytes(code[3..7].try_into().unwrap()), 0);
    }

    #[test]
    fn backward_branches_are_negative() {
        let mut stream = Stream::new();
        stream.open_block(Label::new("top"));
        stream.push(Insn::binary(Op::Add, Gpr::Rbx, Gpr::R10));
        stream.push(Insn::to_sym(Op::Jmp, "top"));
        let code = encode(&stream, &no_externals()).unwrap();
        assert_eq!(i32::from_le_bytes(code[6..10].try_into().unwrap()), -10);
    }

    #[test]
    fn aligned_labels_get_nop_padding() {
        let mut stream = Stream::new();
        stream.push(Insn::binary(Op::Add, Gpr::Rbx, Gpr::R10)); // 3 bytes
        stream.open_block(Label::aligned("entry"));
        stream.push(Insn::nullary(Op::Ret));
        stream.push(Insn::to_sym(Op::Jmp, "entry"));
        let code = encode(&stream, &no_externals()).unwrap();
        assert_eq!(&code[3..8], &[0, 0, 0, 0, 0]);
        assert_eq!(code[8], u8::from(Op::Ret));
        // jmp at 9, 7 bytes long, targets offset 8.
        assert_eq!(i32::from_le_bytes(code[12..16].try_into().unwrap()), -8);
    }

    #[test]
    fn foreign_calls_encode_the_dispatch_address() {
        let mut externals = FxHashMap::default();
        externals.insert("add".to_string(), 0x1008u64);
        let mut stream = Stream::new();
        stream.push(Insn::to_sym(Op::CallF, "add"));
        let code = encode(&stream, &externals).unwrap();
        assert_eq!(code.len(), 11);
        assert_eq!(u64::from_le_bytes(code[3..11].try_into().unwrap()), 0x1008);
    }

    #[test]
    fn unresolved_label_is_reported() {
        let mut stream = Stream::new();
        stream.push(Insn::to_sym(Op::Je, "nowhere"));
        let err = encode(&stream, &no_externals()).unwrap_err();
        assert_eq!(
            err,
            EncodeError::UnresolvedLabel {
                name: "nowhere".to_string()
            }
        );
    }

    #[test]
    fn unresolved_external_is_reported() {
        let mut stream = Stream::new();
        stream.push(Insn::to_sym(Op::CallF, "missing"));
        let err = encode(&stream, &no_externals()).unwrap_err();
        assert!(matches!(err, EncodeError::UnresolvedExternal { .. }));
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let mut stream = Stream::new();
        stream.open_block(Label::new("L0"));
        stream.open_block(Label::new("L0"));
        let err = encode(&stream, &no_externals()).unwrap_err();
        assert!(matches!(err, EncodeError::DuplicateLabel { .. }));
    }

    #[test]
    fn leftover_virtual_slots_are_rejected() {
        let mut stream = Stream::new();
        stream.push(Insn::binary(Op::Mov, Gpr::Rbx, MemRef::slot(Gpr::Rsp, 1)));
        let err = encode(&stream, &no_externals()).unwrap_err();
        assert_eq!(err, EncodeError::UnresolvedSlot { op: "mov" });
    }

    #[test]
    fn float_register_ids_use_the_high_range() {
        let mut stream = Stream::new();
        stream.push(Insn::binary(
            Op::Movsd,
            Reg::Fpr(Fpr::Xmm4),
            Reg::Fpr(Fpr::Xmm0),
        ));
        let code = encode(&stream, &no_externals()).unwrap();
        assert_eq!(code[1] & wire::REG_MASK, 16 + 4);
        assert_eq!(code[2] & wire::REG_MASK, 16);
    }
}
