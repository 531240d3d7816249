//! Instruction decoder, shared by the interpreter and the disassembling
//! tests. Decoding reverses the encoder exactly; branch and foreign-call
//! targets come back as immediate operands.

use cscript_core::error::ExecError;
use cscript_core::isa::insn::{MemRef, Operand};
use cscript_core::isa::op::Op;
use cscript_core::isa::reg::{Gpr, Reg};

use crate::wire;

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decoded {
    pub op: Op,
    pub dst: Option<Operand>,
    pub src: Option<Operand>,
    /// Encoded length in bytes.
    pub len: usize,
}

/// Raw operand byte plus its eventual payload.
#[derive(Debug, Clone, Copy)]
struct RawOperand {
    mode: u8,
    reg: u8,
    no_disp: bool,
}

/// Decode the instruction at `offset`.
pub fn decode(code: &[u8], offset: usize) -> Result<Decoded, ExecError> {
    let mut at = offset;
    let byte = *code.get(at).ok_or(ExecError::Truncated { offset })?;
    let op = Op::try_from(byte).map_err(|_| ExecError::UnknownOpcode { byte, offset })?;
    at += 1;

    let count = op.operand_count();
    let mut raw = [None::<RawOperand>; 2];
    let mut sized = false;
    for slot in raw.iter_mut().take(count) {
        let byte = *code.get(at).ok_or(ExecError::Truncated { offset })?;
        at += 1;
        let operand = RawOperand {
            mode: byte >> wire::MODE_SHIFT & wire::MODE_MASK,
            reg: byte & wire::REG_MASK,
            no_disp: byte & wire::FLAG_NO_DISP != 0,
        };
        sized |= operand.mode == wire::MODE_IMM
            || (operand.mode == wire::MODE_MEM && !operand.no_disp);
        *slot = Some(operand);
    }

    let mut classes = [0u8; 2];
    if sized {
        let byte = *code.get(at).ok_or(ExecError::Truncated { offset })?;
        at += 1;
        classes = [byte & 0x0f, byte >> 4];
    }

    let mut operands = [None::<Operand>; 2];
    for i in 0..count {
        let raw = raw[i].ok_or(ExecError::InvalidOperand { offset })?;
        let value = match raw.mode {
            wire::MODE_IMM => Some(read_payload(code, &mut at, classes[i], offset)?),
            wire::MODE_MEM if !raw.no_disp => {
                Some(read_payload(code, &mut at, classes[i], offset)?)
            }
            _ => None,
        };
        operands[i] = Some(match raw.mode {
            wire::MODE_REG => {
                let reg = Reg::from_id(raw.reg).ok_or(ExecError::InvalidOperand { offset })?;
                Operand::Reg(reg)
            }
            wire::MODE_MEM => {
                let base = Gpr::try_from(raw.reg)
                    .map_err(|_| ExecError::InvalidOperand { offset })?;
                let disp = value.unwrap_or(0);
                let disp =
                    i32::try_from(disp).map_err(|_| ExecError::InvalidOperand { offset })?;
                Operand::Mem(MemRef::bytes(base, disp))
            }
            wire::MODE_IMM => Operand::Imm(value.unwrap_or(0)),
            _ => return Err(ExecError::InvalidOperand { offset }),
        });
    }

    Ok(Decoded {
        op,
        dst: operands[0],
        src: operands[1],
        len: at - offset,
    })
}

/// Little-endian, sign-extended payload of one size class.
fn read_payload(
    code: &[u8],
    at: &mut usize,
    class: u8,
    offset: usize,
) -> Result<i64, ExecError> {
    let width = wire::CLASS_WIDTH[class as usize];
    let bytes = code
        .get(*at..*at + width)
        .ok_or(ExecError::Truncated { offset })?;
    *at += width;
    Ok(match bytes {
        [] => 0,
        [b] => *b as i8 as i64,
        [a, b, c, d] => i32::from_le_bytes([*a, *b, *c, *d]) as i64,
        [a, b, c, d, e, f, g, h] => i64::from_le_bytes([*a, *b, *c, *d, *e, *f, *g, *h]),
        _ => return Err(ExecError::InvalidOperand { offset }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode;
    use cscript_core::isa::insn::{Insn, Stream};
    use cscript_core::isa::reg::Fpr;
    use rustc_hash::FxHashMap;

    fn round_trip(insn: Insn) -> Decoded {
        let mut stream = Stream::new();
        stream.push(insn);
        let code = encode(&stream, &FxHashMap::default()).unwrap();
        let decoded = decode(&code, 0).unwrap();
        assert_eq!(decoded.len, code.len());
        decoded
    }

    #[test]
    fn register_forms_round_trip() {
        let insn = Insn::binary(Op::Add, Gpr::Rbx, Gpr::R10);
        let decoded = round_trip(insn.clone());
        assert_eq!(decoded.op, insn.op);
        assert_eq!(decoded.dst, insn.dst);
        assert_eq!(decoded.src, insn.src);
    }

    #[test]
    fn memory_forms_round_trip_with_sign_extension() {
        let insn = Insn::binary(Op::Movsd, Reg::Fpr(Fpr::Xmm4), MemRef::bytes(Gpr::Rsp, -40));
        let decoded = round_trip(insn.clone());
        assert_eq!(decoded.src, insn.src);
    }

    #[test]
    fn zero_displacement_round_trips_without_payload() {
        let insn = Insn::binary(Op::Mov, Gpr::Rbx, MemRef::bytes(Gpr::R12, 0));
        let decoded = round_trip(insn.clone());
        assert_eq!(decoded.src, Some(Operand::Mem(MemRef::bytes(Gpr::R12, 0))));
        assert_eq!(decoded.len, 3);
    }

    #[test]
    fn wide_immediates_round_trip() {
        let bits = (-2.5f64).to_bits() as i64;
        let insn = Insn::binary(Op::Mov, Gpr::R12, Operand::Imm(bits));
        let decoded = round_trip(insn.clone());
        assert_eq!(decoded.src, Some(Operand::Imm(bits)));
    }

    #[test]
    fn unary_forms_round_trip() {
        let decoded = round_trip(Insn::unary(Op::Sete, Gpr::Rbx));
        assert_eq!(decoded.dst, Some(Operand::Reg(Reg::Gpr(Gpr::Rbx))));
        assert_eq!(decoded.src, None);
    }

    #[test]
    fn unknown_opcodes_are_rejected() {
        let err = decode(&[0xfe], 0).unwrap_err();
        assert_eq!(
            err,
            ExecError::UnknownOpcode {
                byte: 0xfe,
                offset: 0
            }
        );
    }

    #[test]
    fn truncated_payloads_are_rejected() {
        let mut stream = Stream::new();
        stream.push(Insn::binary(Op::Mov, Gpr::Rbx, Operand::Imm(1 << 40)));
        let code = encode(&stream, &FxHashMap::default()).unwrap();
        let err = decode(&code[..code.len() - 2], 0).unwrap_err();
        assert_eq!(err, ExecError::Truncated { offset: 0 });
    }
}
