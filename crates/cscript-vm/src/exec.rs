//! The bytecode interpreter.
//!
//! A fetch/decode/execute loop over the encoded form, emulating the
//! register machine the generator targets. Memory operands dereference
//! real host addresses: the stack region lives inside the
//! [`RegisterFile`], the globals region inside the environment, and
//! pointer parameters may reference arbitrary host buffers. The
//! interpreter trusts the generated code; feeding it hand-built bytecode
//! with wild addresses is undefined behavior, exactly as native code
//! would be.
//!
//! Entry pushes a sentinel return offset; the final `ret` pops it and
//! ends execution.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use cscript_core::error::ExecError;
use cscript_core::foreign::{ForeignFn, ForeignKind, ForeignValue};
use cscript_core::isa::abi;
use cscript_core::isa::insn::{Disp, MemRef, Operand};
use cscript_core::isa::op::Op;
use cscript_core::isa::reg::Gpr;

use crate::decode::decode;
use crate::regfile::{Flags, RegisterFile};

/// Return offset whose `ret` ends execution.
const RETURN_SENTINEL: u64 = u64::MAX;

/// Run encoded code to completion.
pub fn execute(
    code: &[u8],
    regs: &mut RegisterFile,
    externals: &FxHashMap<u64, ForeignFn>,
) -> Result<(), ExecError> {
    push(regs, RETURN_SENTINEL);
    let mut pc = 0usize;
    loop {
        if pc >= code.len() {
            return Err(ExecError::Truncated { offset: pc });
        }
        let insn = decode(code, pc)?;
        let next = pc + insn.len;
        match insn.op {
            Op::Nop => {}

            Op::Mov | Op::Movsd | Op::Movq => {
                let value = read(regs, insn.src, pc)?;
                write(regs, insn.dst, value, pc)?;
            }
            Op::Push => {
                let value = read(regs, insn.dst, pc)?;
                push(regs, value);
            }
            Op::Pop => {
                let value = pop(regs);
                write(regs, insn.dst, value, pc)?;
            }

            Op::Add => int_alu(regs, &insn, pc, i64::wrapping_add)?,
            Op::Sub => int_alu(regs, &insn, pc, i64::wrapping_sub)?,
            Op::Imul => int_alu(regs, &insn, pc, i64::wrapping_mul)?,
            Op::Idiv | Op::Irem => {
                let a = read(regs, insn.dst, pc)? as i64;
                let b = read(regs, insn.src, pc)? as i64;
                if b == 0 {
                    return Err(ExecError::DivideByZero { offset: pc });
                }
                let result = if insn.op == Op::Idiv {
                    a.wrapping_div(b)
                } else {
                    a.wrapping_rem(b)
                };
                set_result_flags(regs, result);
                write(regs, insn.dst, result as u64, pc)?;
            }
            Op::Neg => {
                let result = (read(regs, insn.dst, pc)? as i64).wrapping_neg();
                set_result_flags(regs, result);
                write(regs, insn.dst, result as u64, pc)?;
            }

            Op::Addsd => float_alu(regs, &insn, pc, |a, b| a + b)?,
            Op::Subsd => float_alu(regs, &insn, pc, |a, b| a - b)?,
            Op::Mulsd => float_alu(regs, &insn, pc, |a, b| a * b)?,
            Op::Divsd => float_alu(regs, &insn, pc, |a, b| a / b)?,
            Op::Cvtsi2sd => {
                let value = read(regs, insn.src, pc)? as i64 as f64;
                write(regs, insn.dst, value.to_bits(), pc)?;
            }
            Op::Cvttsd2si => {
                let value = f64::from_bits(read(regs, insn.src, pc)?) as i64;
                write(regs, insn.dst, value as u64, pc)?;
            }

            Op::Cmp => {
                let a = read(regs, insn.dst, pc)? as i64;
                let b = read(regs, insn.src, pc)? as i64;
                set_compare_flags(regs, a, b);
            }
            Op::Sete | Op::Setne | Op::Setl | Op::Setle | Op::Setg | Op::Setge => {
                let value = condition(regs.flags, insn.op) as u64;
                write(regs, insn.dst, value, pc)?;
            }
            Op::Cmpeqsd
            | Op::Cmpltsd
            | Op::Cmplesd
            | Op::Cmpneqsd
            | Op::Cmpnltsd
            | Op::Cmpnlesd => {
                let a = f64::from_bits(read(regs, insn.dst, pc)?);
                let b = f64::from_bits(read(regs, insn.src, pc)?);
                // The negated predicates are true on unordered operands,
                // like the hardware forms.
                let hold = match insn.op {
                    Op::Cmpeqsd => a == b,
                    Op::Cmpltsd => a < b,
                    Op::Cmplesd => a <= b,
                    Op::Cmpneqsd => a != b,
                    Op::Cmpnltsd => !(a < b),
                    _ => !(a <= b),
                };
                let mask = if hold { u64::MAX } else { 0 };
                write(regs, insn.dst, mask, pc)?;
            }
            Op::Movmskpd => {
                let sign = read(regs, insn.src, pc)? >> 63;
                write(regs, insn.dst, sign, pc)?;
            }

            Op::Jmp => {
                pc = branch_target(next, &insn, code, pc)?;
                continue;
            }
            Op::Je | Op::Jne | Op::Jl | Op::Jle | Op::Jg | Op::Jge => {
                if condition(regs.flags, insn.op) {
                    pc = branch_target(next, &insn, code, pc)?;
                    continue;
                }
            }
            Op::Call => {
                push(regs, next as u64);
                pc = branch_target(next, &insn, code, pc)?;
                continue;
            }
            Op::CallF => {
                let Some(Operand::Imm(addr)) = insn.dst else {
                    return Err(ExecError::InvalidOperand { offset: pc });
                };
                foreign_call(regs, addr as u64, externals, pc)?;
            }
            Op::Ret => {
                let target = pop(regs);
                if target == RETURN_SENTINEL {
                    return Ok(());
                }
                pc = target as usize;
                continue;
            }
        }
        pc = next;
    }
}

// ============================================================================
// Operand access
// ============================================================================

fn mem_addr(regs: &RegisterFile, mem: MemRef, offset: usize) -> Result<u64, ExecError> {
    let Disp::Bytes(disp) = mem.disp else {
        return Err(ExecError::InvalidOperand { offset });
    };
    Ok(regs.gpr(mem.base).wrapping_add(disp as i64 as u64))
}

fn read(regs: &RegisterFile, operand: Option<Operand>, offset: usize) -> Result<u64, ExecError> {
    match operand {
        Some(Operand::Reg(r)) => Ok(regs.read(r)),
        Some(Operand::Imm(v)) => Ok(v as u64),
        Some(Operand::Mem(mem)) => {
            let addr = mem_addr(regs, mem, offset)?;
            // SAFETY: generated code only addresses the stack region, the
            // globals region, and host buffers handed in as pointers.
            Ok(unsafe { (addr as *const u64).read_unaligned() })
        }
        None => Err(ExecError::InvalidOperand { offset }),
    }
}

fn write(
    regs: &mut RegisterFile,
    operand: Option<Operand>,
    value: u64,
    offset: usize,
) -> Result<(), ExecError> {
    match operand {
        Some(Operand::Reg(r)) => {
            regs.write(r, value);
            Ok(())
        }
        Some(Operand::Mem(mem)) => {
            let addr = mem_addr(regs, mem, offset)?;
            // SAFETY: same contract as `read`.
            unsafe { (addr as *mut u64).write_unaligned(value) };
            Ok(())
        }
        _ => Err(ExecError::InvalidOperand { offset }),
    }
}

fn push(regs: &mut RegisterFile, value: u64) {
    let rsp = regs.gpr(Gpr::Rsp).wrapping_sub(8);
    regs.set_gpr(Gpr::Rsp, rsp);
    // SAFETY: rsp stays within the owned stack region for generated code.
    unsafe { (rsp as *mut u64).write_unaligned(value) };
}

fn pop(regs: &mut RegisterFile) -> u64 {
    let rsp = regs.gpr(Gpr::Rsp);
    // SAFETY: matches a prior push.
    let value = unsafe { (rsp as *const u64).read_unaligned() };
    regs.set_gpr(Gpr::Rsp, rsp.wrapping_add(8));
    value
}

// ============================================================================
// ALU and flags
// ============================================================================

fn int_alu(
    regs: &mut RegisterFile,
    insn: &crate::decode::Decoded,
    pc: usize,
    f: impl Fn(i64, i64) -> i64,
) -> Result<(), ExecError> {
    let a = read(regs, insn.dst, pc)? as i64;
    let b = read(regs, insn.src, pc)? as i64;
    let result = f(a, b);
    set_result_flags(regs, result);
    write(regs, insn.dst, result as u64, pc)
}

fn float_alu(
    regs: &mut RegisterFile,
    insn: &crate::decode::Decoded,
    pc: usize,
    f: impl Fn(f64, f64) -> f64,
) -> Result<(), ExecError> {
    let a = f64::from_bits(read(regs, insn.dst, pc)?);
    let b = f64::from_bits(read(regs, insn.src, pc)?);
    write(regs, insn.dst, f(a, b).to_bits(), pc)
}

fn set_result_flags(regs: &mut RegisterFile, result: i64) {
    regs.flags.set(Flags::ZF, result == 0);
    regs.flags.set(Flags::SF, result < 0);
    regs.flags.remove(Flags::CF | Flags::OF);
}

fn set_compare_flags(regs: &mut RegisterFile, a: i64, b: i64) {
    let (diff, overflow) = a.overflowing_sub(b);
    regs.flags.set(Flags::ZF, diff == 0);
    regs.flags.set(Flags::SF, diff < 0);
    regs.flags.set(Flags::CF, (a as u64) < (b as u64));
    regs.flags.set(Flags::OF, overflow);
}

/// Signed condition predicates over the flags.
fn condition(flags: Flags, op: Op) -> bool {
    let zf = flags.contains(Flags::ZF);
    let less = flags.contains(Flags::SF) != flags.contains(Flags::OF);
    match op {
        Op::Sete | Op::Je => zf,
        Op::Setne | Op::Jne => !zf,
        Op::Setl | Op::Jl => less,
        Op::Setle | Op::Jle => zf || less,
        Op::Setg | Op::Jg => !zf && !less,
        _ => !less,
    }
}

fn branch_target(
    next: usize,
    insn: &crate::decode::Decoded,
    code: &[u8],
    pc: usize,
) -> Result<usize, ExecError> {
    let Some(Operand::Imm(rel)) = insn.dst else {
        return Err(ExecError::InvalidOperand { offset: pc });
    };
    let target = next as i64 + rel;
    if target < 0 || target as usize > code.len() {
        return Err(ExecError::InvalidOperand { offset: pc });
    }
    Ok(target as usize)
}

// ============================================================================
// Foreign dispatch
// ============================================================================

/// Marshal arguments out of the convention registers, invoke the host
/// function, and write its return into the return register.
fn foreign_call(
    regs: &mut RegisterFile,
    addr: u64,
    externals: &FxHashMap<u64, ForeignFn>,
    pc: usize,
) -> Result<(), ExecError> {
    let func = externals
        .get(&addr)
        .ok_or(ExecError::UnknownForeign { addr, offset: pc })?;
    let mut nth_int = 0usize;
    let mut nth_float = 0usize;
    let mut args: SmallVec<[ForeignValue; 4]> = SmallVec::new();
    for (position, &kind) in func.sig.params.iter().enumerate() {
        let value = if kind.uses_float_register() {
            let slot = abi::arg_slot(position, nth_float);
            nth_float += 1;
            ForeignValue::Double(f64::from_bits(regs.xmm(abi::float_arg(slot))))
        } else {
            let slot = abi::arg_slot(position, nth_int);
            nth_int += 1;
            let bits = regs.gpr(abi::int_arg(slot));
            match kind {
                ForeignKind::Bool => ForeignValue::Bool(bits != 0),
                ForeignKind::Ptr => ForeignValue::Ptr(bits as usize),
                _ => ForeignValue::Int(bits as i64),
            }
        };
        args.push(value);
    }
    tracing::trace!(name = %func.name, ?args, "foreign call");
    let ret = func.call(&args);
    match func.sig.ret {
        ForeignKind::Double => regs.set_xmm(abi::FLOAT_RETURN, ret.to_bits()),
        ForeignKind::Void => {}
        _ => regs.set_gpr(abi::INT_RETURN, ret.to_bits()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode;
    use cscript_core::Environment;
    use cscript_core::isa::insn::{Insn, Label, Stream};
    use cscript_core::isa::reg::{Fpr, Reg};

    fn run(stream: &Stream) -> RegisterFile {
        let mut regs = RegisterFile::new();
        let code = encode(stream, &FxHashMap::default()).unwrap();
        execute(&code, &mut regs, &FxHashMap::default()).unwrap();
        regs
    }

    fn stream_of(insns: Vec<Insn>) -> Stream {
        let mut stream = Stream::new();
        for insn in insns {
            stream.push(insn);
        }
        stream
    }

    #[test]
    fn integer_arithmetic_lands_in_rax() {
        let regs = run(&stream_of(vec![
            Insn::binary(Op::Mov, Gpr::Rbx, Operand::Imm(5)),
            Insn::binary(Op::Mov, Gpr::R10, Operand::Imm(7)),
            Insn::binary(Op::Add, Gpr::Rbx, Gpr::R10),
            Insn::binary(Op::Mov, Gpr::Rax, Gpr::Rbx),
            Insn::nullary(Op::Ret),
        ]));
        assert_eq!(regs.gpr(Gpr::Rax) as i64, 12);
    }

    #[test]
    fn truncating_division() {
        let regs = run(&stream_of(vec![
            Insn::binary(Op::Mov, Gpr::Rbx, Operand::Imm(5)),
            Insn::binary(Op::Mov, Gpr::R10, Operand::Imm(3)),
            Insn::binary(Op::Idiv, Gpr::Rbx, Gpr::R10),
            Insn::binary(Op::Mov, Gpr::Rax, Gpr::Rbx),
            Insn::nullary(Op::Ret),
        ]));
        assert_eq!(regs.gpr(Gpr::Rax) as i64, 1);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let mut regs = RegisterFile::new();
        let stream = stream_of(vec![
            Insn::binary(Op::Mov, Gpr::Rbx, Operand::Imm(1)),
            Insn::binary(Op::Mov, Gpr::R10, Operand::Imm(0)),
            Insn::binary(Op::Irem, Gpr::Rbx, Gpr::R10),
            Insn::nullary(Op::Ret),
        ]);
        let code = encode(&stream, &FxHashMap::default()).unwrap();
        let err = execute(&code, &mut regs, &FxHashMap::default()).unwrap_err();
        assert!(matches!(err, ExecError::DivideByZero { .. }));
    }

    #[test]
    fn float_arithmetic_through_bit_staging() {
        let regs = run(&stream_of(vec![
            Insn::binary(Op::Mov, Gpr::R12, Operand::Imm(1.5f64.to_bits() as i64)),
            Insn::binary(Op::Movq, Reg::Fpr(Fpr::Xmm4), Gpr::R12),
            Insn::binary(Op::Mov, Gpr::R12, Operand::Imm(2.25f64.to_bits() as i64)),
            Insn::binary(Op::Movq, Reg::Fpr(Fpr::Xmm5), Gpr::R12),
            Insn::binary(Op::Addsd, Reg::Fpr(Fpr::Xmm4), Reg::Fpr(Fpr::Xmm5)),
            Insn::binary(Op::Movsd, Reg::Fpr(Fpr::Xmm0), Reg::Fpr(Fpr::Xmm4)),
            Insn::nullary(Op::Ret),
        ]));
        assert_eq!(f64::from_bits(regs.xmm(Fpr::Xmm0)), 3.75);
    }

    #[test]
    fn stack_slots_hold_values_across_reads() {
        let regs = run(&stream_of(vec![
            Insn::binary(Op::Mov, Gpr::Rbx, Operand::Imm(41)),
            Insn::binary(
                Op::Mov,
                cscript_core::isa::insn::MemRef::bytes(Gpr::Rsp, -16),
                Gpr::Rbx,
            ),
            Insn::binary(
                Op::Mov,
                Gpr::Rax,
                cscript_core::isa::insn::MemRef::bytes(Gpr::Rsp, -16),
            ),
            Insn::binary(Op::Add, Gpr::Rax, Operand::Imm(1)),
            Insn::nullary(Op::Ret),
        ]));
        assert_eq!(regs.gpr(Gpr::Rax), 42);
    }

    #[test]
    fn push_pop_round_trips() {
        let regs = run(&stream_of(vec![
            Insn::binary(Op::Mov, Gpr::Rbx, Operand::Imm(99)),
            Insn::unary(Op::Push, Gpr::Rbx),
            Insn::unary(Op::Pop, Gpr::Rax),
            Insn::nullary(Op::Ret),
        ]));
        assert_eq!(regs.gpr(Gpr::Rax), 99);
    }

    #[test]
    fn comparison_materializes_zero_or_one() {
        let regs = run(&stream_of(vec![
            Insn::binary(Op::Mov, Gpr::Rbx, Operand::Imm(-3)),
            Insn::binary(Op::Mov, Gpr::R10, Operand::Imm(4)),
            Insn::binary(Op::Cmp, Gpr::Rbx, Gpr::R10),
            Insn::unary(Op::Setl, Gpr::Rbx),
            Insn::binary(Op::Mov, Gpr::Rax, Gpr::Rbx),
            Insn::nullary(Op::Ret),
        ]));
        assert_eq!(regs.gpr(Gpr::Rax), 1);
    }

    #[test]
    fn branch_loop_sums_one_through_five() {
        // rax = 0; rbx = 1; while rbx <= 5 { rax += rbx; rbx += 1 }
        let mut stream = Stream::new();
        stream.push(Insn::binary(Op::Mov, Gpr::Rax, Operand::Imm(0)));
        stream.push(Insn::binary(Op::Mov, Gpr::Rbx, Operand::Imm(1)));
        stream.open_block(Label::new("top"));
        stream.push(Insn::binary(Op::Cmp, Gpr::Rbx, Operand::Imm(5)));
        stream.push(Insn::to_sym(Op::Jg, "exit"));
        stream.push(Insn::binary(Op::Add, Gpr::Rax, Gpr::Rbx));
        stream.push(Insn::binary(Op::Add, Gpr::Rbx, Operand::Imm(1)));
        stream.push(Insn::to_sym(Op::Jmp, "top"));
        stream.open_block(Label::new("exit"));
        stream.push(Insn::nullary(Op::Ret));
        let regs = run(&stream);
        assert_eq!(regs.gpr(Gpr::Rax), 15);
    }

    #[test]
    fn float_compare_mask_extracts_sign() {
        let regs = run(&stream_of(vec![
            Insn::binary(Op::Mov, Gpr::R12, Operand::Imm(1.0f64.to_bits() as i64)),
            Insn::binary(Op::Movq, Reg::Fpr(Fpr::Xmm4), Gpr::R12),
            Insn::binary(Op::Mov, Gpr::R12, Operand::Imm(2.0f64.to_bits() as i64)),
            Insn::binary(Op::Movq, Reg::Fpr(Fpr::Xmm5), Gpr::R12),
            Insn::binary(Op::Cmpltsd, Reg::Fpr(Fpr::Xmm4), Reg::Fpr(Fpr::Xmm5)),
            Insn::binary(Op::Movmskpd, Gpr::Rax, Reg::Fpr(Fpr::Xmm4)),
            Insn::nullary(Op::Ret),
        ]));
        assert_eq!(regs.gpr(Gpr::Rax), 1);
    }

    #[test]
    fn foreign_calls_marshal_and_return() {
        let mut env = Environment::new();
        env.register_foreign("add", |a: f64, b: f64| a + b);
        let mut stream = Stream::new();
        let a0 = abi::float_arg(abi::arg_slot(0, 0));
        let a1 = abi::float_arg(abi::arg_slot(1, 1));
        stream.push(Insn::binary(
            Op::Mov,
            Gpr::R12,
            Operand::Imm(3.14f64.to_bits() as i64),
        ));
        stream.push(Insn::binary(Op::Movq, Reg::Fpr(a0), Gpr::R12));
        stream.push(Insn::binary(
            Op::Mov,
            Gpr::R12,
            Operand::Imm(0.1f64.to_bits() as i64),
        ));
        stream.push(Insn::binary(Op::Movq, Reg::Fpr(a1), Gpr::R12));
        stream.push(Insn::to_sym(Op::CallF, "add"));
        stream.push(Insn::nullary(Op::Ret));

        let code = encode(&stream, &env.externals_by_name()).unwrap();
        let mut regs = RegisterFile::new();
        execute(&code, &mut regs, env.externals_by_addr()).unwrap();
        let result = f64::from_bits(regs.xmm(abi::FLOAT_RETURN));
        assert!((result - 3.24).abs() < 1e-12);
    }

    #[test]
    fn unknown_foreign_address_is_an_error() {
        let mut externals_names = FxHashMap::default();
        externals_names.insert("ghost".to_string(), 0xdead0u64);
        let mut stream = Stream::new();
        stream.push(Insn::to_sym(Op::CallF, "ghost"));
        stream.push(Insn::nullary(Op::Ret));
        let code = encode(&stream, &externals_names).unwrap();
        let mut regs = RegisterFile::new();
        let err = execute(&code, &mut regs, &FxHashMap::default()).unwrap_err();
        assert_eq!(
            err,
            ExecError::UnknownForeign {
                addr: 0xdead0,
                offset: 0
            }
        );
    }

    #[test]
    fn running_off_the_end_is_an_error() {
        let mut regs = RegisterFile::new();
        let stream = stream_of(vec![Insn::nullary(Op::Nop)]);
        let code = encode(&stream, &FxHashMap::default()).unwrap();
        let err = execute(&code, &mut regs, &FxHashMap::default()).unwrap_err();
        assert!(matches!(err, ExecError::Truncated { .. }));
    }
}
