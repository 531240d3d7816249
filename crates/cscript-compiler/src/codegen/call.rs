//! Foreign-call generation.
//!
//! Arguments evaluate left to right into consecutive scratch depths, then
//! move into the registers the calling convention assigns. Any argument
//! register currently serving as a variable's home is parked in a fresh
//! stack slot across the call and restored after the return value has
//! been relocated to the call's own scratch depth.

use cscript_core::error::CompileError;
use cscript_core::foreign::ForeignKind;
use cscript_core::isa::abi;
use cscript_core::isa::insn::{Insn, MemRef, Operand};
use cscript_core::isa::op::Op;
use cscript_core::isa::reg::{Gpr, Reg};
use cscript_core::value::ValueKind;
use cscript_parser::ast::CallExpr;

use super::CodeGen;

impl CodeGen<'_> {
    pub(crate) fn foreign_call(
        &mut self,
        call: &CallExpr<'_>,
        depth: u32,
    ) -> Result<ValueKind, CompileError> {
        let line = call.span.line;
        let sig = self
            .env
            .foreign_sig(call.name)
            .cloned()
            .ok_or_else(|| CompileError::UnknownFunction {
                name: call.name.to_string(),
                line,
            })?;
        if call.args.len() != sig.params.len() {
            return Err(CompileError::WrongArity {
                name: call.name.to_string(),
                expected: sig.params.len(),
                found: call.args.len(),
                line,
            });
        }

        // Arguments land at depth, depth+1, ... in the file the signature
        // asks for; fixnums convert up to doubles, doubles never convert
        // down silently.
        for (j, arg) in call.args.iter().enumerate() {
            let want = sig.params[j];
            let have = self.expression(arg, depth + j as u32)?;
            match (want.uses_float_register(), have) {
                (true, ValueKind::Fixnum) => {
                    self.coerce(ValueKind::Fixnum, ValueKind::Flonum, depth + j as u32);
                }
                (false, ValueKind::Flonum) => {
                    return Err(CompileError::ArgTypeMismatch {
                        name: call.name.to_string(),
                        index: j,
                        line,
                    });
                }
                _ => {}
            }
        }

        // Park live variable homes that overlap the argument registers.
        // Every call site parks into its own fresh slots; nested calls
        // cost at most four extra frame words each.
        let mut saved: Vec<(ValueKind, usize, u32)> = Vec::new();
        for idx in 0..abi::MAX_FOREIGN_ARGS {
            if self.regs.is_allocated(ValueKind::Fixnum, idx) {
                let slot = self.fresh_slot();
                self.stream.push(Insn::binary(
                    Op::Mov,
                    MemRef::slot(Gpr::Rsp, slot),
                    abi::int_arg(idx),
                ));
                saved.push((ValueKind::Fixnum, idx, slot));
            }
            if self.regs.is_allocated(ValueKind::Flonum, idx) {
                let slot = self.fresh_slot();
                self.stream.push(Insn::binary(
                    Op::Movsd,
                    MemRef::slot(Gpr::Rsp, slot),
                    Reg::Fpr(abi::float_arg(idx)),
                ));
                saved.push((ValueKind::Flonum, idx, slot));
            }
        }

        // Stage the arguments into their convention registers.
        let mut nth_int = 0usize;
        let mut nth_float = 0usize;
        for (j, &want) in sig.params.iter().enumerate() {
            if want.uses_float_register() {
                let slot = abi::arg_slot(j, nth_float);
                nth_float += 1;
                let src = self.float_scratch(depth + j as u32);
                self.stream.push(Insn::binary(
                    Op::Movsd,
                    Reg::Fpr(abi::float_arg(slot)),
                    src,
                ));
            } else {
                let slot = abi::arg_slot(j, nth_int);
                nth_int += 1;
                let src = self.int_scratch(depth + j as u32);
                self.stream
                    .push(Insn::binary(Op::Mov, abi::int_arg(slot), src));
            }
        }

        self.stream.push(Insn::to_sym(Op::CallF, call.name));

        // Relocate the return value before the restores below overwrite
        // the return registers' files.
        let kind = match sig.ret {
            ForeignKind::Double => {
                let dst = self.float_scratch(depth);
                self.stream
                    .push(Insn::binary(Op::Movsd, dst, Reg::Fpr(abi::FLOAT_RETURN)));
                ValueKind::Flonum
            }
            ForeignKind::Void => {
                let dst = self.int_scratch(depth);
                self.stream
                    .push(Insn::binary(Op::Mov, dst, Operand::Imm(0)));
                ValueKind::Fixnum
            }
            _ => {
                let dst = self.int_scratch(depth);
                self.stream
                    .push(Insn::binary(Op::Mov, dst, abi::INT_RETURN));
                ValueKind::Fixnum
            }
        };

        for (vk, idx, slot) in saved {
            match vk {
                ValueKind::Fixnum => self.stream.push(Insn::binary(
                    Op::Mov,
                    abi::int_arg(idx),
                    MemRef::slot(Gpr::Rsp, slot),
                )),
                ValueKind::Flonum => self.stream.push(Insn::binary(
                    Op::Movsd,
                    Reg::Fpr(abi::float_arg(idx)),
                    MemRef::slot(Gpr::Rsp, slot),
                )),
            }
        }
        Ok(kind)
    }
}
