//! The native code generator.
//!
//! One pass over the AST appends instructions to a [`Stream`], threading a
//! [`ValueKind`] back up through every recursive compile call so callers
//! know which interpretation the just-produced word carries.
//!
//! Expression evaluation is depth-addressed: the value of a subexpression
//! at nesting depth `d` lands in the `d`-th scratch register of the file
//! matching its kind, or in the `d-2`-th spill slot below the stack
//! pointer once the three scratch registers run out. Binary nodes evaluate
//! their left side at `d` and their right side at `d+1`, then combine into
//! `d`.
//!
//! Stack-resident variables are addressed by virtual slot until the whole
//! function has been generated; a final frame pass (see [`crate::frame`])
//! rewrites slots into byte displacements once the deepest spill is known.

mod call;
mod expr;
mod stmt;

use cscript_core::env::Environment;
use cscript_core::error::CompileError;
use cscript_core::isa::abi;
use cscript_core::isa::insn::{Insn, MemRef, Operand, Stream};
use cscript_core::isa::op::Op;
use cscript_core::isa::reg::{Gpr, Reg};
use cscript_core::value::{ValueKind, VarKind};
use cscript_parser::ast::{DeclType, Param, Script};

use crate::frame;
use crate::regalloc::RegisterAllocator;
use crate::symtab::{Location, Symbol, SymbolTable};

/// A fully generated function, ready for the peephole pass and encoding.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub stream: Stream,
    /// Kind of the value left in the return register, if the final
    /// statement was a bare expression.
    pub result_kind: Option<ValueKind>,
    /// Declared parameter kinds, in order. The embedder binds arguments to
    /// the convention registers these imply.
    pub params: Vec<VarKind>,
    /// Expression-spill slots below the stack pointer.
    pub spill_slots: u32,
    /// Variable slots below the spill region.
    pub stack_slots: u32,
}

/// Generate code for a parsed script against the given environment.
pub fn compile(
    script: &Script<'_>,
    env: &mut Environment,
) -> Result<CompiledFunction, CompileError> {
    let mut r#gen = CodeGen::new(env);
    r#gen.bind_params(script.params)?;

    let last = script.body.len().checked_sub(1);
    let mut result_kind = None;
    for (i, stmt) in script.body.iter().enumerate() {
        if Some(i) == last
            && let cscript_parser::ast::Stmt::Expr(e) = stmt
        {
            // The last bare expression is the function's return value.
            let kind = r#gen.expression(&e.expr, 0)?;
            match kind {
                ValueKind::Fixnum => {
                    let src = r#gen.int_scratch(0);
                    r#gen.stream
                        .push(Insn::binary(Op::Mov, abi::INT_RETURN, src));
                }
                ValueKind::Flonum => {
                    let src = r#gen.float_scratch(0);
                    r#gen.stream
                        .push(Insn::binary(Op::Movsd, Reg::Fpr(abi::FLOAT_RETURN), src));
                }
            }
            result_kind = Some(kind);
        } else {
            r#gen.statement(stmt)?;
        }
    }
    r#gen.stream.push(Insn::nullary(Op::Ret));

    frame::resolve_slots(&mut r#gen.stream, r#gen.spill_slots);
    tracing::debug!(
        insns = r#gen.stream.len(),
        spill_slots = r#gen.spill_slots,
        stack_slots = r#gen.next_slot,
        "generated function"
    );

    Ok(CompiledFunction {
        stream: r#gen.stream,
        result_kind,
        params: r#gen.param_kinds,
        spill_slots: r#gen.spill_slots,
        stack_slots: r#gen.next_slot,
    })
}

/// Per-function generation state.
pub(crate) struct CodeGen<'env> {
    env: &'env mut Environment,
    stream: Stream,
    syms: SymbolTable,
    regs: RegisterAllocator,
    param_kinds: Vec<VarKind>,
    /// Next free virtual stack slot.
    next_slot: u32,
    /// Spill slots required by the deepest scratch depth seen so far.
    spill_slots: u32,
    next_label: u32,
}

impl<'env> CodeGen<'env> {
    fn new(env: &'env mut Environment) -> Self {
        Self {
            env,
            stream: Stream::new(),
            syms: SymbolTable::new(),
            regs: RegisterAllocator::new(),
            param_kinds: Vec::new(),
            next_slot: 0,
            spill_slots: 0,
            next_label: 0,
        }
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Bind parameters to the registers the calling convention delivers
    /// them in. Scalars keep their argument register as a permanent home;
    /// pointers are copied to a stack slot at entry.
    fn bind_params(&mut self, params: &[Param<'_>]) -> Result<(), CompileError> {
        let mut nth_int = 0usize;
        let mut nth_float = 0usize;
        for (position, param) in params.iter().enumerate() {
            let line = param.span.line;
            let kind = match (param.base, param.pointer) {
                (DeclType::Int, false) => VarKind::Int,
                (DeclType::Float, false) => VarKind::Float,
                (DeclType::Int, true) => VarKind::IntPtr,
                (DeclType::Float, true) => VarKind::FloatPtr,
            };
            let loc = if kind == VarKind::Float {
                let slot = abi::arg_slot(position, nth_float);
                nth_float += 1;
                if slot >= abi::FLOAT_POOL.len() {
                    return Err(CompileError::OutOfRegisters { line });
                }
                self.regs
                    .claim(ValueKind::Flonum, slot)
                    .map_err(|_| CompileError::OutOfRegisters { line })?;
                Location::Register(Reg::Fpr(abi::float_arg(slot)))
            } else {
                let slot = abi::arg_slot(position, nth_int);
                nth_int += 1;
                if slot >= abi::INT_POOL.len() {
                    return Err(CompileError::OutOfRegisters { line });
                }
                if kind == VarKind::Int {
                    self.regs
                        .claim(ValueKind::Fixnum, slot)
                        .map_err(|_| CompileError::OutOfRegisters { line })?;
                    Location::Register(Reg::Gpr(abi::int_arg(slot)))
                } else {
                    // Pointers are memory-resident: spill the incoming
                    // address so the argument register frees up.
                    let home = self.fresh_slot();
                    self.stream.push(Insn::binary(
                        Op::Mov,
                        MemRef::slot(Gpr::Rsp, home),
                        abi::int_arg(slot),
                    ));
                    Location::Slot(home)
                }
            };
            self.syms.declare(param.name, Symbol { kind, loc }, line)?;
            self.param_kinds.push(kind);
        }
        Ok(())
    }

    // ========================================================================
    // Scratch and slots
    // ========================================================================

    /// Integer scratch operand for a nesting depth.
    fn int_scratch(&mut self, depth: u32) -> Operand {
        if (depth as usize) < abi::GPR_SCRATCH.len() {
            Operand::Reg(Reg::Gpr(abi::GPR_SCRATCH[depth as usize]))
        } else {
            self.note_spill(depth);
            Operand::Mem(MemRef::bytes(Gpr::Rsp, frame::spill_disp(depth)))
        }
    }

    /// Float scratch operand for a nesting depth. Spilled depths share the
    /// integer file's slot; only one kind occupies a depth at a time.
    fn float_scratch(&mut self, depth: u32) -> Operand {
        if (depth as usize) < abi::FPR_SCRATCH.len() {
            Operand::Reg(Reg::Fpr(abi::FPR_SCRATCH[depth as usize]))
        } else {
            self.note_spill(depth);
            Operand::Mem(MemRef::bytes(Gpr::Rsp, frame::spill_disp(depth)))
        }
    }

    /// Scratch operand of the file matching a kind.
    fn scratch(&mut self, kind: ValueKind, depth: u32) -> Operand {
        match kind {
            ValueKind::Fixnum => self.int_scratch(depth),
            ValueKind::Flonum => self.float_scratch(depth),
        }
    }

    fn note_spill(&mut self, depth: u32) {
        self.spill_slots = self.spill_slots.max(depth - 2);
    }

    /// Claim a new virtual stack slot.
    fn fresh_slot(&mut self) -> u32 {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    fn new_label(&mut self) -> String {
        let label = format!("L{}", self.next_label);
        self.next_label += 1;
        label
    }

    // ========================================================================
    // Kind conversion
    // ========================================================================

    /// Convert the value at `depth` between interpretations, in place.
    fn coerce(&mut self, from: ValueKind, to: ValueKind, depth: u32) {
        match (from, to) {
            (ValueKind::Fixnum, ValueKind::Flonum) => {
                let dst = self.float_scratch(depth);
                let src = self.int_scratch(depth);
                self.stream.push(Insn::binary(Op::Cvtsi2sd, dst, src));
            }
            (ValueKind::Flonum, ValueKind::Fixnum) => {
                let dst = self.int_scratch(depth);
                let src = self.float_scratch(depth);
                self.stream.push(Insn::binary(Op::Cvttsd2si, dst, src));
            }
            _ => {}
        }
    }

    /// Location as an instruction operand.
    fn loc_operand(loc: Location) -> Operand {
        match loc {
            Location::Register(reg) => Operand::Reg(reg),
            Location::Slot(slot) => Operand::Mem(MemRef::slot(Gpr::Rsp, slot)),
        }
    }
}
