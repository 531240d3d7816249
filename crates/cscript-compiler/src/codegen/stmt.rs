//! Statement generation: declarations, stores, control flow.
//!
//! `if` and `for` conditions compile as a compare followed by an inverse
//! conditional branch to the exit, never through the normalized 0/1 form.

use cscript_core::error::CompileError;
use cscript_core::isa::abi;
use cscript_core::isa::insn::{Insn, Label, MemRef, Operand};
use cscript_core::isa::op::Op;
use cscript_core::isa::reg::Reg;
use cscript_core::value::{ValueKind, VarKind};
use cscript_parser::ast::{
    AssignOp, AssignStmt, BinaryOp, DeclType, Expr, ForStmt, IfStmt, IncDecStmt, Place, Stmt,
    VarDeclStmt,
};

use super::CodeGen;
use crate::regalloc::RegisterAllocator;
use crate::symtab::{Location, Symbol};

impl CodeGen<'_> {
    pub(crate) fn statement(&mut self, stmt: &Stmt<'_>) -> Result<(), CompileError> {
        match stmt {
            Stmt::VarDecl(decl) => self.var_decl(decl),
            Stmt::Assign(assign) => self.assign(assign),
            Stmt::IncDec(incdec) => self.inc_dec(incdec),
            Stmt::If(cond) => self.if_stmt(cond),
            Stmt::For(lp) => self.for_stmt(lp),
            Stmt::Expr(e) => {
                self.expression(&e.expr, 0)?;
                Ok(())
            }
        }
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    fn var_decl(&mut self, decl: &VarDeclStmt<'_>) -> Result<(), CompileError> {
        let line = decl.span.line;
        let kind = Self::decl_kind(decl)?;

        if decl.global {
            let global = self.env.declare_global(decl.name, kind, line)?;
            if let Some(init) = decl.init {
                if kind.slot_count() > 1 {
                    return Err(CompileError::NotAScalar {
                        name: decl.name.to_string(),
                        line,
                    });
                }
                let store_kind = Self::stored_kind(kind);
                let vk = self.expression(&init, 0)?;
                self.coerce(vk, store_kind, 0);
                self.store(
                    Operand::Mem(MemRef::bytes(abi::GLOBALS_BASE, global.offset)),
                    store_kind,
                );
            }
            return Ok(());
        }

        let loc = if !kind.is_memory_resident() && self.regs.is_free(kind.element_kind()) {
            let idx = self
                .regs
                .allocate_next(kind.element_kind())
                .map_err(|_| CompileError::OutOfRegisters { line })?;
            Location::Register(RegisterAllocator::physical(kind.element_kind(), idx))
        } else {
            // Element 0 takes the highest slot index: resolved slots grow
            // downward, so elements ascend in memory from there.
            let count = kind.slot_count();
            let base = self.next_slot + count - 1;
            self.next_slot += count;
            Location::Slot(base)
        };
        self.syms.declare(decl.name, Symbol { kind, loc }, line)?;

        if let Some(init) = decl.init {
            if kind.slot_count() > 1 {
                return Err(CompileError::NotAScalar {
                    name: decl.name.to_string(),
                    line,
                });
            }
            let store_kind = Self::stored_kind(kind);
            let vk = self.expression(&init, 0)?;
            self.coerce(vk, store_kind, 0);
            self.store(Self::loc_operand(loc), store_kind);
        }
        Ok(())
    }

    fn decl_kind(decl: &VarDeclStmt<'_>) -> Result<VarKind, CompileError> {
        let line = decl.span.line;
        if decl.sizes.len() > 1 || (decl.pointer && !decl.sizes.is_empty()) {
            return Err(CompileError::MultiDimArray { line });
        }
        if decl.sizes.is_empty() {
            return Ok(match (decl.base, decl.pointer) {
                (DeclType::Int, false) => VarKind::Int,
                (DeclType::Float, false) => VarKind::Float,
                (DeclType::Int, true) => VarKind::IntPtr,
                (DeclType::Float, true) => VarKind::FloatPtr,
            });
        }
        let Expr::IntLit(lit) = decl.sizes[0] else {
            return Err(CompileError::NonConstArraySize { line });
        };
        if lit.value <= 0 || lit.value > u32::MAX as i64 {
            return Err(CompileError::NonConstArraySize { line });
        }
        Ok(match decl.base {
            DeclType::Int => VarKind::IntArray(lit.value as u32),
            DeclType::Float => VarKind::FloatArray(lit.value as u32),
        })
    }

    /// Kind of the word actually stored in a variable's home. Pointers
    /// hold an address, a fixnum, whatever they point at.
    fn stored_kind(kind: VarKind) -> ValueKind {
        if kind.is_pointer() {
            ValueKind::Fixnum
        } else {
            kind.element_kind()
        }
    }

    // ========================================================================
    // Stores
    // ========================================================================

    fn assign(&mut self, stmt: &AssignStmt<'_>) -> Result<(), CompileError> {
        let line = stmt.span.line;
        let vk = self.expression(&stmt.value, 0)?;
        let (target, tk) = self.resolve_place(&stmt.place, line)?;
        self.coerce(vk, tk, 0);
        match stmt.op {
            AssignOp::Set => self.store(target, tk),
            AssignOp::Add | AssignOp::Sub | AssignOp::Mul | AssignOp::Div => {
                self.compound(target, tk, stmt.op);
            }
        }
        Ok(())
    }

    /// Resolve a place to its operand and stored kind. Element targets
    /// evaluate their index at depth 1, above the pending value.
    fn resolve_place(
        &mut self,
        place: &Place<'_>,
        line: u32,
    ) -> Result<(Operand, ValueKind), CompileError> {
        match place {
            Place::Var(name) => {
                let sym = self.syms.lookup(name, line)?;
                if sym.kind.is_indexable() && !sym.kind.is_pointer() {
                    return Err(CompileError::NotAScalar {
                        name: name.to_string(),
                        line,
                    });
                }
                Ok((Self::loc_operand(sym.loc), Self::stored_kind(sym.kind)))
            }
            Place::Global(name) => {
                let global =
                    self.env
                        .global(name)
                        .ok_or_else(|| CompileError::UndeclaredVariable {
                            name: name.to_string(),
                            line,
                        })?;
                if global.kind.is_indexable() && !global.kind.is_pointer() {
                    return Err(CompileError::NotAScalar {
                        name: name.to_string(),
                        line,
                    });
                }
                Ok((
                    Operand::Mem(MemRef::bytes(abi::GLOBALS_BASE, global.offset)),
                    Self::stored_kind(global.kind),
                ))
            }
            Place::Elem {
                name,
                global,
                index,
            } => {
                let (mem, kind) = self.elem_address(name, *global, index, 1, line)?;
                Ok((Operand::Mem(mem), kind))
            }
            Place::Deref(name) => {
                let (mem, kind) = self.deref_address(name, line)?;
                Ok((Operand::Mem(mem), kind))
            }
        }
    }

    /// Plain store of the depth-0 value.
    fn store(&mut self, target: Operand, kind: ValueKind) {
        match kind {
            ValueKind::Fixnum => {
                let src = self.int_scratch(0);
                self.stream.push(Insn::binary(Op::Mov, target, src));
            }
            ValueKind::Flonum => {
                let src = self.float_scratch(0);
                self.stream.push(Insn::binary(Op::Movsd, target, src));
            }
        }
    }

    /// Read-modify-write store. Fixnum targets take the ALU op directly;
    /// flonum memory targets bounce through the depth-1 float scratch.
    fn compound(&mut self, target: Operand, kind: ValueKind, op: AssignOp) {
        match kind {
            ValueKind::Fixnum => {
                let opcode = match op {
                    AssignOp::Add => Op::Add,
                    AssignOp::Sub => Op::Sub,
                    AssignOp::Mul => Op::Imul,
                    AssignOp::Div => Op::Idiv,
                    AssignOp::Set => unreachable!("plain store"),
                };
                let src = self.int_scratch(0);
                self.stream.push(Insn::binary(opcode, target, src));
            }
            ValueKind::Flonum => {
                let opcode = match op {
                    AssignOp::Add => Op::Addsd,
                    AssignOp::Sub => Op::Subsd,
                    AssignOp::Mul => Op::Mulsd,
                    AssignOp::Div => Op::Divsd,
                    AssignOp::Set => unreachable!("plain store"),
                };
                let value = self.float_scratch(0);
                if matches!(target, Operand::Reg(_)) {
                    self.stream.push(Insn::binary(opcode, target, value));
                } else {
                    let tmp = self.float_scratch(1);
                    self.stream.push(Insn::binary(Op::Movsd, tmp, target));
                    self.stream.push(Insn::binary(opcode, tmp, value));
                    self.stream.push(Insn::binary(Op::Movsd, target, tmp));
                }
            }
        }
    }

    fn inc_dec(&mut self, stmt: &IncDecStmt<'_>) -> Result<(), CompileError> {
        let line = stmt.span.line;
        // Stage the flonum step before the address computation claims the
        // address scratch. Fixnum targets take an immediate instead.
        let needs_float = self.place_kind(&stmt.place, line)? == ValueKind::Flonum;
        if needs_float {
            self.float_immediate(if stmt.increment { 1.0 } else { -1.0 }, 0);
        }
        let (target, kind) = self.resolve_place(&stmt.place, line)?;
        match kind {
            ValueKind::Fixnum => {
                let opcode = if stmt.increment { Op::Add } else { Op::Sub };
                self.stream
                    .push(Insn::binary(opcode, target, Operand::Imm(1)));
                // The result value, for expression-position use. Dead at
                // statement level; the `for` increment strips it.
                let dst = self.int_scratch(0);
                self.stream.push(Insn::binary(Op::Mov, dst, target));
            }
            ValueKind::Flonum => {
                let step = self.float_scratch(0);
                if matches!(target, Operand::Reg(_)) {
                    self.stream.push(Insn::binary(Op::Addsd, target, step));
                } else {
                    let tmp = self.float_scratch(1);
                    self.stream.push(Insn::binary(Op::Movsd, tmp, target));
                    self.stream.push(Insn::binary(Op::Addsd, tmp, step));
                    self.stream.push(Insn::binary(Op::Movsd, target, tmp));
                }
                let dst = self.float_scratch(0);
                self.stream.push(Insn::binary(Op::Movsd, dst, target));
            }
        }
        Ok(())
    }

    /// Stored kind of a place without generating any code.
    fn place_kind(&mut self, place: &Place<'_>, line: u32) -> Result<ValueKind, CompileError> {
        let kind = match place {
            Place::Var(name) | Place::Deref(name) => self.syms.lookup(name, line)?.kind,
            Place::Global(name) => {
                self.env
                    .global(name)
                    .ok_or_else(|| CompileError::UndeclaredVariable {
                        name: name.to_string(),
                        line,
                    })?
                    .kind
            }
            Place::Elem { name, global, .. } => {
                if *global {
                    self.env
                        .global(name)
                        .ok_or_else(|| CompileError::UndeclaredVariable {
                            name: name.to_string(),
                            line,
                        })?
                        .kind
                } else {
                    self.syms.lookup(name, line)?.kind
                }
            }
        };
        Ok(match place {
            Place::Var(_) | Place::Global(_) => Self::stored_kind(kind),
            Place::Elem { .. } | Place::Deref(_) => kind.element_kind(),
        })
    }

    // ========================================================================
    // Control flow
    // ========================================================================

    fn if_stmt(&mut self, stmt: &IfStmt<'_>) -> Result<(), CompileError> {
        let line = stmt.span.line;
        match stmt.else_body {
            None => {
                let end = self.new_label();
                self.branch_unless(&stmt.cond, &end, line)?;
                for s in stmt.then_body {
                    self.statement(s)?;
                }
                self.stream.open_block(Label::new(end));
            }
            Some(else_body) => {
                let else_label = self.new_label();
                let end = self.new_label();
                self.branch_unless(&stmt.cond, &else_label, line)?;
                for s in stmt.then_body {
                    self.statement(s)?;
                }
                self.stream.push(Insn::to_sym(Op::Jmp, end.clone()));
                self.stream.open_block(Label::new(else_label));
                for s in else_body {
                    self.statement(s)?;
                }
                self.stream.open_block(Label::new(end));
            }
        }
        Ok(())
    }

    fn for_stmt(&mut self, stmt: &ForStmt<'_>) -> Result<(), CompileError> {
        let line = stmt.span.line;
        if let Some(init) = &stmt.init {
            self.statement(init)?;
        }
        let top = self.new_label();
        let exit = self.new_label();
        self.stream.open_block(Label::new(top.clone()));
        self.branch_unless(&stmt.cond, &exit, line)?;
        for s in stmt.body {
            self.statement(s)?;
        }
        if let Some(inc) = &stmt.inc {
            self.statement(inc)?;
            self.strip_dead_result();
        }
        self.stream.push(Insn::to_sym(Op::Jmp, top));
        self.stream.open_block(Label::new(exit));
        Ok(())
    }

    /// Compile a condition as a compare plus a branch to `target` taken
    /// when the comparison fails.
    fn branch_unless(
        &mut self,
        cond: &Expr<'_>,
        target: &str,
        line: u32,
    ) -> Result<(), CompileError> {
        let Expr::Binary(b) = cond else {
            return Err(CompileError::NonBooleanCondition { line });
        };
        if !b.op.is_comparison() {
            return Err(CompileError::NonBooleanCondition { line });
        }
        let lk = self.expression(&b.lhs, 0)?;
        let rk = self.expression(&b.rhs, 1)?;
        if lk.is_float() || rk.is_float() {
            self.coerce(lk, ValueKind::Flonum, 0);
            self.coerce(rk, ValueKind::Flonum, 1);
            let dst = self.float_scratch(0);
            let src = self.float_scratch(1);
            self.stream
                .push(Insn::binary(Self::float_predicate(b.op), dst, src));
            let mask = self.int_scratch(0);
            self.stream.push(Insn::binary(Op::Movmskpd, mask, dst));
            self.stream
                .push(Insn::binary(Op::Cmp, mask, Operand::Imm(0)));
            self.stream.push(Insn::to_sym(Op::Je, target));
        } else {
            let dst = self.int_scratch(0);
            let src = self.int_scratch(1);
            self.stream.push(Insn::binary(Op::Cmp, dst, src));
            self.stream
                .push(Insn::to_sym(Self::inverse_jump(b.op), target));
        }
        Ok(())
    }

    /// Branch taken when the comparison does not hold.
    fn inverse_jump(op: BinaryOp) -> Op {
        match op {
            BinaryOp::Lt => Op::Jge,
            BinaryOp::Le => Op::Jg,
            BinaryOp::Gt => Op::Jle,
            BinaryOp::Ge => Op::Jl,
            BinaryOp::Eq => Op::Jne,
            BinaryOp::Ne => Op::Je,
            _ => unreachable!("not a comparison"),
        }
    }

    /// Drop a trailing load of a statement's unused result value.
    fn strip_dead_result(&mut self) {
        let dead = self.stream.last().is_some_and(|insn| {
            matches!(insn.op, Op::Mov | Op::Movsd)
                && insn.dst.and_then(Operand::as_reg).is_some_and(|r| {
                    r == Reg::Gpr(abi::GPR_SCRATCH[0]) || r == Reg::Fpr(abi::FPR_SCRATCH[0])
                })
        });
        if dead {
            self.stream.pop();
        }
    }
}
