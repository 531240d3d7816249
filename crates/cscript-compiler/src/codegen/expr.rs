//! Expression generation: the four precedence levels.
//!
//! Each level compiles its left operand at the current depth and its right
//! operand one deeper, then combines into the current depth. Left-leaning
//! chains therefore evaluate at a flat depth; only right-nested and
//! parenthesized subtrees descend.

use cscript_core::error::CompileError;
use cscript_core::isa::abi;
use cscript_core::isa::insn::{Insn, MemRef, Operand};
use cscript_core::isa::op::Op;
use cscript_core::isa::reg::Gpr;
use cscript_core::value::{ELEMENT_WIDTH, ValueKind};
use cscript_parser::ast::{BinaryOp, Expr, IndexExpr, NameExpr, NegExpr};

use super::CodeGen;
use crate::symtab::Location;

impl CodeGen<'_> {
    /// Level 1: relational chains. Comparisons normalize to a 0/1 fixnum.
    pub(crate) fn expression(
        &mut self,
        expr: &Expr<'_>,
        depth: u32,
    ) -> Result<ValueKind, CompileError> {
        if let Expr::Binary(b) = expr
            && b.op.is_comparison()
        {
            let lk = self.expression(&b.lhs, depth)?;
            let rk = self.relation(&b.rhs, depth + 1)?;
            return self.comparison(b.op, lk, rk, depth);
        }
        self.relation(expr, depth)
    }

    /// Level 2: additive chains.
    fn relation(&mut self, expr: &Expr<'_>, depth: u32) -> Result<ValueKind, CompileError> {
        if let Expr::Binary(b) = expr
            && matches!(b.op, BinaryOp::Add | BinaryOp::Sub)
        {
            let lk = self.relation(&b.lhs, depth)?;
            let rk = self.term(&b.rhs, depth + 1)?;
            return self.arithmetic(b.op, lk, rk, depth, b.span.line);
        }
        self.term(expr, depth)
    }

    /// Level 3: multiplicative chains.
    fn term(&mut self, expr: &Expr<'_>, depth: u32) -> Result<ValueKind, CompileError> {
        if let Expr::Binary(b) = expr
            && matches!(b.op, BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem)
        {
            let lk = self.term(&b.lhs, depth)?;
            let rk = self.factor(&b.rhs, depth + 1)?;
            return self.arithmetic(b.op, lk, rk, depth, b.span.line);
        }
        self.factor(expr, depth)
    }

    /// Level 4: leaves, unary minus, calls, and parenthesized subtrees.
    fn factor(&mut self, expr: &Expr<'_>, depth: u32) -> Result<ValueKind, CompileError> {
        match expr {
            Expr::IntLit(lit) => {
                let dst = self.int_scratch(depth);
                self.stream
                    .push(Insn::binary(Op::Mov, dst, Operand::Imm(lit.value)));
                Ok(ValueKind::Fixnum)
            }
            Expr::FloatLit(lit) => {
                self.float_immediate(lit.value, depth);
                Ok(ValueKind::Flonum)
            }
            Expr::Var(name) => self.load_var(name, depth),
            Expr::Global(name) => self.load_global(name, depth),
            Expr::Index(index) => self.load_elem(index, depth),
            Expr::Deref(name) => self.load_deref(name, depth),
            Expr::Call(call) => self.foreign_call(call, depth),
            Expr::Neg(neg) => self.negate(neg, depth),
            // Parenthesized subexpression: restart at the top level.
            Expr::Binary(_) => self.expression(expr, depth),
        }
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn arithmetic(
        &mut self,
        op: BinaryOp,
        lk: ValueKind,
        rk: ValueKind,
        depth: u32,
        line: u32,
    ) -> Result<ValueKind, CompileError> {
        let kind = ValueKind::promote(lk, rk);
        if kind.is_float() {
            if op == BinaryOp::Rem {
                return Err(CompileError::FloatRemainder { line });
            }
            self.coerce(lk, ValueKind::Flonum, depth);
            self.coerce(rk, ValueKind::Flonum, depth + 1);
            let opcode = match op {
                BinaryOp::Add => Op::Addsd,
                BinaryOp::Sub => Op::Subsd,
                BinaryOp::Mul => Op::Mulsd,
                BinaryOp::Div => Op::Divsd,
                _ => unreachable!("not an arithmetic operator"),
            };
            let dst = self.float_scratch(depth);
            let src = self.float_scratch(depth + 1);
            self.stream.push(Insn::binary(opcode, dst, src));
            Ok(ValueKind::Flonum)
        } else {
            let opcode = match op {
                BinaryOp::Add => Op::Add,
                BinaryOp::Sub => Op::Sub,
                BinaryOp::Mul => Op::Imul,
                BinaryOp::Div => Op::Idiv,
                BinaryOp::Rem => Op::Irem,
                _ => unreachable!("not an arithmetic operator"),
            };
            let dst = self.int_scratch(depth);
            let src = self.int_scratch(depth + 1);
            self.stream.push(Insn::binary(opcode, dst, src));
            Ok(ValueKind::Fixnum)
        }
    }

    /// Normalize a comparison to a 0/1 fixnum at `depth`.
    fn comparison(
        &mut self,
        op: BinaryOp,
        lk: ValueKind,
        rk: ValueKind,
        depth: u32,
    ) -> Result<ValueKind, CompileError> {
        if lk.is_float() || rk.is_float() {
            self.coerce(lk, ValueKind::Flonum, depth);
            self.coerce(rk, ValueKind::Flonum, depth + 1);
            let dst = self.float_scratch(depth);
            let src = self.float_scratch(depth + 1);
            self.stream
                .push(Insn::binary(Self::float_predicate(op), dst, src));
            let mask_dst = self.int_scratch(depth);
            self.stream.push(Insn::binary(Op::Movmskpd, mask_dst, dst));
        } else {
            let dst = self.int_scratch(depth);
            let src = self.int_scratch(depth + 1);
            self.stream.push(Insn::binary(Op::Cmp, dst, src));
            self.stream.push(Insn::unary(Self::set_cc(op), dst));
        }
        Ok(ValueKind::Fixnum)
    }

    /// The packed-compare opcode whose mask bit is 1 when `op` holds.
    pub(super) fn float_predicate(op: BinaryOp) -> Op {
        match op {
            BinaryOp::Lt => Op::Cmpltsd,
            BinaryOp::Le => Op::Cmplesd,
            BinaryOp::Gt => Op::Cmpnlesd,
            BinaryOp::Ge => Op::Cmpnltsd,
            BinaryOp::Eq => Op::Cmpeqsd,
            BinaryOp::Ne => Op::Cmpneqsd,
            _ => unreachable!("not a comparison"),
        }
    }

    fn set_cc(op: BinaryOp) -> Op {
        match op {
            BinaryOp::Lt => Op::Setl,
            BinaryOp::Le => Op::Setle,
            BinaryOp::Gt => Op::Setg,
            BinaryOp::Ge => Op::Setge,
            BinaryOp::Eq => Op::Sete,
            BinaryOp::Ne => Op::Setne,
            _ => unreachable!("not a comparison"),
        }
    }

    fn negate(&mut self, neg: &NegExpr<'_>, depth: u32) -> Result<ValueKind, CompileError> {
        let kind = self.factor(&neg.operand, depth)?;
        if kind.is_float() {
            // No float negate opcode: multiply by -1.0 staged one deeper.
            self.float_immediate(-1.0, depth + 1);
            let dst = self.float_scratch(depth);
            let src = self.float_scratch(depth + 1);
            self.stream.push(Insn::binary(Op::Mulsd, dst, src));
        } else {
            let dst = self.int_scratch(depth);
            self.stream.push(Insn::unary(Op::Neg, dst));
        }
        Ok(kind)
    }

    // ========================================================================
    // Loads
    // ========================================================================

    /// Stage a flonum bit pattern through the address scratch into the
    /// float scratch at `depth`.
    pub(crate) fn float_immediate(&mut self, value: f64, depth: u32) {
        self.stream.push(Insn::binary(
            Op::Mov,
            abi::ADDR_SCRATCH,
            Operand::Imm(value.to_bits() as i64),
        ));
        let dst = self.float_scratch(depth);
        self.stream
            .push(Insn::binary(Op::Movq, dst, abi::ADDR_SCRATCH));
    }

    fn load_var(&mut self, name: &NameExpr<'_>, depth: u32) -> Result<ValueKind, CompileError> {
        let line = name.span.line;
        let sym = self.syms.lookup(name.name, line)?;
        if sym.kind.is_indexable() && !sym.kind.is_pointer() {
            return Err(CompileError::NotAScalar {
                name: name.name.to_string(),
                line,
            });
        }
        let src = Self::loc_operand(sym.loc);
        // A bare pointer name reads the address itself, a fixnum.
        if sym.kind.is_pointer() || !sym.kind.element_kind().is_float() {
            let dst = self.int_scratch(depth);
            self.stream.push(Insn::binary(Op::Mov, dst, src));
            Ok(ValueKind::Fixnum)
        } else {
            let dst = self.float_scratch(depth);
            self.stream.push(Insn::binary(Op::Movsd, dst, src));
            Ok(ValueKind::Flonum)
        }
    }

    fn load_global(&mut self, name: &NameExpr<'_>, depth: u32) -> Result<ValueKind, CompileError> {
        let line = name.span.line;
        let global =
            self.env
                .global(name.name)
                .ok_or_else(|| CompileError::UndeclaredVariable {
                    name: name.name.to_string(),
                    line,
                })?;
        if global.kind.is_indexable() && !global.kind.is_pointer() {
            return Err(CompileError::NotAScalar {
                name: name.name.to_string(),
                line,
            });
        }
        let src = MemRef::bytes(abi::GLOBALS_BASE, global.offset);
        if global.kind.is_pointer() || !global.kind.element_kind().is_float() {
            let dst = self.int_scratch(depth);
            self.stream.push(Insn::binary(Op::Mov, dst, src));
            Ok(ValueKind::Fixnum)
        } else {
            let dst = self.float_scratch(depth);
            self.stream.push(Insn::binary(Op::Movsd, dst, src));
            Ok(ValueKind::Flonum)
        }
    }

    fn load_elem(&mut self, index: &IndexExpr<'_>, depth: u32) -> Result<ValueKind, CompileError> {
        let line = index.span.line;
        let (name, global) = match index.base {
            Expr::Var(n) => (n.name, false),
            Expr::Global(n) => (n.name, true),
            Expr::Index(_) => return Err(CompileError::MultiDimArray { line }),
            _ => {
                return Err(CompileError::NotIndexable {
                    name: "expression".to_string(),
                    line,
                });
            }
        };
        let (mem, kind) = self.elem_address(name, global, &index.index, depth, line)?;
        match kind {
            ValueKind::Fixnum => {
                let dst = self.int_scratch(depth);
                self.stream.push(Insn::binary(Op::Mov, dst, mem));
            }
            ValueKind::Flonum => {
                let dst = self.float_scratch(depth);
                self.stream.push(Insn::binary(Op::Movsd, dst, mem));
            }
        }
        Ok(kind)
    }

    fn load_deref(&mut self, name: &NameExpr<'_>, depth: u32) -> Result<ValueKind, CompileError> {
        let (mem, kind) = self.deref_address(name.name, name.span.line)?;
        match kind {
            ValueKind::Fixnum => {
                let dst = self.int_scratch(depth);
                self.stream.push(Insn::binary(Op::Mov, dst, mem));
            }
            ValueKind::Flonum => {
                let dst = self.float_scratch(depth);
                self.stream.push(Insn::binary(Op::Movsd, dst, mem));
            }
        }
        Ok(kind)
    }

    // ========================================================================
    // Addressing
    // ========================================================================

    /// Compute an element address into the address scratch.
    ///
    /// The index expression is evaluated at `idx_depth`; callers storing a
    /// value pass a depth above the pending value's. The returned operand
    /// is `[r12 + base-disp]` and stays valid until the next address
    /// computation or float immediate.
    pub(crate) fn elem_address(
        &mut self,
        name: &str,
        global: bool,
        index: &Expr<'_>,
        idx_depth: u32,
        line: u32,
    ) -> Result<(MemRef, ValueKind), CompileError> {
        // Home of the base: the pointer's value operand, or the array's
        // element-0 location.
        enum Base {
            LocalArray(u32),
            GlobalArray(i32),
            Pointer(Operand),
        }

        let (kind, base) = if global {
            let g = self
                .env
                .global(name)
                .ok_or_else(|| CompileError::UndeclaredVariable {
                    name: name.to_string(),
                    line,
                })?;
            let base = if g.kind.is_pointer() {
                Base::Pointer(Operand::Mem(MemRef::bytes(abi::GLOBALS_BASE, g.offset)))
            } else {
                Base::GlobalArray(g.offset)
            };
            (g.kind, base)
        } else {
            let sym = self.syms.lookup(name, line)?;
            let base = match (sym.kind.is_pointer(), sym.loc) {
                (true, loc) => Base::Pointer(Self::loc_operand(loc)),
                (false, Location::Slot(slot)) => Base::LocalArray(slot),
                // Scalars are caught by the indexable check below.
                (false, Location::Register(r)) => Base::Pointer(Operand::Reg(r)),
            };
            (sym.kind, base)
        };
        if !kind.is_indexable() {
            return Err(CompileError::NotIndexable {
                name: name.to_string(),
                line,
            });
        }

        let ik = self.expression(index, idx_depth)?;
        self.coerce(ik, ValueKind::Fixnum, idx_depth);
        let idx = self.int_scratch(idx_depth);
        self.stream
            .push(Insn::binary(Op::Mov, abi::ADDR_SCRATCH, idx));
        self.stream.push(Insn::binary(
            Op::Imul,
            abi::ADDR_SCRATCH,
            Operand::Imm(ELEMENT_WIDTH),
        ));

        let mem = match base {
            Base::Pointer(home) => {
                self.stream
                    .push(Insn::binary(Op::Add, abi::ADDR_SCRATCH, home));
                MemRef::bytes(abi::ADDR_SCRATCH, 0)
            }
            Base::LocalArray(slot) => {
                // Scale relative to the stack pointer, displace by
                // element 0's slot.
                self.stream
                    .push(Insn::binary(Op::Add, abi::ADDR_SCRATCH, Gpr::Rsp));
                MemRef::slot(abi::ADDR_SCRATCH, slot)
            }
            Base::GlobalArray(offset) => {
                self.stream
                    .push(Insn::binary(Op::Add, abi::ADDR_SCRATCH, abi::GLOBALS_BASE));
                MemRef::bytes(abi::ADDR_SCRATCH, offset)
            }
        };
        Ok((mem, kind.element_kind()))
    }

    /// Load a pointer's target address into the address scratch.
    pub(crate) fn deref_address(
        &mut self,
        name: &str,
        line: u32,
    ) -> Result<(MemRef, ValueKind), CompileError> {
        let sym = self.syms.lookup(name, line)?;
        if !sym.kind.is_pointer() {
            return Err(CompileError::NotAPointer {
                name: name.to_string(),
                line,
            });
        }
        self.stream.push(Insn::binary(
            Op::Mov,
            abi::ADDR_SCRATCH,
            Self::loc_operand(sym.loc),
        ));
        Ok((
            MemRef::bytes(abi::ADDR_SCRATCH, 0),
            sym.kind.element_kind(),
        ))
    }
}
