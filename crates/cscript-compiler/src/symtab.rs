//! The symbol table: one flat scope per function.
//!
//! cscript has no block scoping; a name declared anywhere in the function
//! body is visible everywhere after its declaration and may not be
//! redeclared. Globals live in the [`Environment`](cscript_core::Environment)
//! instead and are reached through the `$` prefix.

use rustc_hash::FxHashMap;

use cscript_core::VarKind;
use cscript_core::error::CompileError;
use cscript_core::isa::reg::Reg;

/// Where a variable's value lives.
///
/// Register homes are scalars that won a pool register. Slot homes are
/// virtual stack slots; for arrays the recorded slot is element 0 and the
/// remaining elements sit at ascending addresses above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Register(Reg),
    Slot(u32),
}

/// A declared local variable or parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Symbol {
    pub kind: VarKind,
    pub loc: Location,
}

/// Name → symbol map for one function compilation.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: FxHashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a declaration, rejecting duplicates.
    pub fn declare(&mut self, name: &str, symbol: Symbol, line: u32) -> Result<(), CompileError> {
        if self.symbols.contains_key(name) {
            return Err(CompileError::RedeclaredVariable {
                name: name.to_string(),
                line,
            });
        }
        self.symbols.insert(name.to_string(), symbol);
        Ok(())
    }

    /// Look up a name, reporting the use line on failure.
    pub fn lookup(&self, name: &str, line: u32) -> Result<Symbol, CompileError> {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::UndeclaredVariable {
                name: name.to_string(),
                line,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cscript_core::isa::reg::Gpr;

    #[test]
    fn declared_names_are_found() {
        let mut syms = SymbolTable::new();
        let sym = Symbol {
            kind: VarKind::Int,
            loc: Location::Register(Reg::Gpr(Gpr::R14)),
        };
        syms.declare("i", sym, 1).unwrap();
        assert_eq!(syms.lookup("i", 2).unwrap(), sym);
    }

    #[test]
    fn duplicate_declaration_is_rejected() {
        let mut syms = SymbolTable::new();
        let sym = Symbol {
            kind: VarKind::Int,
            loc: Location::Slot(0),
        };
        syms.declare("x", sym, 1).unwrap();
        let err = syms.declare("x", sym, 3).unwrap_err();
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn unknown_names_report_the_use_line() {
        let syms = SymbolTable::new();
        let err = syms.lookup("missing", 9).unwrap_err();
        assert_eq!(
            err,
            CompileError::UndeclaredVariable {
                name: "missing".to_string(),
                line: 9
            }
        );
    }
}
