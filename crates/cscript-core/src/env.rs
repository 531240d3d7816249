//! The shared compilation environment.
//!
//! Globals and the foreign-function table outlive individual compilations:
//! every function compiled against the same [`Environment`] sees the
//! globals its predecessors declared, and foreign functions registered once
//! stay callable from every later script. The environment is plain mutable
//! state; sharing it across threads needs external synchronization.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::error::CompileError;
use crate::foreign::{ForeignFn, ForeignSig, IntoForeignFn};
use crate::value::{ELEMENT_WIDTH, VarKind};

/// First dispatch address handed to a registered foreign function.
///
/// Nonzero so a zeroed register never aliases a real dispatch address.
const FOREIGN_ADDR_BASE: u64 = 0x1000;

/// A global variable: byte offset into the side region addressed by the
/// globals base register, plus its declared kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Global {
    pub kind: VarKind,
    pub offset: i32,
}

/// Shared state spanning multiple sequential compilations.
#[derive(Debug, Default)]
pub struct Environment {
    globals: FxHashMap<String, Global>,
    global_mem: Vec<u8>,
    foreign_by_name: FxHashMap<String, ForeignFn>,
    foreign_by_addr: FxHashMap<u64, ForeignFn>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Globals
    // ========================================================================

    /// Declare a new global, growing the backing region.
    pub fn declare_global(
        &mut self,
        name: &str,
        kind: VarKind,
        line: u32,
    ) -> Result<Global, CompileError> {
        if self.globals.contains_key(name) {
            return Err(CompileError::RedeclaredVariable {
                name: name.to_string(),
                line,
            });
        }
        let global = Global {
            kind,
            offset: self.global_mem.len() as i32,
        };
        let bytes = kind.slot_count() as usize * ELEMENT_WIDTH as usize;
        self.global_mem.resize(self.global_mem.len() + bytes, 0);
        self.globals.insert(name.to_string(), global);
        Ok(global)
    }

    /// Look up a declared global.
    pub fn global(&self, name: &str) -> Option<Global> {
        self.globals.get(name).copied()
    }

    /// Base pointer of the global region, loaded into the globals base
    /// register before execution.
    ///
    /// Compiling may grow the region, so the pointer must be re-fetched per
    /// execution.
    pub fn globals_base(&mut self) -> *mut u8 {
        self.global_mem.as_mut_ptr()
    }

    // ========================================================================
    // Foreign functions
    // ========================================================================

    /// Register a host function under a script-visible name.
    ///
    /// The signature is derived from the closure's parameter and return
    /// types (arity 0..=4 over bool/i64/f64/usize). Re-registering a name
    /// replaces the previous entry; already-compiled scripts keep calling
    /// the version they were encoded against.
    pub fn register_foreign<F, A>(&mut self, name: &str, f: F) -> u64
    where
        F: IntoForeignFn<A>,
    {
        let sig = F::signature();
        debug_assert!(sig.params.len() <= crate::isa::abi::MAX_FOREIGN_ARGS);
        let addr = FOREIGN_ADDR_BASE + self.foreign_by_addr.len() as u64 * 8;
        let func = ForeignFn::new(name, addr, sig, f.into_callable());
        self.foreign_by_addr.insert(addr, func.clone());
        self.foreign_by_name.insert(name.to_string(), func);
        addr
    }

    /// Look up a foreign function by its script name.
    pub fn foreign(&self, name: &str) -> Option<&ForeignFn> {
        self.foreign_by_name.get(name)
    }

    /// The signature registered under a name.
    pub fn foreign_sig(&self, name: &str) -> Option<&ForeignSig> {
        self.foreign_by_name.get(name).map(|f| &f.sig)
    }

    /// Name → dispatch address map for the encoder.
    pub fn externals_by_name(&self) -> FxHashMap<String, u64> {
        self.foreign_by_name
            .iter()
            .map(|(name, f)| (name.clone(), f.addr))
            .collect()
    }

    /// Dispatch address → function map for the interpreter.
    pub fn externals_by_addr(&self) -> &FxHashMap<u64, ForeignFn> {
        &self.foreign_by_addr
    }
}

// ForeignFn clones share the callable.
impl Clone for Environment {
    fn clone(&self) -> Self {
        Self {
            globals: self.globals.clone(),
            global_mem: self.global_mem.clone(),
            foreign_by_name: self.foreign_by_name.clone(),
            foreign_by_addr: self.foreign_by_addr.clone(),
        }
    }
}

/// Convenience for registering a pre-erased callable with an explicit
/// signature (used by tests that build descriptors by hand).
impl Environment {
    pub fn register_foreign_raw(
        &mut self,
        name: &str,
        sig: ForeignSig,
        callable: Arc<crate::foreign::ForeignCallable>,
    ) -> u64 {
        let addr = FOREIGN_ADDR_BASE + self.foreign_by_addr.len() as u64 * 8;
        let func = ForeignFn::new(name, addr, sig, callable);
        self.foreign_by_addr.insert(addr, func.clone());
        self.foreign_by_name.insert(name.to_string(), func);
        addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globals_get_sequential_offsets() {
        let mut env = Environment::new();
        let a = env.declare_global("a", VarKind::Int, 1).unwrap();
        let b = env.declare_global("b", VarKind::FloatArray(3), 1).unwrap();
        let c = env.declare_global("c", VarKind::Float, 2).unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 8);
        assert_eq!(c.offset, 32);
    }

    #[test]
    fn redeclaring_a_global_fails() {
        let mut env = Environment::new();
        env.declare_global("g", VarKind::Int, 1).unwrap();
        let err = env.declare_global("g", VarKind::Float, 4).unwrap_err();
        assert_eq!(
            err,
            CompileError::RedeclaredVariable {
                name: "g".to_string(),
                line: 4
            }
        );
    }

    #[test]
    fn registration_assigns_distinct_addresses() {
        let mut env = Environment::new();
        let a = env.register_foreign("add", |a: f64, b: f64| a + b);
        let b = env.register_foreign("neg", |a: i64| -a);
        assert_ne!(a, b);
        assert_eq!(env.foreign("add").unwrap().addr, a);
        assert_eq!(env.externals_by_name()["neg"], b);
        assert!(env.externals_by_addr().contains_key(&a));
    }
}
