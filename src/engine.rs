//! The embedding facade: compile a source string against an
//! [`Environment`], run the result with typed arguments.

use bumpalo::Bump;
use rustc_hash::FxHashMap;

use cscript_core::error::{CScriptError, CompileError};
use cscript_core::foreign::ForeignFn;
use cscript_core::isa::abi;
use cscript_core::value::{ValueKind, VarKind};
use cscript_core::Environment;
use cscript_vm::RegisterFile;

/// An argument or result value at the embedding boundary.
///
/// Pointer parameters take the target's address as an `Int`; see
/// [`Script::run`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
}

impl Value {
    /// The integer this value converts to (floats truncate).
    pub fn as_int(self) -> i64 {
        match self {
            Value::Int(v) => v,
            Value::Float(v) => v as i64,
        }
    }

    /// The double this value converts to.
    pub fn as_float(self) -> f64 {
        match self {
            Value::Int(v) => v as f64,
            Value::Float(v) => v,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

/// A compiled, encoded script, reusable across many runs.
///
/// Compilation binds foreign calls to the dispatch addresses registered
/// at compile time; functions registered later are invisible to it.
#[derive(Debug, Clone)]
pub struct Script {
    code: Vec<u8>,
    result_kind: Option<ValueKind>,
    params: Vec<VarKind>,
}

/// Compile source against an environment.
///
/// The environment accumulates any `$globals` the script declares, so
/// later compilations can reference them.
pub fn compile(source: &str, env: &mut Environment) -> Result<Script, CScriptError> {
    let arena = Bump::new();
    let script = cscript_parser::Parser::parse(source, &arena)?;
    let mut compiled = cscript_compiler::compile(&script, env)?;
    cscript_compiler::peephole::run(&mut compiled.stream);
    let code = cscript_vm::encode(&compiled.stream, &env.externals_by_name())?;
    Ok(Script {
        code,
        result_kind: compiled.result_kind,
        params: compiled.params,
    })
}

impl Script {
    /// The encoded bytecode.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Declared parameter kinds.
    pub fn params(&self) -> &[VarKind] {
        &self.params
    }

    /// Run against the environment that compiled this script.
    ///
    /// Arguments bind positionally; ints and floats convert to the
    /// declared parameter type, and pointer parameters take the target
    /// address as an `Int`. A script whose last statement is not a bare
    /// expression returns `Int(0)`.
    pub fn run(&self, env: &mut Environment, args: &[Value]) -> Result<Value, CScriptError> {
        if args.len() != self.params.len() {
            return Err(CompileError::WrongArity {
                name: "script".to_string(),
                expected: self.params.len(),
                found: args.len(),
                line: 0,
            }
            .into());
        }

        let mut regs = RegisterFile::new();
        regs.set_gpr(abi::GLOBALS_BASE, env.globals_base() as u64);
        bind_args(&mut regs, &self.params, args);

        // Clone so the foreign table outlives the mutable borrow above.
        let externals: FxHashMap<u64, ForeignFn> = env.externals_by_addr().clone();
        cscript_vm::execute(&self.code, &mut regs, &externals)?;

        Ok(match self.result_kind {
            Some(ValueKind::Flonum) => {
                Value::Float(f64::from_bits(regs.xmm(abi::FLOAT_RETURN)))
            }
            Some(ValueKind::Fixnum) => Value::Int(regs.gpr(abi::INT_RETURN) as i64),
            None => Value::Int(0),
        })
    }
}

/// Place arguments in the registers the calling convention assigns,
/// mirroring the generator's parameter binding.
fn bind_args(regs: &mut RegisterFile, params: &[VarKind], args: &[Value]) {
    let mut nth_int = 0usize;
    let mut nth_float = 0usize;
    for (position, (&kind, &arg)) in params.iter().zip(args).enumerate() {
        if kind == VarKind::Float {
            let slot = abi::arg_slot(position, nth_float);
            nth_float += 1;
            regs.set_xmm(abi::float_arg(slot), arg.as_float().to_bits());
        } else {
            let slot = abi::arg_slot(position, nth_int);
            nth_int += 1;
            regs.set_gpr(abi::int_arg(slot), arg.as_int() as u64);
        }
    }
}
