//! cscript: a small embeddable scripting language compiled on the fly.
//!
//! Scripts are single functions over 64-bit ints and doubles, with
//! single-dimension arrays, pointers into host memory, `if`/`for`, and
//! calls back into registered host functions. Compilation runs the full
//! pipeline (lex, parse, generate, peephole, encode) and yields a
//! [`Script`] executable any number of times on a hardware-emulating
//! bytecode interpreter.
//!
//! # Example
//!
//! ```
//! use cscript::{compile, Environment, Value};
//!
//! let mut env = Environment::new();
//! env.register_foreign("add", |a: f64, b: f64| a + b);
//!
//! let script = compile("(int i) add(i, 0.5);", &mut env).unwrap();
//! let result = script.run(&mut env, &[Value::Int(2)]).unwrap();
//! assert_eq!(result, Value::Float(2.5));
//! ```

mod engine;

pub use engine::{Script, Value, compile};

pub use cscript_core::error::{
    CScriptError, CompileError, EncodeError, ExecError, LexError, ParseError,
};
pub use cscript_core::{Environment, ForeignValue, ValueKind, VarKind};

/// Commonly used names for embedders.
pub mod prelude {
    pub use crate::{CScriptError, Environment, Script, Value, compile};
}
