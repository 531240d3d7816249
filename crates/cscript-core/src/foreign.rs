//! Foreign (host) function descriptors and marshaling.
//!
//! Script code calls into the host through registered foreign functions:
//! a name, an ordered argument-kind list (at most
//! [`MAX_FOREIGN_ARGS`](crate::isa::abi::MAX_FOREIGN_ARGS) entries over
//! bool/int/double/pointer), and a return kind. Registration assigns each
//! function a unique dispatch address: the encoder substitutes it for the
//! name, and the interpreter resolves it back to the callable.
//!
//! Marshaling is a small closed interface per supported host type
//! ([`ForeignParam`] / [`ForeignRet`]) composed through arity-specialized
//! [`IntoForeignFn`] impls, rather than a nested type-switch over every
//! kind combination.

use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Kind tag for foreign parameters and returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKind {
    Bool,
    Int,
    Double,
    Ptr,
    /// Return kind only.
    Void,
}

impl ForeignKind {
    /// Whether values of this kind travel in a float register.
    #[inline]
    pub fn uses_float_register(self) -> bool {
        matches!(self, ForeignKind::Double)
    }
}

/// A marshaled host value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ForeignValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    Ptr(usize),
    Void,
}

impl ForeignValue {
    /// The 64-bit word this value occupies in an integer register.
    ///
    /// `Double` is the odd one out: it travels in a float register and is
    /// handled separately by the interpreter.
    #[inline]
    pub fn to_bits(self) -> u64 {
        match self {
            ForeignValue::Bool(b) => b as u64,
            ForeignValue::Int(i) => i as u64,
            ForeignValue::Double(d) => d.to_bits(),
            ForeignValue::Ptr(p) => p as u64,
            ForeignValue::Void => 0,
        }
    }
}

/// Ordered argument kinds plus return kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignSig {
    pub params: SmallVec<[ForeignKind; 4]>,
    pub ret: ForeignKind,
}

/// Type-erased foreign callable.
pub type ForeignCallable = dyn Fn(&[ForeignValue]) -> ForeignValue + Send + Sync;

/// A registered foreign function.
#[derive(Clone)]
pub struct ForeignFn {
    /// Name used by script code and the encoder.
    pub name: String,
    /// Dispatch address: the absolute 8-byte operand of a `callf`.
    pub addr: u64,
    /// Declared signature.
    pub sig: ForeignSig,
    callable: Arc<ForeignCallable>,
}

impl ForeignFn {
    pub fn new(name: impl Into<String>, addr: u64, sig: ForeignSig, callable: Arc<ForeignCallable>) -> Self {
        Self {
            name: name.into(),
            addr,
            sig,
            callable,
        }
    }

    /// Invoke the host function with already-marshaled arguments.
    ///
    /// Synchronous and blocking; a non-returning callee hangs the
    /// interpreter, and panics propagate to the embedding host.
    pub fn call(&self, args: &[ForeignValue]) -> ForeignValue {
        (self.callable)(args)
    }
}

impl fmt::Debug for ForeignFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignFn")
            .field("name", &self.name)
            .field("addr", &self.addr)
            .field("sig", &self.sig)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Marshaling traits
// ============================================================================

/// A host type usable as a foreign parameter.
pub trait ForeignParam {
    const KIND: ForeignKind;
    fn from_value(v: ForeignValue) -> Self;
}

/// A host type usable as a foreign return.
pub trait ForeignRet {
    const KIND: ForeignKind;
    fn into_value(self) -> ForeignValue;
}

impl ForeignParam for bool {
    const KIND: ForeignKind = ForeignKind::Bool;
    fn from_value(v: ForeignValue) -> bool {
        match v {
            ForeignValue::Bool(b) => b,
            ForeignValue::Int(i) => i != 0,
            ForeignValue::Double(d) => d != 0.0,
            ForeignValue::Ptr(p) => p != 0,
            ForeignValue::Void => false,
        }
    }
}

impl ForeignParam for i64 {
    const KIND: ForeignKind = ForeignKind::Int;
    fn from_value(v: ForeignValue) -> i64 {
        match v {
            ForeignValue::Bool(b) => b as i64,
            ForeignValue::Int(i) => i,
            ForeignValue::Double(d) => d as i64,
            ForeignValue::Ptr(p) => p as i64,
            ForeignValue::Void => 0,
        }
    }
}

impl ForeignParam for f64 {
    const KIND: ForeignKind = ForeignKind::Double;
    fn from_value(v: ForeignValue) -> f64 {
        match v {
            ForeignValue::Bool(b) => b as u8 as f64,
            ForeignValue::Int(i) => i as f64,
            ForeignValue::Double(d) => d,
            ForeignValue::Ptr(p) => p as f64,
            ForeignValue::Void => 0.0,
        }
    }
}

impl ForeignParam for usize {
    const KIND: ForeignKind = ForeignKind::Ptr;
    fn from_value(v: ForeignValue) -> usize {
        match v {
            ForeignValue::Bool(b) => b as usize,
            ForeignValue::Int(i) => i as usize,
            ForeignValue::Double(d) => d as usize,
            ForeignValue::Ptr(p) => p,
            ForeignValue::Void => 0,
        }
    }
}

impl ForeignRet for () {
    const KIND: ForeignKind = ForeignKind::Void;
    fn into_value(self) -> ForeignValue {
        ForeignValue::Void
    }
}

impl ForeignRet for bool {
    const KIND: ForeignKind = ForeignKind::Bool;
    fn into_value(self) -> ForeignValue {
        ForeignValue::Bool(self)
    }
}

impl ForeignRet for i64 {
    const KIND: ForeignKind = ForeignKind::Int;
    fn into_value(self) -> ForeignValue {
        ForeignValue::Int(self)
    }
}

impl ForeignRet for f64 {
    const KIND: ForeignKind = ForeignKind::Double;
    fn into_value(self) -> ForeignValue {
        ForeignValue::Double(self)
    }
}

impl ForeignRet for usize {
    const KIND: ForeignKind = ForeignKind::Ptr;
    fn into_value(self) -> ForeignValue {
        ForeignValue::Ptr(self)
    }
}

// ============================================================================
// Registration adapter
// ============================================================================

/// Adapts a typed `Fn(A, ...) -> R` into a signature plus type-erased
/// callable. Implemented for arities 0 through 4.
pub trait IntoForeignFn<Args> {
    fn signature() -> ForeignSig;
    fn into_callable(self) -> Arc<ForeignCallable>;
}

macro_rules! impl_into_foreign_fn {
    ($($arg:ident $idx:tt),*) => {
        impl<F, R $(, $arg)*> IntoForeignFn<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            R: ForeignRet,
            $($arg: ForeignParam,)*
        {
            fn signature() -> ForeignSig {
                ForeignSig {
                    params: SmallVec::from_slice(&[$($arg::KIND),*]),
                    ret: R::KIND,
                }
            }

            fn into_callable(self) -> Arc<ForeignCallable> {
                Arc::new(move |args: &[ForeignValue]| {
                    self($($arg::from_value(args[$idx])),*).into_value()
                })
            }
        }
    };
}

impl_into_foreign_fn!();
impl_into_foreign_fn!(A0 0);
impl_into_foreign_fn!(A0 0, A1 1);
impl_into_foreign_fn!(A0 0, A1 1, A2 2);
impl_into_foreign_fn!(A0 0, A1 1, A2 2, A3 3);

#[cfg(test)]
mod tests {
    use super::*;

    fn erase<F, A>(f: F) -> (ForeignSig, Arc<ForeignCallable>)
    where
        F: IntoForeignFn<A>,
    {
        (F::signature(), f.into_callable())
    }

    #[test]
    fn two_double_signature() {
        let (sig, call) = erase(|a: f64, b: f64| a + b);
        assert_eq!(sig.params.as_slice(), &[ForeignKind::Double, ForeignKind::Double]);
        assert_eq!(sig.ret, ForeignKind::Double);
        match call(&[ForeignValue::Double(3.14), ForeignValue::Double(0.1)]) {
            ForeignValue::Double(d) => assert!((d - 3.24).abs() < 1e-12),
            other => panic!("expected a double, got {other:?}"),
        }
    }

    #[test]
    fn mixed_kinds_marshal_positionally() {
        let (sig, call) = erase(|flag: bool, n: i64, scale: f64| {
            if flag { (n as f64) * scale } else { 0.0 }
        });
        assert_eq!(
            sig.params.as_slice(),
            &[ForeignKind::Bool, ForeignKind::Int, ForeignKind::Double]
        );
        assert_eq!(
            call(&[
                ForeignValue::Bool(true),
                ForeignValue::Int(4),
                ForeignValue::Double(0.5),
            ]),
            ForeignValue::Double(2.0)
        );
    }

    #[test]
    fn void_return_marshal() {
        let (sig, call) = erase(|_n: i64| ());
        assert_eq!(sig.ret, ForeignKind::Void);
        assert_eq!(call(&[ForeignValue::Int(1)]), ForeignValue::Void);
    }

    #[test]
    fn pointer_round_trip() {
        let (sig, call) = erase(|p: usize| p + 8);
        assert_eq!(sig.params.as_slice(), &[ForeignKind::Ptr]);
        assert_eq!(call(&[ForeignValue::Ptr(0x1000)]), ForeignValue::Ptr(0x1008));
    }
}
