//! Runtime value and variable kinds.
//!
//! Every cscript value is a single 64-bit word, interpreted either as a
//! two's-complement integer ("fixnum") or as the bit pattern of a double
//! ("flonum"). The code generator threads a [`ValueKind`] through every
//! recursive compile call to record which interpretation the just-produced
//! word holds.

/// Interpretation of a 64-bit runtime word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Two's-complement 64-bit integer.
    Fixnum,
    /// IEEE-754 double carried as its bit pattern.
    Flonum,
}

impl ValueKind {
    /// Whether this is the floating-point interpretation.
    #[inline]
    pub fn is_float(self) -> bool {
        matches!(self, ValueKind::Flonum)
    }

    /// The result kind of a binary operator over mixed operands.
    ///
    /// Integer promotes to float, never the reverse.
    #[inline]
    pub fn promote(a: ValueKind, b: ValueKind) -> ValueKind {
        if a.is_float() || b.is_float() {
            ValueKind::Flonum
        } else {
            ValueKind::Fixnum
        }
    }
}

/// Declared kind of a variable.
///
/// Scalars prefer a register home; arrays and pointers are always
/// memory-resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    /// Scalar fixnum.
    Int,
    /// Scalar flonum.
    Float,
    /// Single-dimension fixnum array with the given element count.
    IntArray(u32),
    /// Single-dimension flonum array with the given element count.
    FloatArray(u32),
    /// Pointer to fixnum elements.
    IntPtr,
    /// Pointer to flonum elements.
    FloatPtr,
}

impl VarKind {
    /// The kind of value produced by reading this variable (or one of its
    /// elements).
    #[inline]
    pub fn element_kind(self) -> ValueKind {
        match self {
            VarKind::Int | VarKind::IntArray(_) | VarKind::IntPtr => ValueKind::Fixnum,
            VarKind::Float | VarKind::FloatArray(_) | VarKind::FloatPtr => ValueKind::Flonum,
        }
    }

    /// Whether this variable must live in memory rather than a register.
    #[inline]
    pub fn is_memory_resident(self) -> bool {
        !matches!(self, VarKind::Int | VarKind::Float)
    }

    /// Whether this variable is indexable (`name[i]`).
    #[inline]
    pub fn is_indexable(self) -> bool {
        matches!(
            self,
            VarKind::IntArray(_) | VarKind::FloatArray(_) | VarKind::IntPtr | VarKind::FloatPtr
        )
    }

    /// Whether this variable can be dereferenced (`*name`).
    #[inline]
    pub fn is_pointer(self) -> bool {
        matches!(self, VarKind::IntPtr | VarKind::FloatPtr)
    }

    /// Number of 8-byte slots this variable occupies in memory.
    #[inline]
    pub fn slot_count(self) -> u32 {
        match self {
            VarKind::IntArray(n) | VarKind::FloatArray(n) => n,
            _ => 1,
        }
    }
}

/// Element width in bytes. Both fixnum and flonum elements are 8 bytes.
pub const ELEMENT_WIDTH: i64 = 8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_operands_promote_to_float() {
        assert_eq!(
            ValueKind::promote(ValueKind::Fixnum, ValueKind::Flonum),
            ValueKind::Flonum
        );
        assert_eq!(
            ValueKind::promote(ValueKind::Fixnum, ValueKind::Fixnum),
            ValueKind::Fixnum
        );
    }

    #[test]
    fn arrays_and_pointers_are_memory_resident() {
        assert!(VarKind::IntArray(3).is_memory_resident());
        assert!(VarKind::FloatPtr.is_memory_resident());
        assert!(!VarKind::Int.is_memory_resident());
    }

    #[test]
    fn pointers_are_indexable_and_derefable() {
        assert!(VarKind::IntPtr.is_indexable());
        assert!(VarKind::IntPtr.is_pointer());
        assert!(VarKind::IntArray(4).is_indexable());
        assert!(!VarKind::IntArray(4).is_pointer());
    }
}
