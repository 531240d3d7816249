//! The byte-level instruction format, shared by encoder and decoder.
//!
//! ```text
//! opcode  [dst byte]  [src byte]  [size byte]  [dst payload]  [src payload]
//! ```
//!
//! Operand byte: bits 0-4 register id, bits 5-6 addressing mode, bit 7 the
//! zero-displacement flag for memory operands. The size byte carries one
//! width class per operand (dst low nibble, src high) and is present only
//! when at least one operand can carry a payload: an immediate, or a
//! memory operand without the zero-displacement flag. Payloads are
//! little-endian and sign-extended on decode.
//!
//! Branch targets encode as a 4-byte immediate relative to the next
//! instruction regardless of magnitude, keeping instruction sizes
//! independent of label placement. Foreign-call targets are absolute
//! 8-byte dispatch addresses.

/// Addressing modes (operand byte bits 5-6).
pub const MODE_REG: u8 = 0;
pub const MODE_MEM: u8 = 1;
pub const MODE_IMM: u8 = 2;

pub const MODE_SHIFT: u8 = 5;
pub const MODE_MASK: u8 = 0b11;
pub const REG_MASK: u8 = 0b0001_1111;

/// Memory operand with no displacement payload.
pub const FLAG_NO_DISP: u8 = 0x80;

/// Payload byte width per size class.
pub const CLASS_WIDTH: [usize; 4] = [0, 1, 4, 8];

/// Size class of a branch displacement (always 4 bytes).
pub const BRANCH_CLASS: u8 = 2;
/// Size class of a foreign-call dispatch address (always 8 bytes).
pub const EXTERNAL_CLASS: u8 = 3;

/// Call-target alignment for aligned labels.
pub const LABEL_ALIGN: usize = 8;

/// Smallest class whose width holds `value`.
pub fn class_for(value: i64) -> u8 {
    if value == 0 {
        0
    } else if i8::try_from(value).is_ok() {
        1
    } else if i32::try_from(value).is_ok() {
        2
    } else {
        3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_pick_the_narrowest_width() {
        assert_eq!(class_for(0), 0);
        assert_eq!(class_for(-1), 1);
        assert_eq!(class_for(127), 1);
        assert_eq!(class_for(128), 2);
        assert_eq!(class_for(-40), 1);
        assert_eq!(class_for(1 << 40), 3);
        assert_eq!(CLASS_WIDTH[class_for(1 << 40) as usize], 8);
    }
}
