//! Level-5 MAT file constants.

pub(super) const HEADER_LEN: usize = 128;
pub(super) const HEADER_TEXT_LEN: usize = 116;
pub(super) const VERSION: u16 = 0x0100;
pub(super) const ENDIAN_LE: &[u8; 2] = b"IM";
pub(super) const ENDIAN_BE: &[u8; 2] = b"MI";

// Data element types.
pub(super) const MI_INT8: u32 = 1;
pub(super) const MI_UINT8: u32 = 2;
pub(super) const MI_INT16: u32 = 3;
pub(super) const MI_UINT16: u32 = 4;
pub(super) const MI_INT32: u32 = 5;
pub(super) const MI_UINT32: u32 = 6;
pub(super) const MI_SINGLE: u32 = 7;
pub(super) const MI_DOUBLE: u32 = 9;
pub(super) const MI_INT64: u32 = 12;
pub(super) const MI_UINT64: u32 = 13;
pub(super) const MI_MATRIX: u32 = 14;
pub(super) const MI_COMPRESSED: u32 = 15;
pub(super) const MI_UTF8: u32 = 16;
pub(super) const MI_UTF16: u32 = 17;
pub(super) const MI_UTF32: u32 = 18;

// Array classes.
pub(super) const MX_CELL: u32 = 1;
pub(super) const MX_STRUCT: u32 = 2;
pub(super) const MX_OBJECT: u32 = 3;
pub(super) const MX_CHAR: u32 = 4;
pub(super) const MX_SPARSE: u32 = 5;
pub(super) const MX_DOUBLE: u32 = 6;
pub(super) const MX_SINGLE: u32 = 7;
pub(super) const MX_INT8: u32 = 8;
pub(super) const MX_UINT8: u32 = 9;
pub(super) const MX_INT16: u32 = 10;
pub(super) const MX_UINT16: u32 = 11;
pub(super) const MX_INT32: u32 = 12;
pub(super) const MX_UINT32: u32 = 13;
pub(super) const MX_INT64: u32 = 14;
pub(super) const MX_UINT64: u32 = 15;

// Array flag bits.
pub(super) const FLAG_COMPLEX: u32 = 0x0800;
pub(super) const FLAG_LOGICAL: u32 = 0x0200;

/// Bytes needed to pad `len` to the next 8-byte boundary.
pub(super) fn padding(len: usize) -> usize {
    (8 - len % 8) % 8
}
