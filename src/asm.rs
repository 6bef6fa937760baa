//! The handful of 8051 instructions needed to build injected code.
//!
//! Each function appends the encoding of one instruction to `code`.
//! 16-bit immediates are stored big-endian, as the 8051 expects them.

use bytes::{BufMut, BytesMut};

/// `MOV DPTR, #value`
pub fn mov_dptr(code: &mut BytesMut, value: u16) {
    code.put_u8(0x90);
    code.put_u16(value);
}

/// `MOV A, direct`
pub fn mov_a_direct(code: &mut BytesMut, addr: u8) {
    code.put_u8(0xe5);
    code.put_u8(addr);
}

/// `MOVX A, @DPTR`
pub fn movx_a_dptr(code: &mut BytesMut) {
    code.put_u8(0xe0);
}

/// `MOVX @DPTR, A`
pub fn movx_dptr_a(code: &mut BytesMut) {
    code.put_u8(0xf0);
}

/// `INC DPTR`
pub fn inc_dptr(code: &mut BytesMut) {
    code.put_u8(0xa3);
}

/// `CLR A`
pub fn clr_a(code: &mut BytesMut) {
    code.put_u8(0xe4);
}

/// `MOVC A, @A+DPTR`
pub fn movc_a_a_dptr(code: &mut BytesMut) {
    code.put_u8(0x93);
}

/// `RET`
pub fn ret(code: &mut BytesMut) {
    code.put_u8(0x22);
}
