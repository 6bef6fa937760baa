//! Offline patching of the SROM image.
//!
//! At CODE 0xb4d3 the firmware has a function that gets called for every
//! USB control request sent to the device. It returns its verdict in R7:
//! 0 means "request not supported", 2 means "success". The function is
//! replaced by one of the same size (0x2b bytes) that keeps the
//! `bmRequestType == 0x40` check and adds two requests:
//!
//! - `bRequest == 0x41` calls into an address embedded in the routine
//!   itself. It is 0xffff initially and gets pointed somewhere useful with
//!   the write primitive.
//! - `bRequest == 0x42` writes the low byte of `wValue` to the XDATA
//!   address in `wIndex`.
//!
//! The routine clobbers R6 in addition to R7; R6 holds a temporary of the
//! caller that is dead after the call.
//!
//! The request being dispatched is kept in XDATA:
//!
//! | address | field           |
//! |---------|-----------------|
//! | 0xa226  | `bmRequestType` |
//! | 0xa227  | `bRequest`      |
//! | 0xa228  | `wValue` high   |
//! | 0xa229  | `wValue` low    |
//! | 0xa22a  | `wIndex` high   |
//! | 0xa22b  | `wIndex` low    |

use crate::{Error, Result};
use bytes::{Bytes, BytesMut};

/// CODE and XDATA share the address space starting from here, and this
/// window is backed by the SROM.
pub const SHARED_WINDOW_START: u16 = 0xb000;

/// SROM offset that backs [`SHARED_WINDOW_START`].
const SHARED_WINDOW_SROM_OFFSET: usize = 0x715;

/// CODE address of the request dispatch routine.
pub const DISPATCH_ADDR: u16 = 0xb4d3;

/// Offset of the `LCALL` operand inside [`DISPATCH_PATCH`].
const CALL_OPERAND_OFFSET: u16 = 0x11;

/// CODE address of the arbitrary call's target, high byte first.
pub const CALL_TARGET_ADDR: u16 = DISPATCH_ADDR + CALL_OPERAND_OFFSET;

/// The replacement dispatch routine.
#[rustfmt::skip]
pub const DISPATCH_PATCH: [u8; 0x2b] = [
    0x90, 0xa2, 0x26,   // 00: mov   dptr, #bmRequestType
    0xe0,               // 03: movx  a, @dptr
    0xb4, 0x40, 0x21,   // 04: cjne  a, #0x40, 28
    0xa3,               // 07: inc   dptr
    0xe0,               // 08: movx  a, @dptr
    0x24, 0xbe,         // 09: add   a, #-0x42
    0x60, 0x08,         // 0b: jz    15
    0x04,               // 0d: inc   a
    0x70, 0x18,         // 0e: jnz   28
    0x12, 0xff, 0xff,   // 10: lcall 0xffff
    0x80, 0x10,         // 13: sjmp  25
    0xa3,               // 15: inc   dptr
    0xa3,               // 16: inc   dptr
    0xe0,               // 17: movx  a, @dptr
    0xff,               // 18: mov   r7, a
    0xa3,               // 19: inc   dptr
    0xe0,               // 1a: movx  a, @dptr
    0xfe,               // 1b: mov   r6, a
    0xa3,               // 1c: inc   dptr
    0xe0,               // 1d: movx  a, @dptr
    0xf5, 0x82,         // 1e: mov   dpl, a
    0xee,               // 20: mov   a, r6
    0xf5, 0x83,         // 21: mov   dph, a
    0xef,               // 23: mov   a, r7
    0xf0,               // 24: movx  @dptr, a
    0x7f, 0x02,         // 25: mov   r7, #2
    0x22,               // 27: ret
    0x7f, 0x00,         // 28: mov   r7, #0
    0x22,               // 2a: ret
];

/// Maps a CODE address inside the shared window to its SROM offset.
pub fn srom_offset(addr: u16) -> Result<usize> {
    if addr < SHARED_WINDOW_START {
        return Err(Error::OutsideSharedWindow(addr));
    }
    Ok((addr - SHARED_WINDOW_START) as usize + SHARED_WINDOW_SROM_OFFSET)
}

/// Overwrites the bytes backing CODE `addr` with `patch`.
pub fn patch_code_at(image: &mut [u8], addr: u16, patch: &[u8]) -> Result<()> {
    let offset = srom_offset(addr)?;
    let end = offset + patch.len();
    if end > image.len() {
        return Err(Error::ImageTooSmall {
            needed: end,
            actual: image.len(),
        });
    }

    image[offset..end].copy_from_slice(patch);
    Ok(())
}

/// Returns a copy of the factory SROM `image` with the dispatch routine
/// replaced by [`DISPATCH_PATCH`].
///
/// The image is not checked for being unpatched or of the full SROM size.
pub fn patch_srom(image: &[u8]) -> Result<Bytes> {
    let mut patched = BytesMut::from(image);
    patch_code_at(&mut patched, DISPATCH_ADDR, &DISPATCH_PATCH)?;
    Ok(patched.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srom::SROM_SIZE;

    #[test]
    fn test_srom_offset() {
        assert_eq!(srom_offset(0xb000).unwrap(), 0x715);
        assert_eq!(srom_offset(DISPATCH_ADDR).unwrap(), 0xbe8);
        assert_eq!(srom_offset(0xffff).unwrap(), 0xffff - 0xb000 + 0x715);
        assert!(matches!(
            srom_offset(0xafff),
            Err(Error::OutsideSharedWindow(0xafff))
        ));
        assert!(srom_offset(0).is_err());
    }

    #[test]
    fn test_call_target_is_lcall_operand() {
        let offset = (CALL_TARGET_ADDR - DISPATCH_ADDR) as usize;
        assert_eq!(DISPATCH_PATCH[offset - 1], 0x12);
        assert_eq!(&DISPATCH_PATCH[offset..offset + 2], &[0xff, 0xff]);
        assert_eq!(CALL_TARGET_ADDR, 0xb4e4);
    }

    #[test]
    fn test_patch_zero_image() {
        let image = vec![0u8; SROM_SIZE];
        let patched = patch_srom(&image).unwrap();

        assert_eq!(patched.len(), SROM_SIZE);
        assert_eq!(&patched[..0xbe8], &image[..0xbe8]);
        assert_eq!(&patched[0xbe8..0xc13], &DISPATCH_PATCH[..]);
        assert_eq!(&patched[0xc13..], &image[0xc13..]);
    }

    #[test]
    fn test_patch_leaves_other_bytes_alone() {
        let image: Vec<u8> = (0..SROM_SIZE).map(|i| (i * 7 + 3) as u8).collect();
        let patched = patch_srom(&image).unwrap();

        let start = srom_offset(DISPATCH_ADDR).unwrap();
        let end = start + DISPATCH_PATCH.len();
        for (i, (a, b)) in image.iter().zip(patched.iter()).enumerate() {
            if i < start || i >= end {
                assert_eq!(a, b, "byte {:#x} changed", i);
            }
        }
    }

    #[test]
    fn test_patch_is_repeatable() {
        let image = vec![0x5a; SROM_SIZE];
        let once = patch_srom(&image).unwrap();
        let twice = patch_srom(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_patch_small_image() {
        let image = vec![0u8; 0xc00];
        assert!(matches!(
            patch_srom(&image),
            Err(Error::ImageTooSmall {
                needed: 0xc13,
                actual: 0xc00
            })
        ));
    }

    #[test]
    fn test_patch_code_below_window() {
        let mut image = vec![0u8; SROM_SIZE];
        assert!(patch_code_at(&mut image, 0x1000, &[0x22]).is_err());
        assert!(image.iter().all(|&b| b == 0));
    }
}
