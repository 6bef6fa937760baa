//! Reading and writing the device's SROM.
//!
//! Transfers are done in chunks of 64 bytes at most. Larger chunks make the
//! device misbehave, most likely a buffer overflow in its SROM routines.

use crate::{usb::ControlRequest, usb::Transport, Error, Result};
use bytes::{Bytes, BytesMut};
use std::{cmp, thread, time::Duration};

/// Size of the SROM, and of every image written to it.
pub const SROM_SIZE: usize = 0x10000;

/// Largest chunk a single SROM request may carry.
pub const CHUNK_SIZE: usize = 64;

/// Time the device needs after unlock, lock and every chunk write.
pub const SETTLE_TIME: Duration = Duration::from_millis(100);

const REQUEST_UNLOCK: u8 = 0x01;
const REQUEST_WRITE: u8 = 0x02;
const REQUEST_LOCK: u8 = 0x03;
const REQUEST_READ: u8 = 0x07;

/// Reads the first `length` bytes of the SROM.
///
/// No unlocking is needed for reads.
pub fn read_srom<T: Transport>(dev: &mut T, length: usize) -> Result<Bytes> {
    if length > SROM_SIZE {
        return Err(Error::InvalidLength {
            expected: SROM_SIZE,
            actual: length,
        });
    }

    let mut data = BytesMut::with_capacity(length);
    for offset in (0..length).step_by(CHUNK_SIZE) {
        let chunk_size = cmp::min(length - offset, CHUNK_SIZE);
        let chunk = read_chunk(dev, offset as u16, chunk_size)?;
        data.extend_from_slice(&chunk);
    }

    Ok(data.freeze())
}

/// Writes a full image to the SROM.
///
/// The length of `data` is checked before the device is touched. A failed
/// chunk write aborts immediately and leaves the SROM unlocked and
/// partially written.
pub fn write_srom<T: Transport>(dev: &mut T, data: &[u8], settle: Duration) -> Result<()> {
    if data.len() != SROM_SIZE {
        return Err(Error::InvalidLength {
            expected: SROM_SIZE,
            actual: data.len(),
        });
    }

    unlock(dev, settle)?;
    for (i, chunk) in data.chunks(CHUNK_SIZE).enumerate() {
        let offset = (i * CHUNK_SIZE) as u16;
        dev.write(REQUEST_WRITE, 0, offset, chunk)?;
        thread::sleep(settle);
    }
    lock(dev, settle)
}

fn unlock<T: Transport>(dev: &mut T, settle: Duration) -> Result<()> {
    dev.write(REQUEST_UNLOCK, 0, 0, &[])?;
    thread::sleep(settle);
    Ok(())
}

fn lock<T: Transport>(dev: &mut T, settle: Duration) -> Result<()> {
    dev.write(REQUEST_LOCK, 0, 0, &[])?;
    thread::sleep(settle);
    Ok(())
}

fn read_chunk<T: Transport>(dev: &mut T, offset: u16, length: usize) -> Result<Bytes> {
    let chunk = dev.read(REQUEST_READ, 0, offset, length)?;
    if chunk.len() != length {
        return Err(Error::ShortRead {
            request: ControlRequest::read(REQUEST_READ, 0, offset),
            expected: length,
            actual: chunk.len(),
        });
    }
    Ok(chunk)
}
