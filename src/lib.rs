//! `lights-out` extracts firmware and memory from the 5986:02d2 USB device
//! by abusing the vendor control requests of its 8051 microcontroller.
//!
//! The attack has three stages, run one after another by the operator:
//! 1. [`patch::patch_srom`] replaces the USB request dispatch routine in a
//! dumped SROM image with one that offers an arbitrary XDATA write and an
//! arbitrary call.
//! 2. [`srom::write_srom`] flashes the patched image back to the device.
//! 3. [`fetch::fetch`] uses the new primitives to dump IRAM, XDATA and CODE.
//!
//! Every operation talks to the device through a [`usb::Transport`].

pub use bytes;
pub use rusb;

pub mod asm;
mod error;
pub mod fetch;
pub mod patch;
pub mod primitives;
pub mod srom;
pub mod usb;

#[cfg(test)]
mod mock;

pub use error::{Error, Result};
