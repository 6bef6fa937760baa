//! Dumping the device's memory through the patched dispatch routine.
//!
//! The patched firmware only offers single byte writes to XDATA and a call
//! to a configurable address. Reads are built on top of these: for every
//! four bytes of memory a short piece of code is assembled that copies
//! them into the marker buffer, it is written byte by byte to a landing
//! pad, called, and the marker buffer is read back over USB.
//!
//! There are two fairly large zeroed and unreferenced regions in CODE,
//! [0xff59, 0xff82) and [0xff99, 0xffc7). The landing pad lives in the
//! second one.

use crate::{
    asm,
    patch::CALL_TARGET_ADDR,
    primitives::{arbitrary_call, arbitrary_write, read_marker, MARKER_ADDR, MARKER_SIZE},
    usb::Transport,
    Result,
};
use bytes::{Bytes, BytesMut};
use std::{fmt, str::FromStr};

/// Address the injected code is written to and called at.
pub const LANDING_PAD_ADDR: u16 = 0xff99;

/// Number of bytes fetched per call.
pub const WINDOW_SIZE: usize = MARKER_SIZE;

/// One of the 8051 address spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    Iram,
    Xdata,
    Code,
}

impl Area {
    /// Size of the address space in bytes.
    pub fn size(self) -> usize {
        match self {
            Area::Iram => 0x100,
            Area::Xdata | Area::Code => 0x10000,
        }
    }

    /// The code fetching the window starting at `addr`.
    pub fn recipe(self, addr: usize) -> Recipe {
        match self {
            Area::Iram => Recipe::Iram { addr: addr as u8 },
            Area::Xdata => Recipe::Xdata { addr: addr as u16 },
            Area::Code => Recipe::Code { addr: addr as u16 },
        }
    }
}

impl FromStr for Area {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "iram" => Ok(Area::Iram),
            "xdata" => Ok(Area::Xdata),
            "code" => Ok(Area::Code),
            _ => Err(format!(
                "invalid area `{}`, expected `iram`, `xdata` or `code`",
                s
            )),
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Area::Iram => f.write_str("IRAM"),
            Area::Xdata => f.write_str("XDATA"),
            Area::Code => f.write_str("CODE"),
        }
    }
}

/// Code that copies one window of memory into the marker buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipe {
    Iram { addr: u8 },
    Xdata { addr: u16 },
    Code { addr: u16 },
}

impl Recipe {
    /// Assembles the recipe into 8051 machine code.
    pub fn assemble(&self) -> Bytes {
        let mut code = BytesMut::new();

        match *self {
            Recipe::Iram { addr } => {
                // Direct addresses from 0x80 up hit the SFRs, not upper IRAM.
                asm::mov_dptr(&mut code, MARKER_ADDR);
                for i in 0..WINDOW_SIZE as u8 {
                    if i != 0 {
                        asm::inc_dptr(&mut code);
                    }
                    asm::mov_a_direct(&mut code, addr.wrapping_add(i));
                    asm::movx_dptr_a(&mut code);
                }
            }
            Recipe::Xdata { addr } => {
                for i in 0..WINDOW_SIZE as u16 {
                    asm::mov_dptr(&mut code, addr.wrapping_add(i));
                    asm::movx_a_dptr(&mut code);
                    asm::mov_dptr(&mut code, MARKER_ADDR + i);
                    asm::movx_dptr_a(&mut code);
                }
            }
            Recipe::Code { addr } => {
                for i in 0..WINDOW_SIZE as u16 {
                    asm::mov_dptr(&mut code, addr.wrapping_add(i));
                    asm::clr_a(&mut code);
                    asm::movc_a_a_dptr(&mut code);
                    asm::mov_dptr(&mut code, MARKER_ADDR + i);
                    asm::movx_dptr_a(&mut code);
                }
            }
        }
        asm::ret(&mut code);

        code.freeze()
    }
}

/// Dumps a whole address space from a device running the patched SROM.
pub struct Fetcher<'a, T> {
    dev: &'a mut T,
    progress: Option<Box<dyn FnMut(usize, usize) + 'a>>,
}

impl<'a, T: Transport> Fetcher<'a, T> {
    pub fn new(dev: &'a mut T) -> Self {
        Fetcher {
            dev,
            progress: None,
        }
    }

    /// Registers a callback that gets the number of fetched bytes and the
    /// total after every window.
    pub fn on_progress<F>(mut self, progress: F) -> Self
    where
        F: FnMut(usize, usize) + 'a,
    {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Fetches the full `area`.
    ///
    /// Any failed transfer aborts the whole dump.
    pub fn fetch(&mut self, area: Area) -> Result<Bytes> {
        self.aim_call_at(LANDING_PAD_ADDR)?;

        let total = area.size();
        let mut data = BytesMut::with_capacity(total);
        for addr in (0..total).step_by(WINDOW_SIZE) {
            let window = self.fetch_window(area.recipe(addr))?;
            data.extend_from_slice(&window);

            if let Some(progress) = self.progress.as_mut() {
                progress(data.len(), total);
            }
        }

        Ok(data.freeze())
    }

    /// Patches the target of the arbitrary call, high byte first.
    fn aim_call_at(&mut self, target: u16) -> Result<()> {
        let [high, low] = target.to_be_bytes();
        arbitrary_write(&mut *self.dev, CALL_TARGET_ADDR, high)?;
        arbitrary_write(&mut *self.dev, CALL_TARGET_ADDR + 1, low)
    }

    fn fetch_window(&mut self, recipe: Recipe) -> Result<[u8; MARKER_SIZE]> {
        for (i, byte) in recipe.assemble().iter().enumerate() {
            arbitrary_write(&mut *self.dev, LANDING_PAD_ADDR + i as u16, *byte)?;
        }
        arbitrary_call(&mut *self.dev)?;
        read_marker(&mut *self.dev)
    }
}

/// Fetches the full `area` without progress reporting.
pub fn fetch<T: Transport>(dev: &mut T, area: Area) -> Result<Bytes> {
    Fetcher::new(dev).fetch(area)
}
