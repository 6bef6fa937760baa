//! A simulated device running the patched SROM, for tests.

use crate::{
    patch::{CALL_TARGET_ADDR, SHARED_WINDOW_START},
    usb::{ControlRequest, Transport},
    Error, Result,
};
use bytes::Bytes;

pub struct MockDevice {
    pub srom: Vec<u8>,
    pub iram: Vec<u8>,
    pub xdata: Vec<u8>,
    /// CODE below the shared window; above it CODE reads come from XDATA.
    pub code: Vec<u8>,
    pub unlocked: bool,
    /// Every request issued, failed ones included.
    pub log: Vec<ControlRequest>,
    /// Fail every request after this many have been issued.
    pub fail_after: Option<usize>,
    /// Return one byte less than requested on reads.
    pub short_reads: bool,
}

impl MockDevice {
    pub fn new() -> Self {
        MockDevice {
            srom: vec![0xff; 0x10000],
            iram: vec![0; 0x100],
            xdata: vec![0; 0x10000],
            code: vec![0; 0x10000],
            unlocked: false,
            log: Vec::new(),
            fail_after: None,
            short_reads: false,
        }
    }

    /// Number of logged requests with the given `bRequest`.
    pub fn count(&self, request: u8) -> usize {
        self.log.iter().filter(|r| r.request == request).count()
    }

    fn issue(&mut self, request: ControlRequest) -> Result<()> {
        self.log.push(request);
        match self.fail_after {
            Some(n) if self.log.len() > n => Err(stall(request)),
            _ => Ok(()),
        }
    }

    fn code_byte(&self, addr: u16) -> u8 {
        if addr >= SHARED_WINDOW_START {
            self.xdata[addr as usize]
        } else {
            self.code[addr as usize]
        }
    }

    /// Runs the subset of 8051 code that gets injected, starting at `pc`.
    fn run(&mut self, mut pc: u16) -> std::result::Result<(), ()> {
        let mut a: u8 = 0;
        let mut dptr: u16 = 0;

        loop {
            match self.code_byte(pc) {
                0x90 => {
                    dptr = u16::from_be_bytes([self.code_byte(pc + 1), self.code_byte(pc + 2)]);
                    pc += 3;
                }
                0xe5 => {
                    a = self.iram[self.code_byte(pc + 1) as usize];
                    pc += 2;
                }
                op => {
                    match op {
                        0xe0 => a = self.xdata[dptr as usize],
                        0xf0 => self.xdata[dptr as usize] = a,
                        0xa3 => dptr = dptr.wrapping_add(1),
                        0xe4 => a = 0,
                        0x93 => a = self.code_byte(dptr.wrapping_add(a as u16)),
                        0x22 => return Ok(()),
                        _ => return Err(()),
                    }
                    pc += 1;
                }
            }
        }
    }
}

fn stall(request: ControlRequest) -> Error {
    Error::Transfer {
        request,
        source: rusb::Error::Pipe,
    }
}

impl Transport for MockDevice {
    fn read(&mut self, request: u8, value: u16, index: u16, length: usize) -> Result<Bytes> {
        let req = ControlRequest::read(request, value, index);
        self.issue(req)?;

        let length = if self.short_reads { length - 1 } else { length };
        let data = match (request, index) {
            (0x00, 3) => {
                let marker = crate::primitives::MARKER_ADDR as usize;
                &self.xdata[marker..marker + length]
            }
            (0x07, offset) if length <= 64 => {
                let offset = offset as usize;
                &self.srom[offset..offset + length]
            }
            _ => return Err(stall(req)),
        };

        Ok(Bytes::copy_from_slice(data))
    }

    fn write(&mut self, request: u8, value: u16, index: u16, data: &[u8]) -> Result<usize> {
        let req = ControlRequest::write(request, value, index);
        self.issue(req)?;

        match request {
            0x01 => self.unlocked = true,
            0x03 => self.unlocked = false,
            0x02 if self.unlocked && data.len() <= 64 => {
                let offset = index as usize;
                self.srom[offset..offset + data.len()].copy_from_slice(data);
            }
            0x42 => self.xdata[index as usize] = value as u8,
            0x41 => {
                let target = CALL_TARGET_ADDR as usize;
                let callee = u16::from_be_bytes([self.xdata[target], self.xdata[target + 1]]);
                if callee < SHARED_WINDOW_START || self.run(callee).is_err() {
                    return Err(stall(req));
                }
            }
            _ => return Err(stall(req)),
        }

        Ok(data.len())
    }
}
