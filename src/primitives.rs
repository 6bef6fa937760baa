//! Requests understood by the device once the patched SROM is running.

use crate::{usb::ControlRequest, usb::Transport, Error, Result};
use std::{convert::TryFrom, fmt, str::FromStr};

/// XDATA address of the buffer that injected code leaves its results in.
pub const MARKER_ADDR: u16 = 0xfedb;

/// Size of the marker buffer.
pub const MARKER_SIZE: usize = 4;

const REQUEST_READ_MARKER: u8 = 0x00;
const REQUEST_CALL: u8 = 0x41;
const REQUEST_WRITE: u8 = 0x42;

/// XDATA address controlling the LED.
const LED_ADDR: u16 = 0x80;

/// Reads the marker buffer.
pub fn read_marker<T: Transport>(dev: &mut T) -> Result<[u8; MARKER_SIZE]> {
    let data = dev.read(REQUEST_READ_MARKER, 0, 3, MARKER_SIZE)?;
    <[u8; MARKER_SIZE]>::try_from(&data[..]).map_err(|_| Error::ShortRead {
        request: ControlRequest::read(REQUEST_READ_MARKER, 0, 3),
        expected: MARKER_SIZE,
        actual: data.len(),
    })
}

/// Writes `value` to XDATA `addr`.
pub fn arbitrary_write<T: Transport>(dev: &mut T, addr: u16, value: u8) -> Result<()> {
    dev.write(REQUEST_WRITE, value as u16, addr, &[])?;
    Ok(())
}

/// Calls the address currently stored in the dispatch routine's `LCALL`.
pub fn arbitrary_call<T: Transport>(dev: &mut T) -> Result<()> {
    dev.write(REQUEST_CALL, 0, 0, &[])?;
    Ok(())
}

/// State of the device's LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Led {
    On,
    Off,
}

impl FromStr for Led {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "on" => Ok(Led::On),
            "off" => Ok(Led::Off),
            _ => Err(format!("invalid LED status `{}`, expected `on` or `off`", s)),
        }
    }
}

impl fmt::Display for Led {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Led::On => f.write_str("on"),
            Led::Off => f.write_str("off"),
        }
    }
}

/// Switches the LED on or off.
pub fn set_led<T: Transport>(dev: &mut T, status: Led) -> Result<()> {
    let value = match status {
        Led::On => 0x02,
        Led::Off => 0x00,
    };
    arbitrary_write(dev, LED_ADDR, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDevice;

    #[test]
    fn test_arbitrary_write() {
        let mut dev = MockDevice::new();
        arbitrary_write(&mut dev, 0x1234, 0xab).unwrap();
        assert_eq!(dev.xdata[0x1234], 0xab);
        assert_eq!(dev.log, vec![ControlRequest::write(0x42, 0xab, 0x1234)]);
    }

    #[test]
    fn test_read_marker() {
        let mut dev = MockDevice::new();
        let marker = MARKER_ADDR as usize;
        dev.xdata[marker..marker + 4].copy_from_slice(&[1, 2, 3, 4]);

        assert_eq!(read_marker(&mut dev).unwrap(), [1, 2, 3, 4]);
        assert_eq!(dev.log, vec![ControlRequest::read(0x00, 0, 3)]);
    }

    #[test]
    fn test_read_marker_short() {
        let mut dev = MockDevice::new();
        dev.short_reads = true;
        assert!(matches!(
            read_marker(&mut dev),
            Err(Error::ShortRead { expected: 4, .. })
        ));
    }

    #[test]
    fn test_set_led() {
        let mut dev = MockDevice::new();
        set_led(&mut dev, Led::On).unwrap();
        assert_eq!(dev.xdata[0x80], 0x02);
        set_led(&mut dev, Led::Off).unwrap();
        assert_eq!(dev.xdata[0x80], 0x00);
        assert_eq!(dev.log[0], ControlRequest::write(0x42, 0x02, 0x80));
    }

    #[test]
    fn test_led_from_str() {
        assert_eq!("on".parse::<Led>(), Ok(Led::On));
        assert_eq!("off".parse::<Led>(), Ok(Led::Off));
        assert!("blink".parse::<Led>().is_err());
    }
}
