//! USB control-transfer plumbing for talking to the device.

use crate::{Error, Result};
use bytes::Bytes;
use rusb::{Device, DeviceHandle, DeviceList, Direction, GlobalContext, Recipient, RequestType};
use std::{fmt, time::Duration};

/// Default Vendor ID of the device.
pub const VENDOR_ID: u16 = 0x5986;
/// Default Product ID of the device.
pub const PRODUCT_ID: u16 = 0x02d2;

/// Timeout applied to every control transfer.
const TIMEOUT: Duration = Duration::from_millis(1000);

/// The direction of a control transfer, from the host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    Read,
    Write,
}

/// The parameters of a single vendor control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub transfer: Transfer,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl ControlRequest {
    pub fn read(request: u8, value: u16, index: u16) -> Self {
        ControlRequest {
            transfer: Transfer::Read,
            request,
            value,
            index,
        }
    }

    pub fn write(request: u8, value: u16, index: u16) -> Self {
        ControlRequest {
            transfer: Transfer::Write,
            request,
            value,
            index,
        }
    }
}

impl fmt::Display for ControlRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let transfer = match self.transfer {
            Transfer::Read => "read",
            Transfer::Write => "write",
        };
        write!(
            f,
            "{}, request = {:#04x}, value = {:#06x}, index = {:#06x}",
            transfer, self.request, self.value, self.index
        )
    }
}

/// Something that can issue vendor control requests to the device.
///
/// Every operation in this crate takes one of these explicitly, so the
/// components can be driven by a real device or by a simulated one.
pub trait Transport {
    /// Issues an IN request and returns the bytes the device sent back,
    /// which may be fewer than `length`.
    fn read(&mut self, request: u8, value: u16, index: u16, length: usize) -> Result<Bytes>;

    /// Issues an OUT request carrying `data` and returns the number of
    /// bytes the device accepted.
    fn write(&mut self, request: u8, value: u16, index: u16, data: &[u8]) -> Result<usize>;
}

/// Gets notified about every control transfer a [`UsbTransport`] issues.
pub trait Observer {
    /// A read completed with `data`.
    fn read(&self, _request: &ControlRequest, _data: &[u8]) {}

    /// A write completed, `written` bytes were accepted.
    fn written(&self, _request: &ControlRequest, _written: usize) {}

    /// A transfer failed.
    fn failed(&self, _request: &ControlRequest, _err: &rusb::Error) {}
}

/// The silent observer.
impl Observer for () {}

/// A [`Transport`] backed by an opened USB device.
pub struct UsbTransport<O> {
    /// The underlying USB handle to the device.
    device: DeviceHandle<GlobalContext>,
    /// Notified after every transfer.
    observer: O,
}

impl<O: Observer> UsbTransport<O> {
    pub fn new(device: DeviceHandle<GlobalContext>, observer: O) -> Self {
        UsbTransport { device, observer }
    }

    /// Returns the underlying device information used for this DeviceHandle.
    pub fn get_device(&self) -> Device<GlobalContext> {
        self.device.device()
    }
}

impl<O: Observer> Transport for UsbTransport<O> {
    fn read(&mut self, request: u8, value: u16, index: u16, length: usize) -> Result<Bytes> {
        let req = ControlRequest::read(request, value, index);
        let request_type = rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Device);

        let mut buffer = vec![0; length];
        match self
            .device
            .read_control(request_type, request, value, index, &mut buffer, TIMEOUT)
        {
            Ok(n) => {
                buffer.truncate(n);
                self.observer.read(&req, &buffer);
                Ok(Bytes::from(buffer))
            }
            Err(source) => {
                self.observer.failed(&req, &source);
                Err(Error::Transfer {
                    request: req,
                    source,
                })
            }
        }
    }

    fn write(&mut self, request: u8, value: u16, index: u16, data: &[u8]) -> Result<usize> {
        let req = ControlRequest::write(request, value, index);
        let request_type =
            rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device);

        match self
            .device
            .write_control(request_type, request, value, index, data, TIMEOUT)
        {
            Ok(n) => {
                self.observer.written(&req, n);
                Ok(n)
            }
            Err(source) => {
                self.observer.failed(&req, &source);
                Err(Error::Transfer {
                    request: req,
                    source,
                })
            }
        }
    }
}

/// Attempts to find the device and opens a handle to it.
pub fn get_device(vid: Option<u16>, pid: Option<u16>) -> rusb::Result<DeviceHandle<GlobalContext>> {
    let vid = vid.unwrap_or(VENDOR_ID);
    let pid = pid.unwrap_or(PRODUCT_ID);

    let device_list = DeviceList::new()?;

    for device in device_list.iter() {
        let descriptor = device.device_descriptor()?;

        if descriptor.product_id() == pid && descriptor.vendor_id() == vid {
            let device_handle = device.open()?;
            return Ok(device_handle);
        }
    }

    Err(rusb::Error::NoDevice)
}
