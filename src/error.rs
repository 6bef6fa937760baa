use crate::usb::ControlRequest;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("to transfer {request}: {source}")]
    Transfer {
        request: ControlRequest,
        #[source]
        source: rusb::Error,
    },
    #[error("because the image is {actual:#x} bytes long instead of {expected:#x}.")]
    InvalidLength { expected: usize, actual: usize },
    #[error("because address {0:#06x} is outside of the shared CODE/XDATA window.")]
    OutsideSharedWindow(u16),
    #[error("because the image is {actual:#x} bytes long, the patch needs {needed:#x}.")]
    ImageTooSmall { needed: usize, actual: usize },
    #[error("because {request} returned {actual} bytes instead of {expected}.")]
    ShortRead {
        request: ControlRequest,
        expected: usize,
        actual: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
