#![deny(rust_2018_idioms)]

#[macro_use]
mod macros;

use lights_out::{
    fetch::{Area, Fetcher},
    patch, primitives,
    primitives::Led,
    srom,
    usb::{get_device, ControlRequest, Observer, UsbTransport},
};
use std::{fmt, path::PathBuf, str::FromStr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("to access device: Permission denied.")]
    PermissionDenied,
    #[error("to find the device. Is it plugged in?")]
    NoDevice,
    #[error("to open device: It is busy.")]
    Busy,
    #[error("due to an I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("{0}")]
    Exploit(#[from] lights_out::Error),
    #[error("due an unknown usb error: {0}")]
    UnknownUsbError(#[from] rusb::Error),
}

/// Firmware and memory extraction for the 5986:02d2 USB device.
#[derive(argh::FromArgs)]
struct Arguments {
    /// print every control transfer sent to the device.
    #[argh(switch, short = 'v')]
    verbose: bool,

    /// override the vendor ID, decimal or 0x-prefixed hex.
    #[argh(option, short = 'V')]
    vendor_id: Option<UsbId>,
    /// override the product ID, decimal or 0x-prefixed hex.
    #[argh(option, short = 'P')]
    product_id: Option<UsbId>,

    #[argh(subcommand)]
    command: Command,
}

#[derive(argh::FromArgs)]
#[argh(subcommand)]
enum Command {
    Patch(PatchCommand),
    Srom(SromCommand),
    Fetch(FetchCommand),
    Led(LedCommand),
}

/// Patch an SROM image to expose the write and call primitives.
#[derive(argh::FromArgs)]
#[argh(subcommand, name = "patch")]
struct PatchCommand {
    /// the factory SROM image.
    #[argh(positional)]
    input: PathBuf,
    /// where to store the patched image.
    #[argh(positional)]
    output: PathBuf,
}

/// Read the SROM into a file, or write a file to the SROM.
#[derive(argh::FromArgs)]
#[argh(subcommand, name = "srom")]
struct SromCommand {
    /// either `read` or `write`.
    #[argh(positional)]
    action: SromAction,
    /// the SROM image.
    #[argh(positional)]
    file: PathBuf,
}

/// Dump IRAM, XDATA or CODE from a device running the patched SROM.
#[derive(argh::FromArgs)]
#[argh(subcommand, name = "fetch")]
struct FetchCommand {
    /// one of `iram`, `xdata` or `code`.
    #[argh(positional)]
    area: Area,
    /// where to store the dump.
    #[argh(positional)]
    output: PathBuf,
}

/// Switch the LED of a device running the patched SROM.
#[derive(argh::FromArgs)]
#[argh(subcommand, name = "led")]
struct LedCommand {
    /// either `on` or `off`.
    #[argh(positional)]
    status: Led,
}

enum SromAction {
    Read,
    Write,
}

impl FromStr for SromAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(SromAction::Read),
            "write" => Ok(SromAction::Write),
            _ => Err(format!("unknown command `{}`, expected `read` or `write`", s)),
        }
    }
}

struct UsbId(u16);

impl FromStr for UsbId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.strip_prefix("0x") {
            Some(hex) => u16::from_str_radix(hex, 16),
            None => s.parse(),
        };
        parsed
            .map(UsbId)
            .map_err(|err| format!("invalid USB id `{}`: {}", s, err))
    }
}

/// Prints control transfers as they happen.
struct Trace {
    verbose: bool,
}

impl Observer for Trace {
    fn read(&self, request: &ControlRequest, data: &[u8]) {
        if self.verbose {
            info!("Read", "{} => {} bytes {}", request, data.len(), Hex(data));
        }
    }

    fn written(&self, request: &ControlRequest, written: usize) {
        if self.verbose {
            info!("Wrote", "{} => {}", request, written);
        }
    }

    fn failed(&self, request: &ControlRequest, err: &rusb::Error) {
        error!("Failed", "{} => {}", request, err);
    }
}

struct Hex<'a>(&'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

fn main() {
    let args = argh::from_env::<Arguments>();
    match run(args) {
        Ok(_) => {}
        Err(err) => {
            error!("Failed", "{}", err);
            std::process::exit(1);
        }
    }
}

fn run(args: Arguments) -> Result<(), Error> {
    let vid = args.vendor_id.map(|id| id.0);
    let pid = args.product_id.map(|id| id.0);
    let trace = Trace {
        verbose: args.verbose,
    };

    match args.command {
        Command::Patch(cmd) => patch_image(cmd),
        Command::Srom(cmd) => {
            let mut dev = open_device(vid, pid, trace)?;
            match cmd.action {
                SromAction::Read => read_srom(&mut dev, cmd.file),
                SromAction::Write => write_srom(&mut dev, cmd.file),
            }
        }
        Command::Fetch(cmd) => {
            let mut dev = open_device(vid, pid, trace)?;
            fetch_area(&mut dev, cmd)
        }
        Command::Led(cmd) => {
            let mut dev = open_device(vid, pid, trace)?;
            primitives::set_led(&mut dev, cmd.status)?;
            ok!("Switched", "the LED {}", cmd.status);
            Ok(())
        }
    }
}

fn patch_image(cmd: PatchCommand) -> Result<(), Error> {
    info!("Reading", "SROM image from {:?}...", cmd.input);
    let image = std::fs::read(&cmd.input)?;
    if image.len() != srom::SROM_SIZE {
        info!(
            "Warning",
            "image is {:#x} bytes long, the SROM holds {:#x}",
            image.len(),
            srom::SROM_SIZE
        );
    }

    let patched = patch::patch_srom(&image)?;
    std::fs::write(&cmd.output, &patched)?;
    ok!("Patched", "SROM image written to {:?}", cmd.output);

    Ok(())
}

fn read_srom(dev: &mut UsbTransport<Trace>, file: PathBuf) -> Result<(), Error> {
    info!("Reading", "{:#x} bytes of SROM...", srom::SROM_SIZE);
    let data = srom::read_srom(dev, srom::SROM_SIZE)?;
    std::fs::write(&file, &data)?;
    ok!("Read", "SROM into {:?}", file);

    Ok(())
}

fn write_srom(dev: &mut UsbTransport<Trace>, file: PathBuf) -> Result<(), Error> {
    info!("Reading", "SROM image from {:?}...", file);
    let data = std::fs::read(&file)?;

    info!("Writing", "SROM, this takes a few minutes...");
    srom::write_srom(dev, &data, srom::SETTLE_TIME)?;
    ok!("Wrote", "{:?} to the SROM", file);

    Ok(())
}

fn fetch_area(dev: &mut UsbTransport<Trace>, cmd: FetchCommand) -> Result<(), Error> {
    info!("Fetching", "{} from the device...", cmd.area);
    let data = Fetcher::new(dev)
        .on_progress(|done, total| {
            if done % 0x1000 == 0 || done == total {
                info!("Fetched", "{:#x} of {:#x} bytes", done, total);
            }
        })
        .fetch(cmd.area)?;

    std::fs::write(&cmd.output, &data)?;
    ok!("Fetched", "{} into {:?}", cmd.area, cmd.output);

    Ok(())
}

fn open_device(
    vid: Option<u16>,
    pid: Option<u16>,
    trace: Trace,
) -> Result<UsbTransport<Trace>, Error> {
    info!("Searching", "for the device...");
    let dev = match get_device(vid, pid) {
        Ok(dev) => UsbTransport::new(dev, trace),
        Err(rusb::Error::Access) => return Err(Error::PermissionDenied),
        Err(rusb::Error::NoDevice) => return Err(Error::NoDevice),
        Err(rusb::Error::Busy) => return Err(Error::Busy),
        Err(e) => return Err(e.into()),
    };

    let device = dev.get_device();
    ok!(
        "Found",
        "device on bus {} address {}",
        device.bus_number(),
        device.address()
    );

    Ok(dev)
}
