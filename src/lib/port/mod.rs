#[cfg(target_os = "linux")]
mod linux;
#[cfg(test)]
pub(crate) mod mock;

#[cfg(target_os = "linux")]
pub use linux::I2cBus;
#[cfg(target_os = "linux")]
use linux::{is_bus_open, open_native};

use glob::glob;
use log::debug;
use std::io;
use thiserror::Error;

/// Byte-level access to the devices on one I²C bus.
///
/// Implementations report every failure as an `io::Error`; a read may
/// also come back with fewer or more bytes than asked for, so callers
/// check the length themselves.
pub trait Transport {
    /// Writes `value` to `register` of the device at `address`.
    fn write_byte(&mut self, address: u8, register: u8, value: u8) -> io::Result<()>;

    /// Reads `length` bytes from the device at `address`, starting at `register`.
    fn read_block(&mut self, address: u8, register: u8, length: usize) -> io::Result<Vec<u8>>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_byte(&mut self, address: u8, register: u8, value: u8) -> io::Result<()> {
        (**self).write_byte(address, register, value)
    }

    fn read_block(&mut self, address: u8, register: u8, length: usize) -> io::Result<Vec<u8>> {
        (**self).read_block(address, register, length)
    }
}

/// Marks an `io::Error` as the host asking to stop, as opposed to a
/// failed transfer. A plain `EINTR` from the kernel is only a failed
/// transfer.
#[derive(Error, Debug)]
#[error("cancelled")]
pub struct Cancelled;

pub fn cancelled() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, Cancelled)
}

pub fn is_cancelled(e: &io::Error) -> bool {
    e.get_ref().map_or(false, |inner| inner.is::<Cancelled>())
}

#[derive(Error, Debug)]
pub enum OpenBusError {
    #[error("{device:?} busy")]
    BusBusy { device: String },
    #[error("no i2c bus devices found")]
    NoBus,
}

pub fn bus_device(number: u8) -> String {
    format!("/dev/i2c-{}", number)
}

/// Bus numbers with a device node present, in ascending order.
pub fn available_buses() -> Vec<u8> {
    let mut buses: Vec<u8> = match glob("/dev/i2c-*") {
        Ok(paths) => paths
            .filter_map(|p| p.ok())
            .filter_map(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .and_then(|name| name.strip_prefix("i2c-"))
                    .and_then(|n| n.parse().ok())
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    buses.sort_unstable();
    buses
}

/// Opens bus `number`, refusing one that another process holds unless `force`.
#[cfg(target_os = "linux")]
pub fn open_bus(number: u8, force: bool) -> io::Result<Box<dyn Transport>> {
    let device = bus_device(number);

    if !force && is_bus_open(&device) {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            OpenBusError::BusBusy { device },
        ));
    }

    let bus = open_native(&device)?;
    debug!("open_bus OK: {}", &device);
    Ok(Box::new(bus))
}

#[cfg(not(target_os = "linux"))]
pub fn open_bus(number: u8, _force: bool) -> io::Result<Box<dyn Transport>> {
    debug!("open_bus: {} not supported on this platform", bus_device(number));
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "i2c buses are only supported on linux",
    ))
}
