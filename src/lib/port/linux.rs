use super::Transport;

use glob::glob;
use log::debug;
use nix::ioctl_write_ptr_bad;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;

/// An open `/dev/i2c-N` character device.
#[derive(Debug)]
pub struct I2cBus {
    file: File,
}

pub fn open_native(device: &str) -> io::Result<I2cBus> {
    let file = OpenOptions::new().read(true).write(true).open(device)?;
    Ok(I2cBus { file })
}

pub fn is_bus_open(device: &str) -> bool {
    let entries = match glob("/proc/[0-9]*/fd/*") {
        Ok(entries) => entries,
        Err(_) => return false,
    };

    entries
        .filter_map(|p| match p {
            Ok(path) => Some(path),
            Err(_) => None,
        })
        .filter_map(|path| match fs::read_link(path) {
            Ok(link) => Some(link),
            Err(_) => None,
        })
        .any(|link| link.to_str() == Some(device))
}

impl I2cBus {
    fn transfer(&self, msgs: &mut [ioctl::i2c_msg]) -> io::Result<()> {
        let data = ioctl::i2c_rdwr_ioctl_data {
            msgs: msgs.as_mut_ptr(),
            nmsgs: msgs.len() as u32,
        };
        // The kernel only touches `msgs` and their buffers, which outlive the call.
        match unsafe { ioctl::i2c_rdwr(self.file.as_raw_fd(), &data) } {
            Ok(_) => Ok(()),
            Err(errno) => Err(io::Error::from_raw_os_error(errno as i32)),
        }
    }
}

impl Transport for I2cBus {
    fn write_byte(&mut self, address: u8, register: u8, value: u8) -> io::Result<()> {
        let mut buf = [register, value];

        debug!("i2c write {:#04x}: {:02X?}", address, buf);
        self.transfer(&mut [ioctl::i2c_msg::write(address, &mut buf)])
    }

    fn read_block(&mut self, address: u8, register: u8, length: usize) -> io::Result<Vec<u8>> {
        let mut command = [register];
        let mut buf = vec![0u8; length];

        self.transfer(&mut [
            ioctl::i2c_msg::write(address, &mut command),
            ioctl::i2c_msg::read(address, &mut buf),
        ])?;
        debug!("i2c read {:#04x} {:#04x}: {:02X?}", address, register, buf);

        Ok(buf)
    }
}

mod ioctl {
    use super::*;

    const I2C_M_RD: u16 = 0x0001;
    const I2C_RDWR: u32 = 0x0707;

    #[allow(non_camel_case_types)]
    #[derive(Debug)]
    #[repr(C)]
    pub struct i2c_msg {
        addr: u16,
        flags: u16,
        len: u16,
        buf: *mut u8,
    }

    impl i2c_msg {
        pub fn write(address: u8, buf: &mut [u8]) -> Self {
            i2c_msg {
                addr: u16::from(address),
                flags: 0,
                len: buf.len() as u16,
                buf: buf.as_mut_ptr(),
            }
        }

        pub fn read(address: u8, buf: &mut [u8]) -> Self {
            i2c_msg {
                addr: u16::from(address),
                flags: I2C_M_RD,
                len: buf.len() as u16,
                buf: buf.as_mut_ptr(),
            }
        }
    }

    #[allow(non_camel_case_types)]
    #[derive(Debug)]
    #[repr(C)]
    pub struct i2c_rdwr_ioctl_data {
        pub msgs: *mut i2c_msg,
        pub nmsgs: u32,
    }

    ioctl_write_ptr_bad!(i2c_rdwr, I2C_RDWR, i2c_rdwr_ioctl_data);
}
