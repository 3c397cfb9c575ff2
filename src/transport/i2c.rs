//! Linux i2c-dev Transportation.
use std::{
    fs::{File, OpenOptions},
    io::Write,
    os::unix::io::AsRawFd,
    path::{Path, PathBuf},
};

use super::Transport;
use crate::error::{Result, TransportError};

/// i2c-dev ioctl constants, see `linux/i2c-dev.h`
mod ioctl {
    use nix::{ioctl_write_int_bad, ioctl_write_ptr_bad};

    const I2C_SLAVE: u16 = 0x0703;
    const I2C_RDWR: u16 = 0x0707;

    pub const I2C_M_RD: u16 = 0x0001;

    /// Matches the kernel's `struct i2c_msg`
    #[repr(C)]
    pub struct I2cMsg {
        pub addr: u16,
        pub flags: u16,
        pub len: u16,
        pub buf: *mut u8,
    }

    /// Matches the kernel's `struct i2c_rdwr_ioctl_data`
    #[repr(C)]
    pub struct I2cRdwrData {
        pub msgs: *mut I2cMsg,
        pub nmsgs: u32,
    }

    ioctl_write_int_bad!(i2c_slave, I2C_SLAVE);
    ioctl_write_ptr_bad!(i2c_rdwr, I2C_RDWR, I2cRdwrData);
}

pub struct I2cTransport {
    file: File,
    address: u16,
}

impl I2cTransport {
    /// Resolve a bus identifier: a bare number `N` means `/dev/i2c-N`.
    pub fn bus_path(bus: &str) -> PathBuf {
        if !bus.is_empty() && bus.chars().all(|c| c.is_ascii_digit()) {
            PathBuf::from(format!("/dev/i2c-{}", bus))
        } else {
            PathBuf::from(bus)
        }
    }

    pub fn open<P: AsRef<Path>>(path: P, address: u16) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Opening I2C bus {} @ 0x{:02x}", path.display(), address);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(TransportError::Io)?;

        unsafe {
            ioctl::i2c_slave(file.as_raw_fd(), address.into())
                .map_err(|e| TransportError::Io(std::io::Error::from_raw_os_error(e as i32)))?;
        }

        Ok(I2cTransport { file, address })
    }
}

impl Transport for I2cTransport {
    fn send_raw(&mut self, raw: &[u8]) -> Result<()> {
        let written = self.file.write(raw).map_err(TransportError::Io)?;
        if written != raw.len() {
            return Err(TransportError::ShortWrite {
                addr: frame_addr(raw),
                written,
                expected: raw.len(),
            }
            .into());
        }
        Ok(())
    }

    fn transfer_raw(&mut self, raw: &[u8], buf: &mut [u8]) -> Result<()> {
        let addr = frame_addr(raw);
        let mut wbuf = raw.to_vec();
        let mut msgs = [
            ioctl::I2cMsg {
                addr: self.address,
                flags: 0,
                len: wbuf.len() as u16,
                buf: wbuf.as_mut_ptr(),
            },
            ioctl::I2cMsg {
                addr: self.address,
                flags: ioctl::I2C_M_RD,
                len: buf.len() as u16,
                buf: buf.as_mut_ptr(),
            },
        ];
        let data = ioctl::I2cRdwrData {
            msgs: msgs.as_mut_ptr(),
            nmsgs: msgs.len() as u32,
        };

        let completed = unsafe { ioctl::i2c_rdwr(self.file.as_raw_fd(), &data) }
            .map_err(|e| TransportError::Io(std::io::Error::from_raw_os_error(e as i32)))?;
        if completed != 2 {
            return Err(TransportError::IncompleteRead {
                addr,
                completed: completed.max(0) as usize,
            }
            .into());
        }
        Ok(())
    }
}

fn frame_addr(raw: &[u8]) -> u16 {
    match raw {
        [hi, lo, ..] => u16::from_be_bytes([*hi, *lo]),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_path() {
        assert_eq!(I2cTransport::bus_path("0"), PathBuf::from("/dev/i2c-0"));
        assert_eq!(I2cTransport::bus_path("12"), PathBuf::from("/dev/i2c-12"));
        assert_eq!(
            I2cTransport::bus_path("/dev/i2c-3"),
            PathBuf::from("/dev/i2c-3")
        );
    }

    #[test]
    fn test_frame_addr() {
        assert_eq!(frame_addr(&[0x30, 0x48, 0x80]), 0x3048);
        assert_eq!(frame_addr(&[0x04]), 0);
    }
}
