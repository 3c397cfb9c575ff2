//! Abstract register transport.
use std::time::Duration;

use scroll::{LE, Pread};

use crate::error::Result;

pub use self::i2c::I2cTransport;

mod i2c;
#[cfg(test)]
pub(crate) mod mock;

/// Abstraction of the register-addressed bus.
///
/// Implementors only move raw frames. Framing a 16-bit big-endian register
/// address in front of the payload is done by the provided methods.
pub trait Transport {
    /// Send one write transaction.
    fn send_raw(&mut self, raw: &[u8]) -> Result<()>;

    /// Write `raw`, then read `buf.len()` bytes in one chained transaction.
    fn transfer_raw(&mut self, raw: &[u8], buf: &mut [u8]) -> Result<()>;

    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn write(&mut self, addr: u16, data: &[u8]) -> Result<()> {
        let mut req = Vec::with_capacity(2 + data.len());
        req.extend_from_slice(&addr.to_be_bytes());
        req.extend_from_slice(data);
        log::trace!("=> {}", hex::encode(&req));
        self.send_raw(&req)
    }

    fn read(&mut self, addr: u16, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.transfer_raw(&addr.to_be_bytes(), &mut buf)?;
        log::trace!("<= {:04x} {}", addr, hex::encode(&buf));
        Ok(buf)
    }

    fn write_byte(&mut self, addr: u16, value: u8) -> Result<()> {
        self.write(addr, &[value])
    }

    fn read_byte(&mut self, addr: u16) -> Result<u8> {
        Ok(self.read(addr, 1)?[0])
    }

    fn read_u16(&mut self, addr: u16) -> Result<u16> {
        let raw = self.read(addr, 2)?;
        Ok(raw.pread_with::<u16>(0, LE)?)
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockChip;
    use super::*;

    #[test]
    fn test_write_frames_big_endian_address() {
        let mut chip = MockChip::new();
        chip.write(0x3040, &[0x11, 0x22]).unwrap();
        assert_eq!(chip.frames(), &[vec![0x30, 0x40, 0x11, 0x22]]);
    }

    #[test]
    fn test_read_u16_is_little_endian() {
        let mut chip = MockChip::new();
        chip.write(0x0400, &[0xad, 0xde]).unwrap();
        assert_eq!(chip.read_u16(0x0400).unwrap(), 0xdead);
        assert_eq!(chip.read_byte(0x0401).unwrap(), 0xde);
    }
}
