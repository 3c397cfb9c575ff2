//! The register-level protocol spoken by the P9320 MTP bootloaders

use std::fmt;

use bitfield::bitfield;
use scroll::{LE, Pwrite};

use crate::constants::{MTP_SIZE_LIMIT, SECTION_SIZE, status};
use crate::error::{Error, Result};

bitfield! {
    /// Processor control register (0x3040)
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct ControlReg(u8);
    impl Debug;
    pub mtp_enable, set_mtp_enable: 0;
    pub halt, set_halt: 4;
    pub reset, set_reset: 7;
}

impl ControlReg {
    pub fn halted(mtp_enable: bool) -> Self {
        let mut reg = ControlReg(0);
        reg.set_halt(true);
        reg.set_mtp_enable(mtp_enable);
        reg
    }

    pub fn soft_reset() -> Self {
        let mut reg = ControlReg(0);
        reg.set_reset(true);
        reg
    }

    pub fn bits(&self) -> u8 {
        self.0
    }
}

bitfield! {
    /// Status word polled during a verify cycle, read little-endian from 0x0400
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct VerifyStatus(u16);
    impl Debug;
    pub busy, _: 0;
    pub u8, outcome, _: 15, 8;
}

impl From<u16> for VerifyStatus {
    fn from(raw: u16) -> Self {
        VerifyStatus(raw)
    }
}

/// Terminal, non-successful state reported by a bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFailure {
    /// Program: MTP write error (0x04)
    MtpWrite,
    /// Program: section checksum mismatch (0x08)
    Checksum,
    /// Verify: CRC engine still busy (0x01 in the high byte)
    CrcBusy,
    /// Verify: CRC mismatch (0x08 in the high byte)
    Crc,
    /// Repair failed (0x40)
    Repair,
    /// Anything outside the cycle's code space, raw value
    Unknown(u16),
}

impl fmt::Display for StatusFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFailure::MtpWrite => write!(f, "MTP write error"),
            StatusFailure::Checksum => write!(f, "checksum error"),
            StatusFailure::CrcBusy => write!(f, "CRC busy"),
            StatusFailure::Crc => write!(f, "CRC error"),
            StatusFailure::Repair => write!(f, "repair error"),
            StatusFailure::Unknown(raw) => write!(f, "unknown status 0x{:04x}", raw),
        }
    }
}

impl StatusFailure {
    pub fn is_unknown(&self) -> bool {
        matches!(self, StatusFailure::Unknown(_))
    }
}

pub fn classify_program(code: u8) -> std::result::Result<(), StatusFailure> {
    match code {
        status::OK => Ok(()),
        status::MTP_WRITE_ERROR => Err(StatusFailure::MtpWrite),
        status::CHECKSUM_ERROR => Err(StatusFailure::Checksum),
        other => Err(StatusFailure::Unknown(other.into())),
    }
}

pub fn classify_verify(word: VerifyStatus) -> std::result::Result<(), StatusFailure> {
    match word.outcome() {
        status::OK => Ok(()),
        status::CRC_BUSY => Err(StatusFailure::CrcBusy),
        status::CRC_ERROR => Err(StatusFailure::Crc),
        _ => Err(StatusFailure::Unknown(word.0)),
    }
}

pub fn classify_repair(code: u8) -> std::result::Result<(), StatusFailure> {
    match code {
        status::OK => Ok(()),
        status::REPAIR_ERROR => Err(StatusFailure::Repair),
        other => Err(StatusFailure::Unknown(other.into())),
    }
}

/// 16-bit section checksum: payload byte sum plus start address plus length.
pub fn checksum(start_addr: u16, payload: &[u8]) -> u16 {
    payload
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(b.into()))
        .wrapping_add(start_addr)
        .wrapping_add(payload.len() as u16)
}

/// Header plus payload of one section, as laid out in bootloader RAM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionDescriptor {
    pub status: u16,
    pub start_addr: u16,
    pub code_length: u16,
    pub checksum: u16,
    pub payload: Vec<u8>,
}

impl SectionDescriptor {
    /// Size on the wire: four u16 header fields and a full payload buffer.
    pub const RAW_SIZE: usize = 8 + SECTION_SIZE;

    pub fn new(start_addr: u16, payload: &[u8]) -> Self {
        SectionDescriptor {
            status: 0,
            start_addr,
            code_length: payload.len() as u16,
            checksum: checksum(start_addr, payload),
            payload: payload.to_vec(),
        }
    }

    /// Whole-image descriptor for the verify bootloader, with vendor constants.
    pub fn whole_image(start_addr: u16, size: u16, checksum: u16) -> Self {
        SectionDescriptor {
            status: 0,
            start_addr,
            code_length: size,
            checksum,
            payload: Vec::new(),
        }
    }

    pub fn into_raw(self) -> Result<Vec<u8>> {
        if self.payload.len() > SECTION_SIZE {
            return Err(Error::SectionTooLarge {
                start_addr: self.start_addr,
                len: self.payload.len(),
                limit: SECTION_SIZE,
            });
        }
        let mut buf = vec![0u8; Self::RAW_SIZE];
        buf.pwrite_with(self.status, 0, LE)?;
        buf.pwrite_with(self.start_addr, 2, LE)?;
        buf.pwrite_with(self.code_length, 4, LE)?;
        buf.pwrite_with(self.checksum, 6, LE)?;
        buf[8..8 + self.payload.len()].copy_from_slice(&self.payload);
        Ok(buf)
    }
}

/// Split a firmware image into section descriptors, 128 bytes each,
/// starting at MTP address 0.
pub fn sections(firmware: &[u8]) -> impl Iterator<Item = SectionDescriptor> + '_ {
    firmware
        .chunks(SECTION_SIZE)
        .take(MTP_SIZE_LIMIT / SECTION_SIZE)
        .enumerate()
        .map(|(i, chunk)| SectionDescriptor::new((i * SECTION_SIZE) as u16, chunk))
}
