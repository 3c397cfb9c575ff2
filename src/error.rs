//! Error types for MTP programming.

use std::fmt;

use thiserror::Error;

use crate::cycle::Cycle;
use crate::protocol::StatusFailure;

/// Bus level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying device I/O failed
    #[error("I2C transfer failed: {0}")]
    Io(#[source] std::io::Error),

    /// Fewer bytes were accepted than requested
    #[error("short write to 0x{addr:04x}: {written} of {expected} bytes")]
    ShortWrite {
        addr: u16,
        written: usize,
        expected: usize,
    },

    /// The combined address-write/read transaction did not complete
    #[error("read from 0x{addr:04x} failed: {completed} of 2 messages transferred")]
    IncompleteRead { addr: u16, completed: usize },
}

/// A single byte that differs between the bootloader image and the chip RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    /// Offset from the start of the image
    pub offset: usize,
    pub expected: u8,
    pub actual: u8,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "byte {}: expected 0x{:02x}, actual 0x{:02x}",
            self.offset, self.expected, self.actual
        )
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Firmware image does not fit in MTP
    #[error("firmware is {size} bytes, MTP holds at most {limit}")]
    SizeLimit { size: usize, limit: usize },

    /// Section payload does not fit in one descriptor
    #[error("section 0x{start_addr:04x} carries {len} bytes, a descriptor holds at most {limit}")]
    SectionTooLarge {
        start_addr: u16,
        len: usize,
        limit: usize,
    },

    /// Bootloader read-back differs from the image
    #[error(
        "bootloader verification at 0x{base:04x} failed, {} byte(s) differ: {}",
        .mismatches.len(),
        join_mismatches(.mismatches)
    )]
    VerificationMismatch {
        base: u16,
        mismatches: Vec<Mismatch>,
    },

    /// Retry budget exhausted while the chip still reported busy
    #[error("timeout waiting for {cycle} cycle after {polls} polls, last status 0x{status:04x}")]
    ProtocolTimeout { cycle: Cycle, polls: u32, status: u16 },

    /// The chip finished the cycle with an error or unknown status
    #[error("{cycle} cycle failed{}: {failure}{}", section_suffix(.section), diagnostic_suffix(.diagnostic))]
    Status {
        cycle: Cycle,
        /// Start address of the section being programmed
        section: Option<u16>,
        failure: StatusFailure,
        /// Secondary status byte, where the protocol defines one
        diagnostic: Option<(u16, u8)>,
    },

    /// Bootloader image missing or unusable
    #[error("bootloader image {path}: {reason}")]
    Bootloader { path: String, reason: String },

    /// Firmware file could not be read
    #[error("cannot read {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid chip profile
    #[error("invalid chip profile: {0}")]
    Config(String),

    #[error("encoding error: {0}")]
    Codec(#[from] scroll::Error),
}

/// Result type for MTP programming operations
pub type Result<T> = std::result::Result<T, Error>;

fn join_mismatches(mismatches: &[Mismatch]) -> String {
    mismatches
        .iter()
        .map(Mismatch::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn section_suffix(section: &Option<u16>) -> String {
    section
        .map(|addr| format!(" at section 0x{:04x}", addr))
        .unwrap_or_default()
}

fn diagnostic_suffix(diagnostic: &Option<(u16, u8)>) -> String {
    diagnostic
        .map(|(reg, value)| format!(" (0x{:04x}: 0x{:02x})", reg, value))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_message_lists_every_offset() {
        let err = Error::VerificationMismatch {
            base: 0x0800,
            mismatches: vec![
                Mismatch {
                    offset: 3,
                    expected: 0xaa,
                    actual: 0x55,
                },
                Mismatch {
                    offset: 17,
                    expected: 0x00,
                    actual: 0xff,
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 byte(s) differ"));
        assert!(msg.contains("byte 3: expected 0xaa, actual 0x55"));
        assert!(msg.contains("byte 17: expected 0x00, actual 0xff"));
    }

    #[test]
    fn test_status_message_includes_diagnostic() {
        let err = Error::Status {
            cycle: Cycle::Program,
            section: Some(0x0080),
            failure: StatusFailure::Unknown(0x10),
            diagnostic: Some((0x0401, 0x3c)),
        };
        assert_eq!(
            err.to_string(),
            "program cycle failed at section 0x0080: unknown status 0x0010 (0x0401: 0x3c)"
        );
    }
}
