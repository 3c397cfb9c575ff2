//! Status-polling cycles run by the MTP bootloaders.
//!
//! Each cycle writes a start command into the programming area, then polls
//! the status register until the busy bit clears or the retry budget runs
//! out. A cycle is never restarted; any non-success outcome is returned as an
//! error.

use std::fmt;

use crate::constants::{commands, registers, status, timing};
use crate::error::{Error, Result};
use crate::protocol::{self, StatusFailure, VerifyStatus};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cycle {
    Program,
    Verify,
    Repair,
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cycle::Program => write!(f, "program"),
            Cycle::Verify => write!(f, "verify"),
            Cycle::Repair => write!(f, "repair"),
        }
    }
}

impl Cycle {
    pub const fn start_command(self) -> u8 {
        match self {
            Cycle::Program => commands::START_PROGRAM,
            Cycle::Verify => commands::START_VERIFY,
            Cycle::Repair => commands::START_REPAIR,
        }
    }

    /// Number of status reads before giving up.
    pub const fn retry_budget(self) -> u32 {
        match self {
            Cycle::Program => timing::PROGRAM_RETRIES,
            Cycle::Verify => timing::VERIFY_RETRIES,
            Cycle::Repair => timing::REPAIR_RETRIES,
        }
    }

    /// Register read when the chip ends in a state outside the cycle's code space.
    pub const fn diagnostic_register(self) -> Option<u16> {
        match self {
            Cycle::Program => Some(registers::PROGRAM_DIAGNOSTIC),
            Cycle::Verify => None,
            Cycle::Repair => Some(registers::PROGRAMMING_AREA),
        }
    }

    fn read_status<T: Transport>(self, transport: &mut T) -> Result<u16> {
        match self {
            Cycle::Verify => transport.read_u16(registers::PROGRAMMING_AREA),
            Cycle::Program | Cycle::Repair => {
                Ok(transport.read_byte(registers::PROGRAMMING_AREA)?.into())
            }
        }
    }
}

/// Start `cycle` and poll until the chip reports idle, returning the raw
/// status (one byte widened, or the verify word).
fn run<T: Transport>(transport: &mut T, cycle: Cycle) -> Result<u16> {
    transport.write_byte(registers::PROGRAMMING_AREA, cycle.start_command())?;

    let budget = cycle.retry_budget();
    let mut last = 0;
    for poll in 1..=budget {
        last = cycle.read_status(transport)?;
        if last & status::BUSY == 0 {
            log::trace!("{} cycle idle after {} polls: 0x{:04x}", cycle, poll, last);
            return Ok(last);
        }
        transport.delay(timing::POLL_INTERVAL);
    }

    Err(Error::ProtocolTimeout {
        cycle,
        polls: budget,
        status: last,
    })
}

fn fail<T: Transport>(
    transport: &mut T,
    cycle: Cycle,
    section: Option<u16>,
    failure: StatusFailure,
) -> Error {
    let diagnostic = match cycle.diagnostic_register() {
        Some(reg) if failure.is_unknown() => match transport.read_byte(reg) {
            Ok(value) => Some((reg, value)),
            Err(e) => return e,
        },
        _ => None,
    };
    Error::Status {
        cycle,
        section,
        failure,
        diagnostic,
    }
}

/// Program the section currently loaded in the programming area.
pub fn program_cycle<T: Transport>(transport: &mut T, start_addr: u16) -> Result<()> {
    let code = run(transport, Cycle::Program)? as u8;
    match protocol::classify_program(code) {
        Ok(()) => {
            log::debug!("0x{:04x} ok", start_addr);
            Ok(())
        }
        Err(failure) => Err(fail(transport, Cycle::Program, Some(start_addr), failure)),
    }
}

/// Check the CRC of the region described in the programming area.
pub fn verify_cycle<T: Transport>(transport: &mut T) -> Result<()> {
    let word = VerifyStatus::from(run(transport, Cycle::Verify)?);
    match protocol::classify_verify(word) {
        Ok(()) => {
            log::info!("CRC verify ok (0x{:04x})", word.0);
            Ok(())
        }
        Err(failure) => Err(fail(transport, Cycle::Verify, None, failure)),
    }
}

pub fn repair_cycle<T: Transport>(transport: &mut T) -> Result<()> {
    let code = run(transport, Cycle::Repair)? as u8;
    match protocol::classify_repair(code) {
        Ok(()) => {
            log::info!("Repair ok");
            Ok(())
        }
        Err(failure) => Err(fail(transport, Cycle::Repair, None, failure)),
    }
}
