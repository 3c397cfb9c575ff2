//! In-memory P9320 emulator for tests.
//!
//! Backs the full 16-bit register space with plain memory and plays back
//! scripted outcomes whenever a cycle is started in the programming area.
use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use super::Transport;
use crate::constants::{commands, registers};
use crate::error::{Error, Result, TransportError};

/// Scripted result of one cycle: how many polls report busy and which bytes
/// land at 0x0400/0x0401 afterwards.
#[derive(Debug, Clone, Copy)]
pub struct Outcome {
    pub busy_polls: u32,
    pub status: [u8; 2],
}

impl Outcome {
    pub fn byte(status: u8) -> Self {
        Outcome {
            busy_polls: 2,
            status: [status, 0],
        }
    }

    pub fn word(status: u16) -> Self {
        Outcome {
            busy_polls: 2,
            status: status.to_le_bytes(),
        }
    }

    pub fn never_idle() -> Self {
        Outcome {
            busy_polls: u32::MAX,
            status: [0, 0],
        }
    }
}

#[derive(Debug, Default)]
struct Pending {
    busy_polls: u32,
    busy_value: [u8; 2],
    status: [u8; 2],
}

pub struct MockChip {
    mem: Vec<u8>,
    frames: Vec<Vec<u8>>,
    delays: Vec<Duration>,
    outcomes: VecDeque<Outcome>,
    pending: Option<Pending>,
    /// Address whose value is inverted on every read
    corrupt: Option<u16>,
    /// Bytes stored at 0x0400 when the processor is reset
    on_reset: Option<[u8; 2]>,
    nack_reset: bool,
    /// Register whose writes fail
    fail_write: Option<u16>,
    /// Register whose reads fail
    fail_read: Option<u16>,
    pub starts: Vec<u8>,
    pub polls: u32,
}

impl MockChip {
    pub fn new() -> Self {
        MockChip {
            mem: vec![0u8; 0x1_0000],
            frames: Vec::new(),
            delays: Vec::new(),
            outcomes: VecDeque::new(),
            pending: None,
            corrupt: None,
            on_reset: None,
            nack_reset: false,
            fail_write: None,
            fail_read: None,
            starts: Vec::new(),
            polls: 0,
        }
    }

    pub fn with_outcomes(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        let mut chip = Self::new();
        chip.outcomes.extend(outcomes);
        chip
    }

    pub fn corrupt_at(mut self, addr: u16) -> Self {
        self.corrupt = Some(addr);
        self
    }

    pub fn on_reset(mut self, value: [u8; 2]) -> Self {
        self.on_reset = Some(value);
        self
    }

    pub fn nack_reset(mut self) -> Self {
        self.nack_reset = true;
        self
    }

    pub fn fail_write_to(mut self, addr: u16) -> Self {
        self.fail_write = Some(addr);
        self
    }

    pub fn fail_read_at(mut self, addr: u16) -> Self {
        self.fail_read = Some(addr);
        self
    }

    /// Every write frame, address bytes included
    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    /// Write frames decoded as (register, payload)
    pub fn writes(&self) -> Vec<(u16, Vec<u8>)> {
        self.frames
            .iter()
            .map(|f| (u16::from_be_bytes([f[0], f[1]]), f[2..].to_vec()))
            .collect()
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    pub fn mem(&self, addr: u16, len: usize) -> &[u8] {
        &self.mem[addr as usize..addr as usize + len]
    }

    fn start_cycle(&mut self, command: u8) {
        self.starts.push(command);
        let outcome = self.outcomes.pop_front().unwrap_or(Outcome::byte(0x02));
        // verify reports busy in the low byte of a word, the others in one byte
        let busy_value = if command == commands::START_VERIFY {
            [0x01, 0x00]
        } else {
            [0x01, self.mem[registers::PROGRAM_DIAGNOSTIC as usize]]
        };
        self.pending = Some(Pending {
            busy_polls: outcome.busy_polls,
            busy_value,
            status: outcome.status,
        });
    }

    fn poll(&mut self) {
        let base = registers::PROGRAMMING_AREA as usize;
        if let Some(pending) = self.pending.as_mut() {
            self.polls += 1;
            if pending.busy_polls > 0 {
                pending.busy_polls -= 1;
                self.mem[base..base + 2].copy_from_slice(&pending.busy_value);
            } else {
                self.mem[base..base + 2].copy_from_slice(&pending.status);
                self.pending = None;
            }
        }
    }
}

fn injected(addr: u16) -> Error {
    TransportError::Io(io::Error::other(format!("no ack at 0x{:04x}", addr))).into()
}

impl Transport for MockChip {
    fn send_raw(&mut self, raw: &[u8]) -> Result<()> {
        self.frames.push(raw.to_vec());
        let addr = u16::from_be_bytes([raw[0], raw[1]]);
        let data = &raw[2..];

        if self.fail_write == Some(addr) {
            return Err(injected(addr));
        }

        if addr == registers::CONTROL && data == [0x80] {
            if let Some(value) = self.on_reset {
                let base = registers::PROGRAMMING_AREA as usize;
                self.mem[base..base + 2].copy_from_slice(&value);
            }
            if self.nack_reset {
                return Err(TransportError::ShortWrite {
                    addr,
                    written: 0,
                    expected: raw.len(),
                }
                .into());
            }
        }

        let start = addr as usize;
        self.mem[start..start + data.len()].copy_from_slice(data);

        if addr == registers::PROGRAMMING_AREA
            && data.len() == 1
            && (data[0] == commands::START_PROGRAM || data[0] == commands::START_VERIFY)
        {
            self.start_cycle(data[0]);
        }
        Ok(())
    }

    fn transfer_raw(&mut self, raw: &[u8], buf: &mut [u8]) -> Result<()> {
        let addr = u16::from_be_bytes([raw[0], raw[1]]);
        if self.fail_read == Some(addr) {
            return Err(injected(addr));
        }
        if addr == registers::PROGRAMMING_AREA {
            self.poll();
        }
        let start = addr as usize;
        buf.copy_from_slice(&self.mem[start..start + buf.len()]);
        if let Some(bad) = self.corrupt {
            let bad = bad as usize;
            if (start..start + buf.len()).contains(&bad) {
                buf[bad - start] ^= 0xff;
            }
        }
        Ok(())
    }

    fn delay(&mut self, duration: Duration) {
        self.delays.push(duration);
    }
}
