use std::time::Duration;

/// Bootloader images are written and read back in chunks of this size.
pub const BOOTLOADER_CHUNK_SIZE: usize = 16;

/// Maximum payload carried by one section descriptor.
pub const SECTION_SIZE: usize = 128;

/// MTP capacity, the upper bound of a firmware image.
pub const MTP_SIZE_LIMIT: usize = 1 << 14;

/// Value written to the programming area by the Test procedure.
pub const TEST_SENTINEL: u16 = 0xdead;

pub mod registers {
    pub const UNLOCK: u16 = 0x3000;
    pub const CLOCK_SOURCE: u16 = 0x3004;
    pub const AHB_DIVISOR: u16 = 0x3008;
    pub const PULSE_1US: u16 = 0x300c;
    pub const PULSE_500NS: u16 = 0x300d;
    pub const CONTROL: u16 = 0x3040;
    pub const REMAP: u16 = 0x3048;

    /// Programming area. Section descriptors are uploaded here and the
    /// bootloader reports cycle status in its first byte.
    pub const PROGRAMMING_AREA: u16 = 0x0400;
    /// Secondary status byte read when a program cycle ends in an unknown state.
    pub const PROGRAM_DIAGNOSTIC: u16 = 0x0401;
    pub const VERIFY_START_ADDR: u16 = 0x0402;
    pub const VERIFY_SIZE: u16 = 0x0404;
    pub const VERIFY_CHECKSUM: u16 = 0x0406;
}

pub mod values {
    pub const UNLOCK_KEY: u8 = 0x5a;
    pub const HS_CLOCK: u8 = 0x00;
    pub const AHB_CLOCK_DIVISOR: u8 = 0x09;
    pub const PULSE_1US: u8 = 0x05;
    pub const PULSE_500NS: u8 = 0x1d;
    pub const INIT_PROGRAMMING_AREA: u8 = 0x00;
}

pub mod commands {
    pub const START_PROGRAM: u8 = 0x01;
    pub const START_VERIFY: u8 = 0x11;
    pub const START_REPAIR: u8 = 0x01;
}

pub mod status {
    /// Busy flag, bit 0 of the status byte (low byte of the verify word).
    pub const BUSY: u16 = 0x0001;

    pub const OK: u8 = 0x02;
    pub const MTP_WRITE_ERROR: u8 = 0x04;
    pub const CHECKSUM_ERROR: u8 = 0x08;
    pub const CRC_BUSY: u8 = 0x01;
    pub const CRC_ERROR: u8 = 0x08;
    pub const REPAIR_ERROR: u8 = 0x40;
}

pub mod timing {
    use super::Duration;

    pub const CONTROL_SETTLE: Duration = Duration::from_millis(10);
    pub const POLL_INTERVAL: Duration = Duration::from_millis(20);
    pub const RESET_SETTLE: Duration = Duration::from_millis(100);

    pub const PROGRAM_RETRIES: u32 = 250;
    pub const VERIFY_RETRIES: u32 = 1000;
    pub const REPAIR_RETRIES: u32 = 1000;
}
