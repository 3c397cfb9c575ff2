//! MTP programming procedures.

use indicatif::{ProgressBar, ProgressStyle};

use crate::constants::{
    BOOTLOADER_CHUNK_SIZE, MTP_SIZE_LIMIT, SECTION_SIZE, TEST_SENTINEL, registers, timing, values,
};
use crate::cycle;
use crate::device::{Bootloader, BootloaderSet, Chip};
use crate::error::{Error, Mismatch, Result};
use crate::protocol::{self, ControlReg, SectionDescriptor};
use crate::transport::{I2cTransport, Transport};

/// Result of the bootloader smoke test: the sentinel written to the
/// programming area before reset, and what the register held afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentinelReadback {
    pub written: u16,
    pub read_back: u16,
}

impl SentinelReadback {
    /// The register no longer holds the sentinel.
    pub fn changed(&self) -> bool {
        self.written != self.read_back
    }
}

pub struct Flashing<T: Transport> {
    transport: T,
    chip: Chip,
    bootloaders: BootloaderSet,
}

impl Flashing<I2cTransport> {
    pub fn new_from_i2c(bus: &str, chip: Chip, bootloaders: BootloaderSet) -> Result<Self> {
        let transport = I2cTransport::open(I2cTransport::bus_path(bus), chip.i2c_address)?;
        Ok(Flashing::new(transport, chip, bootloaders))
    }
}

impl<T: Transport> Flashing<T> {
    pub fn new(transport: T, chip: Chip, bootloaders: BootloaderSet) -> Self {
        Flashing {
            transport,
            chip,
            bootloaders,
        }
    }

    pub fn dump_info(&self) {
        log::info!("Chip: {}", self.chip);
        log::info!("Bootloader RAM base: 0x{:04x}", self.chip.bootloader_base);
        for which in [Bootloader::Program, Bootloader::Verify, Bootloader::Repair] {
            if let Some(image) = self.bootloaders.get(which) {
                log::info!("{} bootloader: {} bytes", which, image.len());
            }
        }
    }

    /// Unlock the system registers, set up clocks and halt the processor
    /// so the bootloader can be placed in RAM.
    pub fn prepare_system(&mut self) -> Result<()> {
        let t = &mut self.transport;
        t.write_byte(registers::UNLOCK, values::UNLOCK_KEY)?;
        t.write_byte(registers::CLOCK_SOURCE, values::HS_CLOCK)?;
        t.write_byte(registers::AHB_DIVISOR, values::AHB_CLOCK_DIVISOR)?;
        t.write_byte(registers::PULSE_1US, values::PULSE_1US)?;
        t.write_byte(registers::PULSE_500NS, values::PULSE_500NS)?;

        t.write_byte(registers::CONTROL, ControlReg::halted(true).bits())?;
        t.delay(timing::CONTROL_SETTLE);
        t.write_byte(registers::CONTROL, ControlReg::halted(false).bits())?;
        t.delay(timing::CONTROL_SETTLE);
        log::debug!("System prepared");
        Ok(())
    }

    /// Stream a bootloader image into RAM, reading back every chunk.
    ///
    /// Chunk mismatches are only reported; `verify_bootloader` decides.
    pub fn load_bootloader(&mut self, which: Bootloader) -> Result<()> {
        let image = self.bootloaders.image(which)?;
        let base = self.chip.bootloader_base;
        log::info!(
            "Loading {} bootloader ({} bytes) to 0x{:04x}",
            which,
            image.len(),
            base
        );

        let mut addr = base;
        for chunk in image.chunks(BOOTLOADER_CHUNK_SIZE) {
            self.transport.write(addr, chunk)?;
            let readback = self.transport.read(addr, chunk.len())?;
            if readback != chunk {
                log::warn!("0x{:04x} verification failed", addr);
            }
            addr = addr.wrapping_add(chunk.len() as u16);
        }
        Ok(())
    }

    /// Read back the whole image and compare it byte by byte.
    pub fn verify_bootloader(&mut self, which: Bootloader) -> Result<()> {
        let image = self.bootloaders.image(which)?;
        let base = self.chip.bootloader_base;
        let readback = self.transport.read(base, image.len())?;

        let mismatches: Vec<Mismatch> = image
            .iter()
            .zip(readback.iter())
            .enumerate()
            .filter(|(_, (expected, actual))| expected != actual)
            .map(|(offset, (&expected, &actual))| Mismatch {
                offset,
                expected,
                actual,
            })
            .collect();

        if !mismatches.is_empty() {
            for m in &mismatches {
                log::error!("{}", m);
            }
            return Err(Error::VerificationMismatch { base, mismatches });
        }
        log::info!("{} bootloader verified", which);
        Ok(())
    }

    fn install_bootloader(&mut self, which: Bootloader) -> Result<()> {
        self.bootloaders.image(which)?;
        self.prepare_system()?;
        self.load_bootloader(which)?;
        self.verify_bootloader(which)
    }

    /// Remap execution to MTP, reset the processor into the bootloader and
    /// give it time to come up.
    fn start_bootloader(&mut self) -> Result<()> {
        self.transport
            .write_byte(registers::REMAP, self.chip.remap_value)?;
        // the chip may drop off the bus while acknowledging the reset
        match self
            .transport
            .write_byte(registers::CONTROL, ControlReg::soft_reset().bits())
        {
            Ok(()) => log::debug!("CPU reset"),
            Err(Error::Transport(e)) => log::warn!("CPU reset not acknowledged: {}", e),
            Err(e) => return Err(e),
        }
        self.transport.delay(timing::RESET_SETTLE);
        Ok(())
    }

    fn init_programming_area(&mut self) -> Result<()> {
        self.transport
            .write_byte(registers::PROGRAMMING_AREA, values::INIT_PROGRAMMING_AREA)
    }

    pub fn load_section(&mut self, section: SectionDescriptor) -> Result<()> {
        let raw = section.into_raw()?;
        self.transport.write(registers::PROGRAMMING_AREA, &raw)
    }

    /// Program every 128-byte section of `firmware`, in address order.
    pub fn load_firmware(&mut self, firmware: &[u8]) -> Result<()> {
        let total = firmware.len().min(MTP_SIZE_LIMIT).div_ceil(SECTION_SIZE);
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} sections {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );

        for section in protocol::sections(firmware) {
            let start_addr = section.start_addr;
            log::debug!(
                "Section 0x{:04x}: {} bytes, checksum 0x{:04x}",
                start_addr,
                section.code_length,
                section.checksum
            );
            self.load_section(section)?;
            if let Err(e) = cycle::program_cycle(&mut self.transport, start_addr) {
                bar.abandon_with_message("failed");
                return Err(e);
            }
            bar.inc(1);
        }
        bar.finish_with_message("done");
        Ok(())
    }

    /// Write `firmware` into MTP.
    pub fn flash(&mut self, firmware: &[u8]) -> Result<()> {
        check_size(firmware.len())?;
        if firmware.is_empty() {
            log::warn!("Firmware is empty, nothing will be programmed");
        }

        self.install_bootloader(Bootloader::Program)?;
        self.init_programming_area()?;
        self.start_bootloader()?;

        log::info!("Programming {} bytes", firmware.len());
        self.load_firmware(firmware)?;
        log::info!("MTP programmed");
        Ok(())
    }

    /// Check the CRC of the whole MTP image against the vendor constants.
    pub fn check(&mut self) -> Result<()> {
        self.install_bootloader(Bootloader::Verify)?;
        self.init_programming_area()?;
        self.start_bootloader()?;

        let region = &self.chip.verify;
        log::info!(
            "Verifying 0x{:04x} bytes from 0x{:04x}, checksum 0x{:04x}",
            region.size,
            region.start_addr,
            region.checksum
        );
        let section =
            SectionDescriptor::whole_image(region.start_addr, region.size, region.checksum);
        self.load_section(section)?;
        cycle::verify_cycle(&mut self.transport)
    }

    pub fn repair(&mut self) -> Result<()> {
        self.install_bootloader(Bootloader::Repair)?;
        self.init_programming_area()?;
        self.start_bootloader()?;

        log::info!("Repairing MTP");
        cycle::repair_cycle(&mut self.transport)
    }

    /// Start the program bootloader and report whether the sentinel left in
    /// the programming area survived the reset.
    pub fn test_bootloader(&mut self) -> Result<SentinelReadback> {
        self.install_bootloader(Bootloader::Program)?;
        self.transport
            .write(registers::PROGRAMMING_AREA, &TEST_SENTINEL.to_le_bytes())?;
        self.start_bootloader()?;

        let read_back = self.transport.read_u16(registers::PROGRAMMING_AREA)?;
        Ok(SentinelReadback {
            written: TEST_SENTINEL,
            read_back,
        })
    }
}

pub fn check_size(size: usize) -> Result<()> {
    if size > MTP_SIZE_LIMIT {
        return Err(Error::SizeLimit {
            size,
            limit: MTP_SIZE_LIMIT,
        });
    }
    Ok(())
}
