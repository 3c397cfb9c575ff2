use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};

use idtmtp::{Bootloader, BootloaderSet, Chip, Flashing};

#[derive(Parser)]
#[command(
    name = "idtmtp",
    version,
    about = "Program, verify and repair the MTP of IDT P9320 wireless power receivers over I2C"
)]
struct Cli {
    /// I2C bus number (N for /dev/i2c-N) or device path
    bus: String,

    /// Chip profile YAML, defaults to the built-in IDT P9320 profile
    #[arg(short, long, value_name = "FILE")]
    chip: Option<PathBuf>,

    /// Directory holding the bootloader images named in the chip profile
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    bootloaders: PathBuf,

    /// Override the 7-bit I2C slave address
    #[arg(short, long, value_parser = parse_address)]
    address: Option<u16>,

    /// Print debug output, twice for bus traces
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the program bootloader and check that it takes control
    Test,
    /// Write a raw firmware image (at most 16 KiB) into MTP
    Flash {
        /// The path to the firmware image
        path: PathBuf,
    },
    /// Verify the CRC of the whole MTP image
    Check,
    /// Run the vendor repair bootloader
    Repair,
}

impl Commands {
    /// Bootloader image the command runs
    fn bootloader(&self) -> Bootloader {
        match self {
            Commands::Test | Commands::Flash { .. } => Bootloader::Program,
            Commands::Check => Bootloader::Verify,
            Commands::Repair => Bootloader::Repair,
        }
    }
}

fn parse_address(s: &str) -> std::result::Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    match parsed {
        Ok(addr) if addr <= 0x7f => Ok(addr),
        Ok(addr) => Err(format!("0x{:x} is not a 7-bit address", addr)),
        Err(e) => Err(e.to_string()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    let _ = simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let mut chip = match &cli.chip {
        Some(path) => Chip::load(path)?,
        None => Chip::builtin()?,
    };
    if let Some(address) = cli.address {
        chip.i2c_address = address;
    }

    // resolve everything that can fail before touching the bus
    let firmware = match &cli.command {
        Commands::Flash { path } => idtmtp::format::read_firmware_from_file(path)?,
        _ => Vec::new(),
    };
    let needed = cli.command.bootloader();
    let bootloaders =
        BootloaderSet::load(&cli.bootloaders, &chip, &[needed]).with_context(|| {
            format!(
                "loading {} bootloader from {}",
                needed,
                cli.bootloaders.display()
            )
        })?;

    let mut flashing = Flashing::new_from_i2c(&cli.bus, chip, bootloaders)
        .with_context(|| format!("opening I2C bus {}", cli.bus))?;
    flashing.dump_info();

    let result = match cli.command {
        Commands::Flash { .. } => flashing.flash(&firmware),
        Commands::Check => flashing.check(),
        Commands::Repair => flashing.repair(),
        Commands::Test => flashing.test_bootloader().map(|readback| {
            log::info!(
                "Programming area after reset: wrote 0x{:04x}, read 0x{:04x} ({})",
                readback.written,
                readback.read_back,
                if readback.changed() {
                    "changed by bootloader"
                } else {
                    "unchanged"
                }
            );
        }),
    };

    log::warn!("You should power cycle the chip now");
    result?;
    Ok(())
}
