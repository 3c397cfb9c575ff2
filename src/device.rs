//! Chip profile and bootloader assets
use std::{fmt, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Vendor constants describing the whole MTP image, used by the verify
/// bootloader. Ship with the firmware, or can be found in the vendor driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRegion {
    #[serde(deserialize_with = "parse_number")]
    pub start_addr: u16,
    #[serde(deserialize_with = "parse_number")]
    pub size: u16,
    #[serde(deserialize_with = "parse_number")]
    pub checksum: u16,
}

/// File names of the three bootloader images
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootloaderFiles {
    pub program: String,
    pub verify: String,
    pub repair: String,
}

/// Represents a P9320-family receiver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chip {
    pub name: String,
    #[serde(deserialize_with = "parse_number")]
    pub i2c_address: u16,
    /// RAM address the bootloader images are loaded to
    #[serde(deserialize_with = "parse_number")]
    pub bootloader_base: u16,
    /// Value written to the remap register before reset
    #[serde(deserialize_with = "parse_number")]
    pub remap_value: u8,
    pub verify: VerifyRegion,
    pub bootloaders: BootloaderFiles,
}

impl fmt::Display for Chip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(i2c 0x{:02x})", self.name, self.i2c_address)
    }
}

impl Chip {
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(include_str!("../devices/idt9320.yaml"))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| Error::File {
            path: path.display().to_string(),
            source,
        })?;
        let chip = Self::from_yaml(&raw)?;
        log::debug!("Loaded chip profile {} from {}", chip, path.display());
        Ok(chip)
    }

    /// File name of `which` in the bootloader directory.
    pub fn bootloader_file(&self, which: Bootloader) -> &str {
        match which {
            Bootloader::Program => &self.bootloaders.program,
            Bootloader::Verify => &self.bootloaders.verify,
            Bootloader::Repair => &self.bootloaders.repair,
        }
    }
}

/// Which bootloader image a procedure runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bootloader {
    Program,
    Verify,
    Repair,
}

impl fmt::Display for Bootloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bootloader::Program => write!(f, "program"),
            Bootloader::Verify => write!(f, "verify"),
            Bootloader::Repair => write!(f, "repair"),
        }
    }
}

/// Bootloader images, resolved once before the bus is touched.
///
/// Only the images a procedure runs need to be present.
#[derive(Debug, Clone, Default)]
pub struct BootloaderSet {
    program: Option<Vec<u8>>,
    verify: Option<Vec<u8>>,
    repair: Option<Vec<u8>>,
}

impl BootloaderSet {
    pub fn new(program: Vec<u8>, verify: Vec<u8>, repair: Vec<u8>) -> Self {
        BootloaderSet {
            program: Some(program),
            verify: Some(verify),
            repair: Some(repair),
        }
    }

    /// Read the images in `needed`, named by `chip`, from `dir`.
    pub fn load<P: AsRef<Path>>(dir: P, chip: &Chip, needed: &[Bootloader]) -> Result<Self> {
        let dir = dir.as_ref();
        let mut set = BootloaderSet::default();
        for &which in needed {
            let path = dir.join(chip.bootloader_file(which));
            let image = fs::read(&path).map_err(|e| Error::Bootloader {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            check_image(&path.display().to_string(), &image, chip.bootloader_base)?;
            log::debug!("Read {} bootloader {} ({} bytes)", which, path.display(), image.len());
            *set.slot(which) = Some(image);
        }
        Ok(set)
    }

    fn slot(&mut self, which: Bootloader) -> &mut Option<Vec<u8>> {
        match which {
            Bootloader::Program => &mut self.program,
            Bootloader::Verify => &mut self.verify,
            Bootloader::Repair => &mut self.repair,
        }
    }

    pub fn get(&self, which: Bootloader) -> Option<&[u8]> {
        match which {
            Bootloader::Program => self.program.as_deref(),
            Bootloader::Verify => self.verify.as_deref(),
            Bootloader::Repair => self.repair.as_deref(),
        }
    }

    pub fn image(&self, which: Bootloader) -> Result<&[u8]> {
        self.get(which).ok_or_else(|| Error::Bootloader {
            path: which.to_string(),
            reason: "image was not loaded".to_string(),
        })
    }
}

fn check_image(path: &str, image: &[u8], base: u16) -> Result<()> {
    let reason = if image.is_empty() {
        "image is empty".to_string()
    } else if base as usize + image.len() > 0x1_0000 {
        format!(
            "{} bytes do not fit above RAM base 0x{:04x}",
            image.len(),
            base
        )
    } else {
        return Ok(());
    };
    Err(Error::Bootloader {
        path: path.to_string(),
        reason,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Number {
    Int(u64),
    Str(String),
}

/// Accept YAML integers, `0x` prefixed hex strings, or decimal strings.
fn parse_number<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: TryFrom<u64>,
{
    use serde::de::Error as _;

    let value = match Number::deserialize(deserializer)? {
        Number::Int(n) => n,
        Number::Str(s) => {
            let s = s.trim();
            let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => s.parse(),
            };
            parsed.map_err(|_| D::Error::custom(format!("error while parsing {:?}", s)))?
        }
    };
    T::try_from(value).map_err(|_| D::Error::custom(format!("{} is out of range", value)))
}
