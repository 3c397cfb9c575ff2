//! Firmware file format: a raw, headerless MTP image
use std::{fs, path::Path};

use crate::error::{Error, Result};
use crate::flashing::check_size;

/// Read a flat binary image, refusing anything larger than the MTP.
pub fn read_firmware_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let p = path.as_ref();
    let open_error = |source| Error::File {
        path: p.display().to_string(),
        source,
    };

    let size = fs::metadata(p).map_err(open_error)?.len();
    check_size(size as usize)?;

    let raw = fs::read(p).map_err(open_error)?;
    // the file may have grown since the metadata was read
    check_size(raw.len())?;
    log::info!("Read {} ({} bytes)", p.display(), raw.len());
    Ok(raw)
}
