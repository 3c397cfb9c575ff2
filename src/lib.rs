//! IDT P9320 MTP programming over I2C.

pub mod constants;
pub mod cycle;
pub mod device;
pub mod error;
pub mod flashing;
pub mod format;
pub mod protocol;
pub mod transport;

pub use self::device::{Bootloader, BootloaderSet, Chip};
pub use self::error::{Error, Result};
pub use self::flashing::{Flashing, SentinelReadback};
pub use self::protocol::SectionDescriptor;
pub use self::transport::Transport;
