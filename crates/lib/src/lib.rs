//! # Multi-boot utilities
//!
//! Support code for the `mbtool-utilities` binary, which runs in recovery
//! on a multi-boot Android device. It can:
//!
//! - identify the running device and switch the boot partition to an
//!   installed ROM ([`switch`], [`switcher`])
//! - build a flashable AROMA installer zip listing the installed ROMs
//!   ([`installer`], [`aroma`])
//! - wipe parts of an installed ROM ([`wipe`])

pub mod aroma;
pub mod cli;
pub mod config;
pub mod device;
mod error;
pub mod installer;
pub mod properties;
pub mod roms;
pub mod switch;
pub mod switcher;
pub mod wipe;

pub use error::Error;

// Re-export blockdev crate for internal use
pub(crate) use mbtool_blockdev as blockdev;

/// Version reported in generated installers.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
