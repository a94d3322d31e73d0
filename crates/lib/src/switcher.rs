//! Flashing a ROM's boot images onto the physical partitions.

use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::io::Write;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use fn_error_context::context;
use sha2::{Digest, Sha512};

use crate::roms::RomRegistry;

/// Image written to the boot partition.
const BOOT_IMAGE: &str = "boot.img";
/// Extension of partition images kept in a ROM's multiboot directory.
const IMAGE_EXTENSION: &str = "img";
/// Prefix of checksum values; only SHA-512 is supported.
const SHA512_PREFIX: &str = "sha512:";

/// The result of a switch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The ROM's images were flashed.
    Succeeded,
    /// Something went wrong; see the log.
    Failed,
    /// An image did not match its recorded checksum.
    ChecksumInvalid,
    /// An image has no recorded checksum.
    ChecksumNotFound,
}

impl SwitchOutcome {
    /// Whether the switch went through.
    pub fn is_success(self) -> bool {
        self == Self::Succeeded
    }

    /// Stable name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::ChecksumInvalid => "CHECKSUM_INVALID",
            Self::ChecksumNotFound => "CHECKSUM_NOT_FOUND",
        }
    }
}

impl Display for SwitchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Performs the actual partition swap for a ROM.
pub trait SwitchEngine: Debug {
    /// Switch to `rom_id`, flashing its boot image to `boot_path` and any
    /// other partition images to nodes under `base_dirs`. Checksum
    /// verification is skipped when `force` is set.
    fn switch_rom(
        &self,
        rom_id: &str,
        boot_path: &Utf8Path,
        base_dirs: &[Utf8PathBuf],
        force: bool,
    ) -> SwitchOutcome;
}

/// Result of checking one image against the checksum database.
#[derive(Debug, PartialEq, Eq)]
enum Verification {
    Verified,
    Missing,
    Mismatch,
}

/// The checksum database: `<rom>/<image>=sha512:<hex>` lines.
#[derive(Debug, Default)]
struct Checksums(HashMap<String, String>);

impl Checksums {
    fn parse(s: &str) -> Self {
        let map = s
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .filter_map(|l| l.split_once('='))
            .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
            .collect();
        Self(map)
    }

    #[context("Loading checksums from {path}")]
    fn load(path: &Utf8Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(s) => Ok(Self::parse(&s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn verify(&self, rom_id: &str, image: &str, data: &[u8]) -> Verification {
        let Some(expected) = self.0.get(&format!("{rom_id}/{image}")) else {
            return Verification::Missing;
        };
        let Some(expected) = expected.strip_prefix(SHA512_PREFIX) else {
            tracing::warn!("{rom_id}/{image}: unsupported checksum {expected}");
            return Verification::Mismatch;
        };
        let actual = hex::encode(Sha512::digest(data));
        if actual.eq_ignore_ascii_case(expected) {
            Verification::Verified
        } else {
            Verification::Mismatch
        }
    }
}

/// A partition image found in a ROM's multiboot directory.
#[derive(Debug)]
struct Image {
    /// File name, e.g. `boot.img`.
    name: String,
    path: Utf8PathBuf,
    data: Vec<u8>,
}

/// Switches ROMs by copying the images saved in each ROM's multiboot
/// directory onto the physical partitions.
#[derive(Debug, Clone)]
pub struct ImageSwitcher {
    multiboot_dir: Utf8PathBuf,
    checksums_path: Utf8PathBuf,
    is_block_device: fn(&Utf8Path) -> bool,
}

impl ImageSwitcher {
    /// Create a switcher using the registry's multiboot state.
    pub fn new(registry: &RomRegistry) -> Self {
        Self {
            multiboot_dir: registry.multiboot_dir().to_owned(),
            checksums_path: registry.checksums_path(),
            is_block_device: crate::blockdev::is_block_device,
        }
    }

    /// Replace the check used to find partition nodes under the base
    /// directories.
    pub fn with_block_device_probe(mut self, probe: fn(&Utf8Path) -> bool) -> Self {
        self.is_block_device = probe;
        self
    }

    /// Read the ROM's images, boot image first and the rest by name.
    #[context("Reading images for {rom_id}")]
    fn images(&self, rom_id: &str) -> Result<Vec<Image>> {
        let dir = self.multiboot_dir.join(rom_id);
        let mut names = Vec::new();
        for entry in dir.read_dir_utf8().with_context(|| format!("Reading {dir}"))? {
            let entry = entry?;
            let name = entry.file_name();
            if name != BOOT_IMAGE
                && entry.path().extension() == Some(IMAGE_EXTENSION)
                && entry.file_type()?.is_file()
            {
                names.push(name.to_owned());
            }
        }
        names.sort();
        std::iter::once(BOOT_IMAGE.to_owned())
            .chain(names)
            .map(|name| {
                let path = dir.join(&name);
                let data = std::fs::read(&path).with_context(|| format!("Reading {path}"))?;
                Ok::<_, anyhow::Error>(Image { name, path, data })
            })
            .collect()
    }

    fn try_switch(
        &self,
        rom_id: &str,
        boot_path: &Utf8Path,
        base_dirs: &[Utf8PathBuf],
        force: bool,
    ) -> Result<SwitchOutcome> {
        let boot_image = self.multiboot_dir.join(rom_id).join(BOOT_IMAGE);
        if !boot_image.try_exists()? {
            tracing::error!("{boot_image}: boot image not found");
            return Ok(SwitchOutcome::Failed);
        }
        let images = self.images(rom_id)?;

        if force {
            tracing::warn!("Skipping checksum verification");
        } else {
            let checksums = Checksums::load(&self.checksums_path)?;
            for image in &images {
                match checksums.verify(rom_id, &image.name, &image.data) {
                    Verification::Verified => {}
                    Verification::Missing => {
                        tracing::error!("{}: checksum not found", image.path);
                        return Ok(SwitchOutcome::ChecksumNotFound);
                    }
                    Verification::Mismatch => {
                        tracing::error!("{}: checksum is invalid", image.path);
                        return Ok(SwitchOutcome::ChecksumInvalid);
                    }
                }
            }
        }

        for image in &images {
            let target = if image.name == BOOT_IMAGE {
                boot_path.to_owned()
            } else {
                let partition = image.name.trim_end_matches(".img");
                let found = base_dirs
                    .iter()
                    .map(|d| d.join(partition))
                    .find(|p| (self.is_block_device)(p));
                match found {
                    Some(p) => p,
                    None => {
                        tracing::warn!("No block device for partition {partition}; skipping");
                        continue;
                    }
                }
            };
            write_image(&image.data, &target)?;
        }
        Ok(SwitchOutcome::Succeeded)
    }
}

impl SwitchEngine for ImageSwitcher {
    fn switch_rom(
        &self,
        rom_id: &str,
        boot_path: &Utf8Path,
        base_dirs: &[Utf8PathBuf],
        force: bool,
    ) -> SwitchOutcome {
        match self.try_switch(rom_id, boot_path, base_dirs, force) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("{e:#}");
                SwitchOutcome::Failed
            }
        }
    }
}

/// Copy `data` over the start of `target` without truncating it.
#[context("Writing {target}")]
fn write_image(data: &[u8], target: &Utf8Path) -> Result<()> {
    tracing::debug!("Flashing {} bytes to {target}", data.len());
    let mut f = std::fs::OpenOptions::new().write(true).open(target)?;
    f.write_all(data)?;
    f.sync_all()?;
    Ok(())
}
