//! The `wipe-*` actions.

use std::fmt::{Debug, Display};

use anyhow::{Context, Result};
use camino::Utf8Path;
use fn_error_context::context;

use crate::roms::{Rom, RomRegistry};

/// Directory name shared by multiboot state on every partition.
const MULTIBOOT_DIR: &str = "multiboot";
/// User storage on the data partition, never wiped.
const MEDIA_DIR: &str = "media";
const DALVIK_CACHE_DIR: &str = "dalvik-cache";

/// What to wipe for a ROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WipeTarget {
    /// The ROM's system files.
    System,
    /// The ROM's cache.
    Cache,
    /// The ROM's data, excluding internal storage.
    Data,
    /// Compiled dex caches on data and cache.
    DalvikCache,
    /// The ROM's multiboot state directory.
    Multiboot,
}

impl Display for WipeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::System => "system",
            Self::Cache => "cache",
            Self::Data => "data",
            Self::DalvikCache => "dalvik-cache",
            Self::Multiboot => "multiboot",
        })
    }
}

/// Erases parts of a ROM.
pub trait WipeEngine: Debug {
    /// Wipe `target` for `rom`, returning whether it succeeded.
    fn wipe(&self, rom: &Rom, target: WipeTarget) -> bool;
}

/// Wipes by deleting files from the mounted partitions.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsWipe;

impl FsWipe {
    fn try_wipe(&self, rom: &Rom, target: WipeTarget) -> Result<()> {
        match target {
            WipeTarget::System => wipe_directory(&rom.system_path, &[MULTIBOOT_DIR]),
            WipeTarget::Cache => wipe_directory(&rom.cache_path, &[MULTIBOOT_DIR]),
            WipeTarget::Data => wipe_directory(&rom.data_path, &[MEDIA_DIR, MULTIBOOT_DIR]),
            WipeTarget::DalvikCache => {
                wipe_directory(&rom.data_path.join(DALVIK_CACHE_DIR), &[])?;
                wipe_directory(&rom.cache_path.join(DALVIK_CACHE_DIR), &[])
            }
            WipeTarget::Multiboot => remove_tree(&rom.multiboot_path),
        }
    }
}

impl WipeEngine for FsWipe {
    fn wipe(&self, rom: &Rom, target: WipeTarget) -> bool {
        match self.try_wipe(rom, target) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("{e:#}");
                false
            }
        }
    }
}

/// Delete everything in `dir` except the top-level `exclusions`.
/// A missing directory is already wiped.
#[context("Wiping {dir}")]
fn wipe_directory(dir: &Utf8Path, exclusions: &[&str]) -> Result<()> {
    let entries = match dir.read_dir_utf8() {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        if exclusions.contains(&entry.file_name()) {
            continue;
        }
        // file_type() does not follow symlinks
        let r = if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())
        } else {
            std::fs::remove_file(entry.path())
        };
        r.with_context(|| format!("Removing {}", entry.path()))?;
    }
    Ok(())
}

#[context("Removing {path}")]
fn remove_tree(path: &Utf8Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        r => Ok(r?),
    }
}

/// Wipe `target` for the installed ROM `rom_id`.
pub fn wipe_rom(
    registry: &RomRegistry,
    engine: &dyn WipeEngine,
    rom_id: &str,
    target: WipeTarget,
) -> Result<()> {
    let rom = registry.find(rom_id)?;
    tracing::info!("Wiping {target} for {rom_id}");
    if !engine.wipe(&rom, target) {
        anyhow::bail!("Failed to wipe {target} for {rom_id}");
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::roms::test::{fixture, install};

    fn touch(path: &Utf8Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "x").unwrap();
    }

    #[test]
    fn test_wipe_data_keeps_media() -> Result<()> {
        let td = tempfile::tempdir()?;
        let r = fixture(&td);
        install(&r, "primary");
        let rom = r.rom("primary").unwrap();
        let data = &rom.data_path;
        touch(&data.join("app/foo.apk"));
        touch(&data.join("media/0/DCIM/photo.jpg"));
        touch(&data.join("multiboot/data-slot-a/system/build.prop"));
        std::os::unix::fs::symlink("/nonexistent", data.join("link"))?;

        wipe_rom(&r, &FsWipe, "primary", WipeTarget::Data)?;
        assert!(!data.join("app").exists());
        assert!(data.join("link").symlink_metadata().is_err());
        assert!(data.join("media/0/DCIM/photo.jpg").exists());
        assert!(data.join("multiboot/data-slot-a/system/build.prop").exists());
        Ok(())
    }

    #[test]
    fn test_wipe_targets() -> Result<()> {
        let td = tempfile::tempdir()?;
        let r = fixture(&td);
        install(&r, "data-slot-a");
        let rom = r.rom("data-slot-a").unwrap();
        touch(&rom.system_path.join("build.prop"));
        touch(&rom.cache_path.join("dalvik-cache/x.dex"));
        touch(&rom.data_path.join("dalvik-cache/y.dex"));
        touch(&rom.cache_path.join("recovery/log"));
        touch(&rom.config_path());

        wipe_rom(&r, &FsWipe, "data-slot-a", WipeTarget::DalvikCache)?;
        assert!(rom.data_path.join("dalvik-cache").is_dir());
        assert!(!rom.data_path.join("dalvik-cache/y.dex").exists());
        assert!(!rom.cache_path.join("dalvik-cache/x.dex").exists());
        assert!(rom.cache_path.join("recovery/log").exists());

        wipe_rom(&r, &FsWipe, "data-slot-a", WipeTarget::Cache)?;
        assert!(!rom.cache_path.join("recovery").exists());

        wipe_rom(&r, &FsWipe, "data-slot-a", WipeTarget::Multiboot)?;
        assert!(!rom.multiboot_path.exists());
        // Already gone
        wipe_rom(&r, &FsWipe, "data-slot-a", WipeTarget::Multiboot)?;

        wipe_rom(&r, &FsWipe, "data-slot-a", WipeTarget::System)?;
        assert!(!rom.system_path.join("build.prop").exists());
        // The system directory itself stays, so the ROM still counts as installed
        assert!(rom.system_path.is_dir());
        Ok(())
    }

    #[test]
    fn test_wipe_unknown_rom() -> Result<()> {
        let td = tempfile::tempdir()?;
        let r = fixture(&td);
        let e = wipe_rom(&r, &FsWipe, "dual", WipeTarget::System).unwrap_err();
        assert!(matches!(
            e.downcast_ref::<crate::Error>(),
            Some(crate::Error::NotFound(_))
        ));
        Ok(())
    }

    #[derive(Debug)]
    struct FailingWipe;

    impl WipeEngine for FailingWipe {
        fn wipe(&self, _rom: &Rom, _target: WipeTarget) -> bool {
            false
        }
    }

    #[test]
    fn test_wipe_failure() -> Result<()> {
        let td = tempfile::tempdir()?;
        let r = fixture(&td);
        install(&r, "primary");
        assert!(wipe_rom(&r, &FailingWipe, "primary", WipeTarget::Cache).is_err());
        Ok(())
    }
}
