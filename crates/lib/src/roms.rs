//! Installed ROM discovery.
//!
//! A ROM is identified by a short ID which also determines where its
//! partitions live:
//!
//! | ID                | system                                   |
//! |-------------------|------------------------------------------|
//! | `primary`         | `<system>`                               |
//! | `dual`            | `<system>/multiboot/dual/system`         |
//! | `multi-slot-N`    | `<cache>/multiboot/multi-slot-N/system`  |
//! | `data-slot-X`     | `<data>/multiboot/data-slot-X/system`    |
//! | `extsd-slot-X`    | `<extsd>/multiboot/extsd-slot-X/system`  |
//!
//! Per-ROM state (config.json, boot images) lives in the multiboot
//! directory on internal storage.

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use fn_error_context::context;
use serde::Deserialize;

use crate::config::{MountOverrides, UtilitiesConfig};
use crate::Error;

/// ID of the ROM installed on the real partitions.
pub const PRIMARY_ID: &str = "primary";
/// ID of the ROM installed in the system partition.
pub const SECONDARY_ID: &str = "dual";
const MULTI_SLOT_PREFIX: &str = "multi-slot-";
const DATA_SLOT_PREFIX: &str = "data-slot-";
const EXTSD_SLOT_PREFIX: &str = "extsd-slot-";

/// Name of the per-partition directory holding secondary ROMs.
const MULTIBOOT_DIR: &str = "multiboot";
/// File whose presence marks the primary ROM as installed.
const BUILD_PROP: &str = "build.prop";
/// Per-ROM configuration file, inside the ROM's multiboot directory.
const CONFIG_FILE: &str = "config.json";

/// Where each partition is mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoints {
    /// System partition.
    pub system: Utf8PathBuf,
    /// Cache partition.
    pub cache: Utf8PathBuf,
    /// Data partition.
    pub data: Utf8PathBuf,
    /// External SD card.
    pub extsd: Utf8PathBuf,
}

impl MountPoints {
    /// Detect mount points, preferring `/raw/<name>` when present.
    /// Explicit overrides always win.
    pub fn detect(overrides: &MountOverrides) -> Self {
        fn pick(name: &str, over: &Option<Utf8PathBuf>) -> Utf8PathBuf {
            if let Some(p) = over {
                return p.clone();
            }
            let raw = Utf8PathBuf::from(format!("/raw/{name}"));
            if raw.is_dir() {
                raw
            } else {
                Utf8PathBuf::from(format!("/{name}"))
            }
        }
        Self {
            system: pick("system", &overrides.system),
            cache: pick("cache", &overrides.cache),
            data: pick("data", &overrides.data),
            extsd: pick("extsd", &overrides.extsd),
        }
    }

    /// Default location of per-ROM multiboot state.
    pub fn default_multiboot_dir(&self) -> Utf8PathBuf {
        self.data.join("media/0/MultiBoot")
    }
}

/// An installed (or installable) ROM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rom {
    /// The ROM ID.
    pub id: String,
    /// Directory holding the ROM's system files.
    pub system_path: Utf8PathBuf,
    /// Directory holding the ROM's cache.
    pub cache_path: Utf8PathBuf,
    /// Directory holding the ROM's data.
    pub data_path: Utf8PathBuf,
    /// Per-ROM multiboot state directory.
    pub multiboot_path: Utf8PathBuf,
}

impl Rom {
    /// Path to the ROM's configuration file.
    pub fn config_path(&self) -> Utf8PathBuf {
        self.multiboot_path.join(CONFIG_FILE)
    }

    /// The name shown to users: the configured name when there is one,
    /// else the ID.
    pub fn display_name(&self) -> String {
        let path = self.config_path();
        match RomConfig::load(&path) {
            Ok(Some(RomConfig { name: Some(name) })) if !name.is_empty() => name,
            Ok(_) => self.id.clone(),
            Err(e) => {
                tracing::warn!("{e:#}");
                self.id.clone()
            }
        }
    }
}

/// The subset of a ROM's config.json we care about.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct RomConfig {
    /// User-assigned display name.
    #[serde(default)]
    pub name: Option<String>,
}

impl RomConfig {
    /// Load the configuration at `path`. A missing file is `Ok(None)`.
    #[context("Loading ROM config {path}")]
    pub fn load(path: &Utf8Path) -> Result<Option<Self>> {
        let buf = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let config = serde_json::from_slice(&buf).map_err(|e| Error::Parse(e.to_string()))?;
        Ok(Some(config))
    }
}

/// Enumerates installed ROMs for a set of mount points.
#[derive(Debug, Clone)]
pub struct RomRegistry {
    mounts: MountPoints,
    multiboot_dir: Utf8PathBuf,
}

impl RomRegistry {
    /// Create a registry; `multiboot_dir` defaults to
    /// [`MountPoints::default_multiboot_dir`].
    pub fn new(mounts: MountPoints, multiboot_dir: Option<Utf8PathBuf>) -> Self {
        let multiboot_dir = multiboot_dir.unwrap_or_else(|| mounts.default_multiboot_dir());
        Self {
            mounts,
            multiboot_dir,
        }
    }

    /// Create a registry from the utilities configuration.
    pub fn from_config(config: &UtilitiesConfig) -> Self {
        let mounts = MountPoints::detect(&config.mounts);
        Self::new(mounts, config.multiboot.dir.clone())
    }

    /// The mount points ROMs are resolved against.
    pub fn mount_points(&self) -> &MountPoints {
        &self.mounts
    }

    /// Directory holding per-ROM multiboot state.
    pub fn multiboot_dir(&self) -> &Utf8Path {
        &self.multiboot_dir
    }

    /// Path to the boot image checksum database.
    pub fn checksums_path(&self) -> Utf8PathBuf {
        self.mounts.data.join(MULTIBOOT_DIR).join("checksums.prop")
    }

    /// Resolve the layout of ROM `id`, whether or not it is installed.
    /// Returns `None` for IDs that don't follow any known scheme.
    pub fn rom(&self, id: &str) -> Option<Rom> {
        let m = &self.mounts;
        let (system, cache, data) = if id == PRIMARY_ID {
            (m.system.clone(), m.cache.clone(), m.data.clone())
        } else if id == SECONDARY_ID {
            let base = m.system.join(MULTIBOOT_DIR).join(id);
            (base.join("system"), base.join("cache"), base.join("data"))
        } else if let Some(n) = id.strip_prefix(MULTI_SLOT_PREFIX) {
            if n.is_empty() || !n.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            (
                m.cache.join(MULTIBOOT_DIR).join(id).join("system"),
                m.system.join(MULTIBOOT_DIR).join(id).join("cache"),
                m.data.join(MULTIBOOT_DIR).join(id).join("data"),
            )
        } else if is_slot_id(id, DATA_SLOT_PREFIX) {
            let base = m.data.join(MULTIBOOT_DIR).join(id);
            (base.join("system"), base.join("cache"), base.join("data"))
        } else if is_slot_id(id, EXTSD_SLOT_PREFIX) {
            let base = m.data.join(MULTIBOOT_DIR).join(id);
            (
                m.extsd.join(MULTIBOOT_DIR).join(id).join("system"),
                base.join("cache"),
                base.join("data"),
            )
        } else {
            return None;
        };
        Some(Rom {
            id: id.to_owned(),
            system_path: system,
            cache_path: cache,
            data_path: data,
            multiboot_path: self.multiboot_dir.join(id),
        })
    }

    fn is_installed(&self, rom: &Rom) -> bool {
        if rom.id == PRIMARY_ID {
            rom.system_path.join(BUILD_PROP).is_file()
        } else {
            rom.system_path.is_dir()
        }
    }

    /// Enumerate installed ROMs in a stable order: primary, dual,
    /// multi-slots by number, then data and extsd slots by ID.
    /// Slot directories that cannot be read contribute no ROMs.
    pub fn installed(&self) -> Vec<Rom> {
        let m = &self.mounts;
        let mut ids = vec![PRIMARY_ID.to_owned(), SECONDARY_ID.to_owned()];

        let mut multi = list_slots(&m.cache.join(MULTIBOOT_DIR), MULTI_SLOT_PREFIX)
            .into_iter()
            .filter_map(|id| {
                let n = id[MULTI_SLOT_PREFIX.len()..].parse::<u32>().ok()?;
                Some((n, id))
            })
            .collect::<Vec<_>>();
        multi.sort();
        ids.extend(multi.into_iter().map(|(_, id)| id));
        ids.extend(list_slots(&m.data.join(MULTIBOOT_DIR), DATA_SLOT_PREFIX));
        ids.extend(list_slots(&m.extsd.join(MULTIBOOT_DIR), EXTSD_SLOT_PREFIX));

        let roms = ids
            .iter()
            .filter_map(|id| self.rom(id))
            .filter(|rom| self.is_installed(rom))
            .collect::<Vec<_>>();
        tracing::debug!(
            "Installed ROMs: {:?}",
            roms.iter().map(|r| r.id.as_str()).collect::<Vec<_>>()
        );
        roms
    }

    /// Look up an installed ROM by ID.
    pub fn find(&self, id: &str) -> Result<Rom> {
        self.rom(id)
            .filter(|rom| self.is_installed(rom))
            .ok_or_else(|| Error::NotFound(format!("ROM not installed: {id}")).into())
    }
}

fn is_slot_id(id: &str, prefix: &str) -> bool {
    id.strip_prefix(prefix)
        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
}

/// Names of the entries in `dir` starting with `prefix`, sorted.
/// A missing or unreadable directory has no slots.
fn list_slots(dir: &Utf8Path, prefix: &str) -> Vec<String> {
    let entries = match dir.read_dir_utf8() {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::warn!("Ignoring unreadable slot directory {dir}: {e}");
            return Vec::new();
        }
    };
    let mut r = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Reading {dir}: {e}");
                continue;
            }
        };
        let name = entry.file_name();
        if is_slot_id(name, prefix) {
            r.push(name.to_owned());
        }
    }
    r.sort();
    r
}
