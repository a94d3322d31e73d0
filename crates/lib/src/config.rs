//! Optional TOML configuration for the utilities.
//!
//! Every key is optional; an absent file means built-in defaults.
//!
//! ```toml
//! [mounts]
//! system = "/raw/system"
//!
//! [aroma]
//! fixed-menu-entries = 2
//!
//! [multiboot]
//! dir = "/data/media/0/MultiBoot"
//! ```

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use fn_error_context::context;
use serde::Deserialize;

use crate::aroma::MenuLayout;
use crate::Error;

/// Overrides for mount-point detection.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MountOverrides {
    /// System partition mount point.
    pub system: Option<Utf8PathBuf>,
    /// Cache partition mount point.
    pub cache: Option<Utf8PathBuf>,
    /// Data partition mount point.
    pub data: Option<Utf8PathBuf>,
    /// External SD card mount point.
    pub extsd: Option<Utf8PathBuf>,
}

/// Installer menu settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AromaConfig {
    /// Number of fixed entries the installer template places before the
    /// ROM entries in its menu.
    #[serde(default = "default_fixed_menu_entries")]
    pub fixed_menu_entries: usize,
}

fn default_fixed_menu_entries() -> usize {
    MenuLayout::default().fixed_entries
}

impl Default for AromaConfig {
    fn default() -> Self {
        Self {
            fixed_menu_entries: default_fixed_menu_entries(),
        }
    }
}

/// Multiboot state settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MultibootConfig {
    /// Directory holding per-ROM state (config.json, boot images).
    pub dir: Option<Utf8PathBuf>,
}

/// The toplevel configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct UtilitiesConfig {
    /// Mount point overrides.
    #[serde(default)]
    pub mounts: MountOverrides,
    /// Installer menu settings.
    #[serde(default)]
    pub aroma: AromaConfig,
    /// Multiboot state settings.
    #[serde(default)]
    pub multiboot: MultibootConfig,
}

impl UtilitiesConfig {
    /// Parse configuration from TOML text.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Parse(e.to_string()).into())
    }

    /// Load configuration from `path`, which must exist.
    #[context("Loading config {path}")]
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let buf = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("{path}: {e}")))?;
        Self::parse(&buf)
    }

    /// Load configuration from `path` if one was given, else use defaults.
    pub fn load_optional(path: Option<&Utf8Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// The installer menu layout described by this configuration.
    pub fn menu_layout(&self) -> MenuLayout {
        MenuLayout {
            fixed_entries: self.aroma.fixed_menu_entries,
        }
    }
}
