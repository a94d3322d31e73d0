//! # Command line interface
//!
//! Parses the arguments of the utilities binary and dispatches to
//! exactly one action.

use std::ffi::OsString;

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;

use crate::aroma::TemplateContext;
use crate::config::UtilitiesConfig;
use crate::installer::build_installer;
use crate::properties::AndroidProperties;
use crate::roms::RomRegistry;
use crate::switch::SwitchContext;
use crate::switcher::ImageSwitcher;
use crate::wipe::{wipe_rom, FsWipe, WipeTarget};

/// Arguments shared by the `wipe-*` actions.
#[derive(Debug, Clone, clap::Args, PartialEq, Eq)]
pub(crate) struct WipeOpts {
    /// ID of the ROM to wipe.
    pub(crate) rom_id: String,
}

/// Actions understood by the utilities binary.
#[derive(Debug, Clone, clap::Subcommand, PartialEq, Eq)]
pub(crate) enum Action {
    /// Build a flashable installer zip from a template directory.
    ///
    /// The AROMA control script template, if present, is rendered with
    /// the list of installed ROMs.
    Generate {
        /// Directory containing the installer template.
        template_dir: Utf8PathBuf,
        /// Path of the zip to write.
        output: Utf8PathBuf,
    },
    /// Switch the device to an installed ROM.
    Switch {
        /// ID of the ROM to boot.
        rom_id: String,
        /// Skip checksum verification.
        #[clap(long, short = 'f')]
        force: bool,
    },
    /// Wipe a ROM's system directory.
    WipeSystem(WipeOpts),
    /// Wipe a ROM's cache directory.
    WipeCache(WipeOpts),
    /// Wipe a ROM's data directory, keeping internal storage.
    WipeData(WipeOpts),
    /// Wipe a ROM's dalvik cache.
    WipeDalvikCache(WipeOpts),
    /// Wipe a ROM's multiboot state directory.
    WipeMultiboot(WipeOpts),
}

/// Multi-boot utilities.
#[derive(Debug, Parser, PartialEq, Eq)]
#[clap(name = "mbtool-utilities")]
#[clap(rename_all = "kebab-case")]
#[clap(version)]
pub(crate) struct Opt {
    /// Device definitions file (JSON).
    #[clap(long, short = 'd', global = true)]
    pub(crate) devices: Option<Utf8PathBuf>,

    /// Configuration file (TOML).
    #[clap(long, short = 'c', global = true)]
    pub(crate) config: Option<Utf8PathBuf>,

    #[clap(subcommand)]
    pub(crate) action: Action,
}

fn generate(
    registry: &RomRegistry,
    config: &UtilitiesConfig,
    template_dir: &Utf8Path,
    output: &Utf8Path,
) -> Result<()> {
    let ctx = TemplateContext::from_registry(registry, config.menu_layout());
    build_installer(template_dir, output, &ctx)?;
    tracing::info!("Wrote {output}");
    Ok(())
}

fn switch(opt: &Opt, registry: &RomRegistry, rom_id: &str, force: bool) -> Result<()> {
    let engine = ImageSwitcher::new(registry);
    let ctx = SwitchContext::new(opt.devices.as_deref(), &AndroidProperties, &engine);
    let outcome = ctx.switch_rom(rom_id, force)?;
    if !outcome.is_success() {
        anyhow::bail!("Failed to switch to {rom_id}: {outcome}");
    }
    Ok(())
}

/// Parse the provided arguments and execute.
/// Calls [`clap::Error::exit`] on failure, printing the error message and aborting the program.
pub fn run_from_iter<I>(args: I) -> Result<()>
where
    I: IntoIterator,
    I::Item: Into<OsString> + Clone,
{
    run_from_opt(Opt::parse_from(args))
}

/// Internal (non-generic/monomorphized) primary CLI entrypoint
pub(crate) fn run_from_opt(opt: Opt) -> Result<()> {
    let config = UtilitiesConfig::load_optional(opt.config.as_deref())?;
    let registry = RomRegistry::from_config(&config);
    tracing::debug!("Using multiboot directory {}", registry.multiboot_dir());

    match &opt.action {
        Action::Generate {
            template_dir,
            output,
        } => generate(&registry, &config, template_dir, output),
        Action::Switch { rom_id, force } => switch(&opt, &registry, rom_id, *force),
        Action::WipeSystem(o) => wipe_rom(&registry, &FsWipe, &o.rom_id, WipeTarget::System),
        Action::WipeCache(o) => wipe_rom(&registry, &FsWipe, &o.rom_id, WipeTarget::Cache),
        Action::WipeData(o) => wipe_rom(&registry, &FsWipe, &o.rom_id, WipeTarget::Data),
        Action::WipeDalvikCache(o) => {
            wipe_rom(&registry, &FsWipe, &o.rom_id, WipeTarget::DalvikCache)
        }
        Action::WipeMultiboot(o) => {
            wipe_rom(&registry, &FsWipe, &o.rom_id, WipeTarget::Multiboot)
        }
    }
}
