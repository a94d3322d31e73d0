//! The `switch` action: detect the device, pick its boot partition and
//! hand off to a [`SwitchEngine`].
//!
//! Nothing here modifies boot configuration directly.

use anyhow::{Context, Result};
use camino::Utf8Path;
use fn_error_context::context;

use crate::blockdev;
use crate::device::find_device;
use crate::properties::{PropertySource, RuntimeIdentity};
use crate::switcher::{SwitchEngine, SwitchOutcome};
use crate::Error;

/// Everything the switch action depends on, passed explicitly.
#[derive(Debug)]
pub struct SwitchContext<'a> {
    /// Device definitions file; the action fails without one.
    pub devices_path: Option<&'a Utf8Path>,
    /// Where the runtime identity is read from.
    pub properties: &'a dyn PropertySource,
    /// Performs the actual switch.
    pub engine: &'a dyn SwitchEngine,
    /// Decides whether a boot partition candidate is usable.
    pub is_block_device: fn(&Utf8Path) -> bool,
}

impl<'a> SwitchContext<'a> {
    /// Create a context that probes the real filesystem for block devices.
    pub fn new(
        devices_path: Option<&'a Utf8Path>,
        properties: &'a dyn PropertySource,
        engine: &'a dyn SwitchEngine,
    ) -> Self {
        Self {
            devices_path,
            properties,
            engine,
            is_block_device: blockdev::is_block_device,
        }
    }

    /// Switch to `rom_id` and return the engine's outcome unchanged.
    /// Errors are reserved for failures before the engine is reached.
    #[context("Switching to {rom_id}")]
    pub fn switch_rom(&self, rom_id: &str, force: bool) -> Result<SwitchOutcome> {
        let Some(devices_path) = self.devices_path else {
            return Err(Error::Configuration("No device definitions file specified".into()).into());
        };

        let identity = RuntimeIdentity::read(self.properties);
        let device = find_device(devices_path, &identity).context("Failed to detect device")?;

        let boot = blockdev::find_first_node(&device.block_devs.boot, self.is_block_device)
            .ok_or_else(|| {
                Error::NotFound("All specified boot partition paths could not be found".into())
            })?;
        tracing::debug!("Using boot partition {boot}");

        let outcome = self
            .engine
            .switch_rom(rom_id, boot, &device.block_devs.base_dirs, force);
        tracing::info!("Switch to {rom_id}: {outcome}");
        Ok(outcome)
    }
}
