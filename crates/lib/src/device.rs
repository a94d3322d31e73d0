//! Device definitions and detection of the running device.
//!
//! The definitions file is a JSON array of device records. Records are
//! matched in document order against the identity read from the
//! property store, so when two records share a codename the earlier
//! one wins.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use fn_error_context::context;
use serde::Deserialize;

use crate::properties::RuntimeIdentity;
use crate::Error;

/// Architectures a device record may declare.
const ARCHITECTURES: &[&str] = &["armeabi-v7a", "arm64-v8a", "x86", "x86_64"];

/// Candidate block device paths for each partition, in priority order.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BlockDevs {
    /// Directories holding by-name partition links.
    pub base_dirs: Vec<Utf8PathBuf>,
    /// System partition candidates.
    pub system: Vec<Utf8PathBuf>,
    /// Cache partition candidates.
    pub cache: Vec<Utf8PathBuf>,
    /// Data partition candidates.
    pub data: Vec<Utf8PathBuf>,
    /// Boot partition candidates.
    pub boot: Vec<Utf8PathBuf>,
    /// Recovery partition candidates.
    pub recovery: Vec<Utf8PathBuf>,
    /// Other partitions that are switched along with the ROM.
    pub extra: Vec<Utf8PathBuf>,
}

/// A single device record.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Device {
    /// Unique identifier of the record.
    pub id: String,
    /// Codenames the device reports in its properties.
    pub codenames: Vec<String>,
    /// Human readable name.
    pub name: String,
    /// Android ABI.
    pub architecture: String,
    /// Partition paths.
    pub block_devs: BlockDevs,
}

/// Why a device record is unusable.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidDevice {
    /// The record has no ID.
    #[error("missing device ID")]
    MissingId,
    /// The record lists no codenames.
    #[error("missing codenames")]
    MissingCodenames,
    /// The record has no name.
    #[error("missing device name")]
    MissingName,
    /// The record has no architecture.
    #[error("missing architecture")]
    MissingArchitecture,
    /// The architecture is not one we know.
    #[error("invalid architecture: {0}")]
    InvalidArchitecture(String),
    /// A required partition has no candidate paths.
    #[error("missing {0} block device paths")]
    MissingBlockDevs(&'static str),
}

impl Device {
    /// Check that the record is complete enough to be used.
    pub fn validate(&self) -> std::result::Result<(), InvalidDevice> {
        if self.id.is_empty() {
            return Err(InvalidDevice::MissingId);
        }
        if self.codenames.is_empty() {
            return Err(InvalidDevice::MissingCodenames);
        }
        if self.name.is_empty() {
            return Err(InvalidDevice::MissingName);
        }
        if self.architecture.is_empty() {
            return Err(InvalidDevice::MissingArchitecture);
        }
        if !ARCHITECTURES.contains(&self.architecture.as_str()) {
            return Err(InvalidDevice::InvalidArchitecture(
                self.architecture.clone(),
            ));
        }
        let devs = &self.block_devs;
        for (name, paths) in [
            ("system", &devs.system),
            ("cache", &devs.cache),
            ("data", &devs.data),
            ("boot", &devs.boot),
        ] {
            if paths.is_empty() {
                return Err(InvalidDevice::MissingBlockDevs(name));
            }
        }
        Ok(())
    }
}

/// Decode a device definitions document.
pub fn parse_device_list(buf: &[u8]) -> Result<Vec<Device>> {
    serde_json::from_slice(buf).map_err(|e| Error::Parse(e.to_string()).into())
}

/// Return the first valid device in `devices` matching `identity`.
/// Invalid records are skipped.
pub fn match_device(devices: Vec<Device>, identity: &RuntimeIdentity) -> Result<Device> {
    for device in devices {
        if let Err(e) = device.validate() {
            tracing::warn!("Skipping invalid device {:?}: {e}", device.id);
            continue;
        }
        if device.codenames.iter().any(|c| identity.matches(c)) {
            tracing::debug!("Matched device {} ({})", device.id, device.name);
            return Ok(device);
        }
    }
    Err(Error::NotFound(format!("Unknown device: {}", identity.product_device)).into())
}

/// Load the definitions at `path` and find the running device.
#[context("Detecting device from {path}")]
pub fn find_device(path: &Utf8Path, identity: &RuntimeIdentity) -> Result<Device> {
    let buf = std::fs::read(path)
        .map_err(|e| Error::NotFound(format!("{path}: Failed to read file: {e}")))?;
    let devices = parse_device_list(&buf).with_context(|| format!("{path}: Failed to load devices"))?;
    match_device(devices, identity)
}

#[cfg(test)]
mod test {
    use super::*;

    const FIXTURE: &str = indoc::indoc! { r#"
        [
            {
                "id": "jflte",
                "codenames": ["jflte", "jfltexx", "jfltetmo"],
                "name": "Samsung Galaxy S 4",
                "architecture": "armeabi-v7a",
                "block_devs": {
                    "base_dirs": ["/dev/block/platform/msm_sdcc.1/by-name"],
                    "system": ["/dev/block/platform/msm_sdcc.1/by-name/system", "/dev/block/mmcblk0p16"],
                    "cache": ["/dev/block/platform/msm_sdcc.1/by-name/cache", "/dev/block/mmcblk0p18"],
                    "data": ["/dev/block/platform/msm_sdcc.1/by-name/userdata", "/dev/block/mmcblk0p29"],
                    "boot": ["/dev/block/platform/msm_sdcc.1/by-name/boot", "/dev/block/mmcblk0p20"],
                    "recovery": ["/dev/block/platform/msm_sdcc.1/by-name/recovery", "/dev/block/mmcblk0p21"]
                }
            },
            {
                "id": "jflteport",
                "codenames": ["jfltexx"],
                "name": "Samsung Galaxy S 4 (port)",
                "architecture": "armeabi-v7a",
                "block_devs": {
                    "system": ["/dev/block/mmcblk0p16"],
                    "cache": ["/dev/block/mmcblk0p18"],
                    "data": ["/dev/block/mmcblk0p29"],
                    "boot": ["/dev/block/mmcblk0p20"]
                }
            },
            {
                "id": "hlte",
                "codenames": ["hlte", "hltexx"],
                "name": "Samsung Galaxy Note 3",
                "architecture": "armeabi-v7a",
                "unknown_key": true,
                "block_devs": {
                    "system": ["/dev/block/mmcblk0p23"],
                    "cache": ["/dev/block/mmcblk0p24"],
                    "data": ["/dev/block/mmcblk0p26"],
                    "boot": ["/dev/block/mmcblk0p14"]
                }
            }
        ]
    "# };

    fn identity(product_device: &str, build_product: &str) -> RuntimeIdentity {
        RuntimeIdentity {
            product_device: product_device.into(),
            build_product: build_product.into(),
        }
    }

    fn fixture() -> Vec<Device> {
        parse_device_list(FIXTURE.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse() {
        let devices = fixture();
        assert_eq!(devices.len(), 3);
        let d = &devices[0];
        assert_eq!(d.codenames, ["jflte", "jfltexx", "jfltetmo"]);
        assert_eq!(d.block_devs.boot.len(), 2);
        assert_eq!(d.block_devs.base_dirs.len(), 1);
        assert!(devices[1].block_devs.base_dirs.is_empty());
        for d in devices {
            d.validate().unwrap();
        }
    }

    #[test]
    fn test_parse_malformed() {
        for doc in [
            "",
            "{",
            r#"{"id": "jflte"}"#,
            r#"[{"codenames": "jflte"}]"#,
            r#"[{"block_devs": {"boot": [1]}}]"#,
        ] {
            let e = parse_device_list(doc.as_bytes()).unwrap_err();
            assert!(
                matches!(e.downcast_ref::<Error>(), Some(Error::Parse(_))),
                "{doc}"
            );
        }
    }

    #[test]
    fn test_first_match_wins() {
        // Both jflte and jflteport list jfltexx; document order decides.
        let d = match_device(fixture(), &identity("jfltexx", "")).unwrap();
        assert_eq!(d.id, "jflte");
        let d = match_device(fixture(), &identity("", "hltexx")).unwrap();
        assert_eq!(d.id, "hlte");
        let mut reversed = fixture();
        reversed.reverse();
        let d = match_device(reversed, &identity("jfltexx", "")).unwrap();
        assert_eq!(d.id, "jflteport");
    }

    #[test]
    fn test_no_match() {
        let e = match_device(fixture(), &identity("bacon", "A0001")).unwrap_err();
        let Some(Error::NotFound(msg)) = e.downcast_ref::<Error>() else {
            panic!("unexpected error {e:?}");
        };
        assert_eq!(msg, "Unknown device: bacon");
    }

    #[test]
    fn test_invalid_devices_skipped() {
        let mut devices = fixture();
        devices[0].architecture = "mips".into();
        let d = match_device(devices.clone(), &identity("jfltexx", "")).unwrap();
        assert_eq!(d.id, "jflteport");
        devices[1].block_devs.boot.clear();
        assert!(match_device(devices, &identity("jfltexx", "")).is_err());
    }

    #[test]
    fn test_validate() {
        let good = fixture().remove(2);
        let cases: [(fn(&mut Device), InvalidDevice); 6] = [
            (|d| d.id.clear(), InvalidDevice::MissingId),
            (|d| d.codenames.clear(), InvalidDevice::MissingCodenames),
            (|d| d.name.clear(), InvalidDevice::MissingName),
            (|d| d.architecture.clear(), InvalidDevice::MissingArchitecture),
            (
                |d| d.architecture = "sparc".into(),
                InvalidDevice::InvalidArchitecture("sparc".into()),
            ),
            (
                |d| d.block_devs.data.clear(),
                InvalidDevice::MissingBlockDevs("data"),
            ),
        ];
        for (mutate, expected) in cases {
            let mut d = good.clone();
            mutate(&mut d);
            assert_eq!(d.validate().unwrap_err(), expected);
        }
    }

    #[test]
    fn test_find_device() -> Result<()> {
        let td = tempfile::tempdir()?;
        let root = Utf8Path::from_path(td.path()).unwrap();
        let path = root.join("devices.json");
        std::fs::write(&path, FIXTURE)?;
        let d = find_device(&path, &identity("hlte", "hlte"))?;
        assert_eq!(d.name, "Samsung Galaxy Note 3");

        let e = find_device(&root.join("missing.json"), &identity("hlte", "")).unwrap_err();
        assert!(matches!(e.downcast_ref::<Error>(), Some(Error::NotFound(_))));

        std::fs::write(&path, "[{")?;
        let e = find_device(&path, &identity("hlte", "")).unwrap_err();
        assert!(matches!(e.downcast_ref::<Error>(), Some(Error::Parse(_))));
        Ok(())
    }
}
