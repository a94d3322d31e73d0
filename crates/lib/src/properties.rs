//! Access to the Android property store.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::process::Command;

use mbtool_utils::CommandRunExt;

/// Property naming the device codename.
pub const PROP_PRODUCT_DEVICE: &str = "ro.product.device";
/// Property naming the build product, which sometimes differs from the
/// device codename on ports and variants.
pub const PROP_BUILD_PRODUCT: &str = "ro.build.product";

/// A read-only source of system properties.
pub trait PropertySource: Debug {
    /// Look up `name`; unset properties read as the empty string.
    fn property(&self, name: &str) -> String;
}

/// Reads properties from the running system with `getprop`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AndroidProperties;

impl PropertySource for AndroidProperties {
    fn property(&self, name: &str) -> String {
        match Command::new("getprop").arg(name).log_debug().run_get_string() {
            Ok(v) => v.trim_end().to_owned(),
            Err(e) => {
                tracing::debug!("Reading property {name}: {e:#}");
                String::new()
            }
        }
    }
}

impl PropertySource for BTreeMap<String, String> {
    fn property(&self, name: &str) -> String {
        self.get(name).cloned().unwrap_or_default()
    }
}

/// The identity strings used to look up the running device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeIdentity {
    /// Value of `ro.product.device`.
    pub product_device: String,
    /// Value of `ro.build.product`.
    pub build_product: String,
}

impl RuntimeIdentity {
    /// Query both identity properties from `props`.
    pub fn read(props: &dyn PropertySource) -> Self {
        let product_device = props.property(PROP_PRODUCT_DEVICE);
        let build_product = props.property(PROP_BUILD_PRODUCT);
        tracing::debug!("{PROP_PRODUCT_DEVICE} = {product_device}");
        tracing::debug!("{PROP_BUILD_PRODUCT} = {build_product}");
        Self {
            product_device,
            build_product,
        }
    }

    /// Whether `codename` names this device.
    pub fn matches(&self, codename: &str) -> bool {
        codename == self.product_device || codename == self.build_product
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_identity() {
        let props: BTreeMap<String, String> = [
            (PROP_PRODUCT_DEVICE, "jflte"),
            (PROP_BUILD_PRODUCT, "jfltexx"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
        let id = RuntimeIdentity::read(&props);
        assert_eq!(id.product_device, "jflte");
        assert_eq!(id.build_product, "jfltexx");
        assert!(id.matches("jflte"));
        assert!(id.matches("jfltexx"));
        assert!(!id.matches("hlte"));
    }

    #[test]
    fn test_unset_is_empty() {
        let props: BTreeMap<String, String> = BTreeMap::new();
        let id = RuntimeIdentity::read(&props);
        assert_eq!(id, RuntimeIdentity::default());
    }
}
