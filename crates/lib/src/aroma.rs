//! Generation of the AROMA installer control script.
//!
//! The installer template ships `aroma-config.in`, a script with
//! `@TOKEN@` placeholders. Each placeholder is replaced literally with
//! text generated from the installed ROMs and the current mount points.

use crate::roms::{MountPoints, RomRegistry};

/// Location of the control script template, relative to the template root.
pub const AROMA_CONFIG_TEMPLATE: &str = "META-INF/com/google/android/aroma-config.in";
/// Where the generated control script is stored in the archive.
pub const AROMA_CONFIG: &str = "META-INF/com/google/android/aroma-config";

/// Property file and key AROMA records the selected menu entry in.
const SELECTION_PROP_FILE: &str = "operations.prop";
const SELECTION_PROP_KEY: &str = "selected";

/// Placement of the ROM entries within the installer's menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuLayout {
    /// Entries the template places ahead of the ROM list.
    pub fixed_entries: usize,
}

impl Default for MenuLayout {
    fn default() -> Self {
        Self { fixed_entries: 2 }
    }
}

impl MenuLayout {
    /// One-based menu index of the ROM at zero-based position `i`.
    pub fn index_of(self, i: usize) -> usize {
        self.fixed_entries + 1 + i
    }

    /// Menu index of the first ROM entry.
    pub fn first_index(self) -> usize {
        self.index_of(0)
    }

    /// Menu index of the last ROM entry when there are `count` ROMs.
    pub fn last_index(self, count: usize) -> usize {
        self.fixed_entries + count
    }
}

/// A ROM as shown in the installer menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuRom {
    /// ROM ID.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// The ordered placeholder substitutions for one build.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    replacements: Vec<(&'static str, String)>,
}

impl TemplateContext {
    /// Build the substitutions from already resolved inputs.
    pub fn new(version: &str, roms: &[MenuRom], mounts: &MountPoints, layout: MenuLayout) -> Self {
        let mut menu_items = String::new();
        let mut selection_items = String::new();
        for (i, rom) in roms.iter().enumerate() {
            menu_items.push_str(&format!("\"{}\", \"\", \"@default\",\n", rom.name));
            selection_items.push_str(&format!(
                "if prop(\"{SELECTION_PROP_FILE}\", \"{SELECTION_PROP_KEY}\") == \"{}\" then\n    \
                 setvar(\"romid\", \"{}\");\n    \
                 setvar(\"romname\", \"{}\");\n\
                 endif;\n",
                layout.index_of(i),
                rom.id,
                rom.name
            ));
        }

        let replacements = vec![
            ("@MBTOOL_VERSION@", version.to_owned()),
            ("@ROM_MENU_ITEMS@", menu_items),
            ("@ROM_SELECTION_ITEMS@", selection_items),
            ("@FIRST_INDEX@", layout.first_index().to_string()),
            ("@LAST_INDEX@", layout.last_index(roms.len()).to_string()),
            ("@SYSTEM_MOUNT_POINT@", mounts.system.to_string()),
            ("@CACHE_MOUNT_POINT@", mounts.cache.to_string()),
            ("@DATA_MOUNT_POINT@", mounts.data.to_string()),
            ("@EXTSD_MOUNT_POINT@", mounts.extsd.to_string()),
        ];
        Self { replacements }
    }

    /// Gather installed ROMs and mount points from `registry`.
    pub fn from_registry(registry: &RomRegistry, layout: MenuLayout) -> Self {
        let roms = registry
            .installed()
            .iter()
            .map(|rom| MenuRom {
                id: rom.id.clone(),
                name: rom.display_name(),
            })
            .collect::<Vec<_>>();
        Self::new(crate::VERSION, &roms, registry.mount_points(), layout)
    }

    /// The replacement for `token`, if it is a known placeholder.
    pub fn get(&self, token: &str) -> Option<&str> {
        self.replacements
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, v)| v.as_str())
    }

    /// Render `template`. Tabs are escaped first since AROMA does not
    /// accept them literally; placeholders are then replaced in order.
    pub fn apply(&self, template: &str) -> String {
        let mut out = template.replace('\t', "\\t");
        for (token, value) in &self.replacements {
            out = out.replace(token, value);
        }
        out
    }
}

#[cfg(test)]
mod test {
    use anyhow::Result;
    use camino::Utf8PathBuf;

    use super::*;

    fn mounts() -> MountPoints {
        MountPoints {
            system: Utf8PathBuf::from("/raw/system"),
            cache: Utf8PathBuf::from("/raw/cache"),
            data: Utf8PathBuf::from("/raw/data"),
            extsd: Utf8PathBuf::from("/raw/extsd"),
        }
    }

    fn roms(ids: &[&str]) -> Vec<MenuRom> {
        ids.iter()
            .map(|id| MenuRom {
                id: id.to_string(),
                name: id.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_indices_no_roms() {
        let ctx = TemplateContext::new("1.0", &[], &mounts(), MenuLayout::default());
        assert_eq!(ctx.apply("@FIRST_INDEX@,@LAST_INDEX@"), "3,2");
        assert_eq!(ctx.get("@ROM_MENU_ITEMS@"), Some(""));
        assert_eq!(ctx.get("@ROM_SELECTION_ITEMS@"), Some(""));
        assert_eq!(ctx.get("@BOGUS@"), None);
    }

    #[test]
    fn test_rom_items() {
        let ctx = TemplateContext::new(
            "1.0",
            &roms(&["rom1", "rom2"]),
            &mounts(),
            MenuLayout::default(),
        );
        similar_asserts::assert_eq!(
            ctx.get("@ROM_MENU_ITEMS@").unwrap(),
            "\"rom1\", \"\", \"@default\",\n\"rom2\", \"\", \"@default\",\n"
        );
        similar_asserts::assert_eq!(
            ctx.get("@ROM_SELECTION_ITEMS@").unwrap(),
            indoc::indoc! { r#"
                if prop("operations.prop", "selected") == "3" then
                    setvar("romid", "rom1");
                    setvar("romname", "rom1");
                endif;
                if prop("operations.prop", "selected") == "4" then
                    setvar("romid", "rom2");
                    setvar("romname", "rom2");
                endif;
            "# }
        );
        assert_eq!(ctx.apply("@FIRST_INDEX@-@LAST_INDEX@"), "3-4");
    }

    #[test]
    fn test_display_names() {
        let roms = vec![MenuRom {
            id: "data-slot-los".into(),
            name: "LineageOS 14.1".into(),
        }];
        let ctx = TemplateContext::new("1.0", &roms, &mounts(), MenuLayout::default());
        let selection = ctx.get("@ROM_SELECTION_ITEMS@").unwrap();
        assert!(selection.contains("setvar(\"romid\", \"data-slot-los\");"));
        assert!(selection.contains("setvar(\"romname\", \"LineageOS 14.1\");"));
        assert_eq!(
            ctx.get("@ROM_MENU_ITEMS@").unwrap(),
            "\"LineageOS 14.1\", \"\", \"@default\",\n"
        );
    }

    #[test]
    fn test_custom_layout() {
        let layout = MenuLayout { fixed_entries: 4 };
        let ctx = TemplateContext::new("1.0", &roms(&["a", "b", "c"]), &mounts(), layout);
        assert_eq!(ctx.apply("@FIRST_INDEX@,@LAST_INDEX@"), "5,7");
        assert!(ctx
            .get("@ROM_SELECTION_ITEMS@")
            .unwrap()
            .contains("== \"7\" then"));
    }

    #[test]
    fn test_apply() {
        let ctx = TemplateContext::new("9.3.0", &[], &mounts(), MenuLayout::default());
        let template = "ini_set(\"rom_version\", \"@MBTOOL_VERSION@\");\n\tmount(\"@SYSTEM_MOUNT_POINT@\");\n@CACHE_MOUNT_POINT@ @DATA_MOUNT_POINT@ @EXTSD_MOUNT_POINT@ @SYSTEM_MOUNT_POINT@\n";
        similar_asserts::assert_eq!(
            ctx.apply(template),
            "ini_set(\"rom_version\", \"9.3.0\");\n\\tmount(\"/raw/system\");\n/raw/cache /raw/data /raw/extsd /raw/system\n"
        );
    }

    #[test]
    fn test_from_registry() -> Result<()> {
        let td = tempfile::tempdir()?;
        let r = crate::roms::test::fixture(&td);
        crate::roms::test::install(&r, "primary");
        crate::roms::test::install(&r, "data-slot-b");
        let rom = r.rom("data-slot-b").unwrap();
        std::fs::create_dir_all(&rom.multiboot_path)?;
        std::fs::write(rom.config_path(), r#"{"name": "Slot B"}"#)?;

        let ctx = TemplateContext::from_registry(&r, MenuLayout::default());
        assert_eq!(ctx.get("@MBTOOL_VERSION@"), Some(crate::VERSION));
        assert_eq!(ctx.apply("@LAST_INDEX@"), "4");
        similar_asserts::assert_eq!(
            ctx.get("@ROM_MENU_ITEMS@").unwrap(),
            "\"primary\", \"\", \"@default\",\n\"Slot B\", \"\", \"@default\",\n"
        );
        assert_eq!(
            ctx.get("@DATA_MOUNT_POINT@").unwrap(),
            r.mount_points().data.as_str()
        );
        Ok(())
    }
}
