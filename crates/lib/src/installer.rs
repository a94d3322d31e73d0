//! Building the flashable installer zip from a template directory.
//!
//! The template tree is walked depth-first in file name order. Regular
//! files are stored under their path relative to the template root,
//! except for the AROMA control script template, which is rendered
//! through a [`TemplateContext`] and stored without its `.in` suffix.
//! Symlinks and special files are skipped with a warning.

use std::fs::File;
use std::io::{BufReader, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path};

use anyhow::{Context, Result};
use camino::Utf8Path;
use fn_error_context::context;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::aroma::{TemplateContext, AROMA_CONFIG, AROMA_CONFIG_TEMPLATE};
use crate::Error;

/// Entries at least this large need the zip64 size fields.
const LARGE_ENTRY_THRESHOLD: u64 = u32::MAX as u64;
/// Read buffer used when streaming files into the archive.
const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// What the walker reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TreeEvent {
    Directory,
    RegularFile,
    Symlink,
    SpecialFile,
}

impl From<std::fs::FileType> for TreeEvent {
    fn from(ft: std::fs::FileType) -> Self {
        if ft.is_symlink() {
            Self::Symlink
        } else if ft.is_dir() {
            Self::Directory
        } else if ft.is_file() {
            Self::RegularFile
        } else {
            Self::SpecialFile
        }
    }
}

/// Options for a deflated entry of `size` bytes.
fn entry_options(size: u64) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(None)
        .large_file(size >= LARGE_ENTRY_THRESHOLD)
}

/// The output archive. Owns the file handle until [`Self::finish`].
struct InstallerArchive {
    zip: ZipWriter<File>,
}

impl std::fmt::Debug for InstallerArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallerArchive").finish_non_exhaustive()
    }
}

impl InstallerArchive {
    fn create(path: &Utf8Path) -> Result<Self> {
        let f = File::create(path)
            .map_err(|e| Error::Io(format!("{path}: Failed to open for writing: {e}")))?;
        Ok(Self {
            zip: ZipWriter::new(f),
        })
    }

    /// Add an entry from memory.
    fn add_bytes(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.zip
            .start_file(name, entry_options(data.len() as u64))
            .with_context(|| Error::Io(format!("Failed to add {name}")))?;
        self.zip
            .write_all(data)
            .with_context(|| Error::Io(format!("Failed to write {name}")))?;
        Ok(())
    }

    /// Stream `path` into a new entry, keeping its permission bits.
    fn add_file(&mut self, name: &str, path: &Path) -> Result<()> {
        let f = File::open(path).map_err(|e| {
            Error::NotFound(format!("{}: Failed to open for reading: {e}", path.display()))
        })?;
        let meta = f
            .metadata()
            .map_err(|e| Error::NotFound(format!("{}: Failed to stat: {e}", path.display())))?;
        let options = entry_options(meta.len()).unix_permissions(meta.mode() & 0o777);
        self.zip
            .start_file(name, options)
            .with_context(|| Error::Io(format!("Failed to add {name}")))?;
        let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, f);
        std::io::copy(&mut reader, &mut self.zip)
            .with_context(|| Error::Io(format!("Failed to copy {} to {name}", path.display())))?;
        Ok(())
    }

    /// Write the central directory and close the file.
    fn finish(self) -> Result<()> {
        let f = self
            .zip
            .finish()
            .map_err(|e| Error::Io(format!("Failed to finalize archive: {e}")))?;
        f.sync_all()
            .map_err(|e| Error::Io(format!("Failed to finalize archive: {e}")))?;
        Ok(())
    }
}

/// Archive name of `path`: its components below `root`, joined with `/`.
fn archive_name(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .with_context(|| format!("{} is not under {}", path.display(), root.display()))?;
    let parts = rel
        .components()
        .map(|c| match c {
            Component::Normal(s) => s
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in path {}", path.display())),
            _ => Err(anyhow::anyhow!("Unexpected component in {}", path.display())),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(parts.join("/"))
}

/// Render the control script template at `path`.
fn render_control_file(path: &Path, ctx: &TemplateContext) -> Result<String> {
    let data = std::fs::read(path)
        .map_err(|e| Error::NotFound(format!("Failed to read: {}: {e}", path.display())))?;
    let text = String::from_utf8(data)
        .map_err(|e| Error::Parse(format!("{}: {e}", path.display())))?;
    Ok(ctx.apply(&text))
}

/// Walk `root` and add every regular file to `archive`, stopping at the
/// first failure.
fn add_tree(archive: &mut InstallerArchive, root: &Utf8Path, ctx: &TemplateContext) -> Result<()> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|e| Error::NotFound(format!("Failed to walk {root}: {e}")))?;
        let path = entry.path();
        match TreeEvent::from(entry.file_type()) {
            TreeEvent::Directory => {}
            TreeEvent::Symlink => {
                tracing::warn!("Ignoring symlink when creating zip: {}", path.display());
            }
            TreeEvent::SpecialFile => {
                tracing::warn!("Ignoring special file when creating zip: {}", path.display());
            }
            TreeEvent::RegularFile => {
                let name = archive_name(root.as_std_path(), path)?;
                if name == AROMA_CONFIG_TEMPLATE {
                    tracing::debug!("{} -> {AROMA_CONFIG}", path.display());
                    let rendered = render_control_file(path, ctx)?;
                    archive.add_bytes(AROMA_CONFIG, rendered.as_bytes())?;
                } else {
                    tracing::debug!("{} -> {name}", path.display());
                    archive.add_file(&name, path)?;
                }
            }
        }
    }
    Ok(())
}

/// Build the installer zip at `output` from the template tree at
/// `template_dir`. The archive is finalized even when the walk fails.
#[context("Generating {output} from {template_dir}")]
pub fn build_installer(
    template_dir: &Utf8Path,
    output: &Utf8Path,
    ctx: &TemplateContext,
) -> Result<()> {
    let mut archive = InstallerArchive::create(output)?;
    let walked = add_tree(&mut archive, template_dir, ctx);
    let finished = archive.finish();
    match (walked, finished) {
        (Err(e), Err(finish_err)) => {
            tracing::error!("{finish_err:#}");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), r) => r,
    }
}
