//! Helpers for locating block-special device nodes.
//!
//! Device definitions list several candidate paths for each partition
//! because the by-name symlinks differ between kernels and recoveries.
//! Only the first candidate that currently resolves to a block device
//! is used.

use camino::{Utf8Path, Utf8PathBuf};
use rustix::fs::FileType;

/// Returns true if `path` exists and, after following symlinks, is a
/// block-special node.
pub fn is_block_device(path: &Utf8Path) -> bool {
    match rustix::fs::stat(path.as_str()) {
        Ok(st) => FileType::from_raw_mode(st.st_mode as _) == FileType::BlockDevice,
        Err(e) => {
            tracing::trace!("Cannot stat {path}: {e}");
            false
        }
    }
}

/// Return the first of `candidates` accepted by `probe`. List order
/// decides the winner when more than one path qualifies.
pub fn find_first_node<F>(candidates: &[Utf8PathBuf], mut probe: F) -> Option<&Utf8Path>
where
    F: FnMut(&Utf8Path) -> bool,
{
    candidates
        .iter()
        .map(Utf8PathBuf::as_path)
        .find(|p| probe(p))
}
