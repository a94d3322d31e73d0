//! Failure classes surfaced by the utility actions.
//!
//! Most code returns [`anyhow::Result`]; these variants are attached as
//! the root cause (or as context) so the class survives the error chain
//! and can be recovered with `downcast_ref`.

/// The failure class of an action.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A required input was not supplied.
    #[error("{0}")]
    Configuration(String),
    /// A device, partition, ROM or file could not be found or read.
    #[error("{0}")]
    NotFound(String),
    /// A document could not be decoded.
    #[error("{0}")]
    Parse(String),
    /// Writing the output archive failed.
    #[error("{0}")]
    Io(String),
}
