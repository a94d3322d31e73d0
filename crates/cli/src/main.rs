//! The main entrypoint for the multi-boot utilities; the code lives
//! in the `mbtool-lib` crate.

use anyhow::Result;

fn run() -> Result<()> {
    mbtool_utils::initialize_tracing();
    tracing::trace!("starting {}", mbtool_lib::VERSION);
    mbtool_lib::cli::run_from_iter(std::env::args_os())
}

fn main() {
    // Errors are rendered with their full context chain; the exit code
    // only distinguishes success from failure.
    if let Err(e) = run() {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}
