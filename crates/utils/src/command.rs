//! Helpers intended for [`std::process::Command`] and related structures.

use std::process::{Command, Stdio};

use anyhow::{Context, Result};

/// Helpers intended for [`std::process::Command`].
pub trait CommandRunExt {
    /// Log (at debug level) the full child commandline.
    fn log_debug(&mut self) -> &mut Self;

    /// Execute the child process and return its stdout as a string.
    /// A nonzero exit status is an error carrying the child's stderr.
    fn run_get_string(&mut self) -> Result<String>;

    /// Render the program and its arguments, shell-quoted where needed.
    fn to_string_pretty(&self) -> String;
}

impl CommandRunExt for Command {
    fn log_debug(&mut self) -> &mut Self {
        tracing::debug!("exec: {}", self.to_string_pretty());
        self
    }

    fn run_get_string(&mut self) -> Result<String> {
        let desc = self.to_string_pretty();
        let output = self
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Spawning {desc}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{desc} failed: {}: {}", output.status, stderr.trim());
        }
        String::from_utf8(output.stdout).with_context(|| format!("Parsing output of {desc}"))
    }

    fn to_string_pretty(&self) -> String {
        std::iter::once(self.get_program())
            .chain(self.get_args())
            .map(|arg| {
                let arg = arg.to_string_lossy();
                match shlex::try_quote(&arg) {
                    Ok(quoted) => quoted.into_owned(),
                    // Only fails on embedded NUL, which we can't quote anyway
                    Err(_) => arg.into_owned(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
