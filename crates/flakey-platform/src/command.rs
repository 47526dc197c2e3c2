//! External tool invocation.
//!
//! Tools (`mkfs.*`, `dmsetup`) are run to completion and their stdout and
//! stderr are kept together so a failure can be diagnosed without re-running.

use std::ffi::OsStr;
use std::process::{Command, Output, Stdio};

use flakey_core::{Error, Result};

/// Runs `program` with `args`, returning its combined output on success.
///
/// `op` and `target` only label the error.
///
/// # Errors
/// - [`Error::ToolNotFound`] if `program` is not on PATH
/// - [`Error::Command`] if it exits unsuccessfully, with the tool output attached
pub fn run<I, S>(program: &str, args: I, op: &str, target: &str) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<S> = args.into_iter().collect();
    tracing::debug!(
        "running {program} {}",
        args.iter()
            .map(|a| a.as_ref().to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let output = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ToolNotFound(program.to_string())
            } else {
                Error::io("spawn", program, e)
            }
        })?;

    let combined = combined_output(&output);
    if !output.status.success() {
        return Err(Error::Command {
            op: op.to_string(),
            target: target.to_string(),
            status: output.status.to_string(),
            output: combined.trim_end().to_string(),
        });
    }
    Ok(combined)
}

/// Joins stdout and stderr, stdout first.
#[must_use]
pub fn combined_output(output: &Output) -> String {
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

/// Checks whether a failed tool's output contains `needle`.
#[must_use]
pub fn output_contains(err: &Error, needle: &str) -> bool {
    matches!(err, Error::Command { output, .. } if output.contains(needle))
}
