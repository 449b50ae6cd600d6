//! Thin wrappers around external tool invocation.
//!
//! Every stage delegates the actual resizing to system tools; these helpers
//! run them, capture their output and turn failure to start into a
//! `GrowError::Tool` naming the program.

use std::process::{Command, Output};

use crate::error::{GrowError, Result};

/// Run a tool to completion, capturing stdout and stderr.
pub fn run(tool: &'static str, args: &[&str]) -> Result<Output> {
    Command::new(tool)
        .args(args)
        .output()
        .map_err(|e| GrowError::tool(tool, format!("failed to execute: {e}")))
}

/// Run a tool and fail on nonzero exit, surfacing its stderr.
pub fn run_checked(tool: &'static str, args: &[&str]) -> Result<String> {
    let output = run(tool, args)?;
    if !output.status.success() {
        return Err(GrowError::tool(tool, stderr_text(&output)));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// The tool's stderr, falling back to the exit status when it printed
/// nothing.
pub fn stderr_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exited with {}", output.status)
    } else {
        stderr.to_string()
    }
}
