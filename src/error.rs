//! Error types for the grow pipeline.
//!
//! Every stage returns a typed error instead of exiting; only `main` decides
//! the process exit status.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GrowError {
    /// Device selection problems, reported before any stage runs.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unsupported or malformed partition table content.
    #[error("partition table error: {0}")]
    Format(String),

    /// An external tool exited nonzero (or could not be started) without a
    /// recognized benign diagnostic.
    #[error("{tool}: {message}")]
    Tool { tool: &'static str, message: String },

    /// More than one mounted filesystem resolved to the grown devices.
    #[error("more than one filesystem found on the grown devices: {0}")]
    AmbiguousFilesystem(String),

    #[error("don't know how to resize {fstype} filesystem on {device} mounted at {mount}")]
    UnsupportedFilesystem {
        fstype: String,
        device: String,
        mount: String,
    },

    #[error("cannot stat {path}: {source}")]
    Stat {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sysfs: {0}")]
    Sysfs(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GrowError {
    pub fn tool(tool: &'static str, message: impl Into<String>) -> Self {
        Self::Tool {
            tool,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GrowError>;
