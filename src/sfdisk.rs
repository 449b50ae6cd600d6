//! sfdisk dump parsing and rendering.
//!
//! `sfdisk -d <dev>` prints a metadata block of `key: value` lines, a blank
//! line, then one `<device> : attr, attr, ...` line per partition. The same
//! text is accepted back on stdin by `sfdisk`, so rendering has to reproduce
//! metadata and attribute order exactly; a malformed rewrite corrupts the
//! disk.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{GrowError, Result};

static EQ_RX: OnceLock<Regex> = OnceLock::new();

/// Collapse `\s*=\s*` to `=` so sfdisk's column padding does not leak into
/// attribute values.
fn normalize_attr(attr: &str) -> String {
    let rx = EQ_RX.get_or_init(|| Regex::new(r"\s*=\s*").expect("static regex"));
    rx.replace_all(attr.trim(), "=").into_owned()
}

/// A single partition attribute. sfdisk mixes bare flags (`bootable`) and
/// key/value pairs (`size=497664`) in one comma-separated list, and the order
/// matters for round-tripping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attr {
    Flag(String),
    KeyValue(String, String),
}

impl Attr {
    fn parse(raw: &str) -> Self {
        let normalized = normalize_attr(raw);
        match normalized.split_once('=') {
            Some((key, value)) => Attr::KeyValue(key.to_string(), value.to_string()),
            None => Attr::Flag(normalized),
        }
    }
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attr::Flag(name) => write!(f, "{name}"),
            Attr::KeyValue(key, value) => write!(f, "{key}={value}"),
        }
    }
}

/// One `<device> : attr, attr, ...` line of the dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionEntry {
    pub device: String,
    attrs: Vec<Attr>,
}

impl PartitionEntry {
    /// Look up an attribute. A flag returns its own name, so
    /// `attr("bootable")` is `Some("bootable")` rather than a boolean.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.iter().find_map(|attr| match attr {
            Attr::Flag(name) if name == key => Some(name.as_str()),
            Attr::KeyValue(k, value) if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    fn attr_u64(&self, key: &str) -> Result<u64> {
        let value = self.attr(key).ok_or_else(|| {
            GrowError::Format(format!("device {:?} has no attribute {key:?}", self.device))
        })?;
        value.parse().map_err(|_| {
            GrowError::Format(format!(
                "device {:?} attribute {key:?} is non-integer: {value:?}",
                self.device
            ))
        })
    }

    pub fn type_code(&self) -> Option<&str> {
        self.attr("type")
    }

    /// First sector of the partition.
    pub fn start(&self) -> Result<u64> {
        self.attr_u64("start")
    }

    /// Size in sectors.
    pub fn size(&self) -> Result<u64> {
        self.attr_u64("size")
    }

    /// Replace the value of the `size=` attribute in place, preserving its
    /// position among the other attributes.
    pub fn set_size(&mut self, size: u64) -> Result<()> {
        for attr in &mut self.attrs {
            if let Attr::KeyValue(key, value) = attr
                && key == "size"
            {
                *value = size.to_string();
                return Ok(());
            }
        }
        Err(GrowError::Format(format!(
            "device {:?} has no size attribute to update",
            self.device
        )))
    }

    fn render(&self) -> String {
        let attrs: Vec<String> = self.attrs.iter().map(|a| a.to_string()).collect();
        format!("{} : {}", self.device, attrs.join(", "))
    }
}

/// Parsed sfdisk dump: the metadata block plus the partition lines, both kept
/// in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTable {
    meta: Vec<String>,
    pub entries: Vec<PartitionEntry>,
}

impl PartitionTable {
    pub fn parse(text: &str) -> Result<Self> {
        let mut meta = Vec::new();
        let mut entries = Vec::new();
        let mut in_entries = false;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                // First blank line ends the metadata block.
                in_entries = true;
                continue;
            }
            if !in_entries {
                meta.push(line.to_string());
                continue;
            }
            let Some((device, rest)) = line.split_once(':') else {
                return Err(GrowError::Format(format!("unsupported sfdisk line {line:?}")));
            };
            entries.push(PartitionEntry {
                device: device.trim().to_string(),
                attrs: rest.trim().split(',').map(Attr::parse).collect(),
            });
        }

        Ok(PartitionTable { meta, entries })
    }

    /// Value of a `key: value` metadata line, if present.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta.iter().find_map(|line| {
            line.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix(':'))
                .map(str::trim)
        })
    }

    /// Drop every metadata line starting with `key: `, keeping the rest in
    /// order.
    pub fn remove_meta(&mut self, key: &str) {
        let prefix = format!("{key}: ");
        self.meta.retain(|line| !line.starts_with(&prefix));
    }

    /// Render back to the textual form sfdisk accepts on stdin.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.meta {
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        for entry in &self.entries {
            out.push_str(&entry.render());
            out.push('\n');
        }
        out
    }
}
