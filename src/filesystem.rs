//! Filesystem growth: find the one mounted filesystem living on a grown
//! device and run the matching resize tool.

use std::fs;

use crate::command;
use crate::error::{GrowError, Result};
use crate::identity::{DeviceIdentity, IdentitySet};
use crate::pipeline::GrowConfig;

/// resize2fs prints this when the filesystem already fills its device.
const NOTHING_TO_DO_MARKER: &str = "Nothing to do!";

const PROC_MOUNTS: &str = "/proc/mounts";

/// One line of the mount table: source device, mount point, filesystem type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mount: String,
    pub fstype: String,
}

/// Parse `/proc/mounts` content, keeping only entries backed by an absolute
/// device path (tmpfs, proc and friends have none).
pub fn parse_mounts(text: &str) -> Vec<MountEntry> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mount = fields.next()?;
            let fstype = fields.next()?;
            if !device.starts_with('/') {
                return None;
            }
            Some(MountEntry {
                device: device.to_string(),
                mount: mount.to_string(),
                fstype: fstype.to_string(),
            })
        })
        .collect()
}

/// Mount entries whose source resolves to one of the grown devices. Identity
/// is decided per device, not per path string.
pub fn matching_filesystems<'a>(
    entries: &'a [MountEntry],
    targets: &IdentitySet,
) -> Result<Vec<&'a MountEntry>> {
    let mut found = Vec::new();
    for entry in entries {
        let identity = DeviceIdentity::of(&entry.device)?;
        if targets.contains(&identity) {
            found.push(entry);
        }
    }
    Ok(found)
}

/// The resize command for a mounted filesystem. resize2fs addresses the
/// device, xfs_growfs and btrfs address the mount point.
pub fn grow_command(entry: &MountEntry) -> Result<(&'static str, Vec<String>)> {
    match entry.fstype.as_str() {
        "ext2" | "ext3" | "ext4" => Ok(("resize2fs", vec![entry.device.clone()])),
        "xfs" => Ok(("xfs_growfs", vec!["-d".to_string(), entry.mount.clone()])),
        "btrfs" => Ok((
            "btrfs",
            vec![
                "filesystem".to_string(),
                "resize".to_string(),
                "max".to_string(),
                entry.mount.clone(),
            ],
        )),
        _ => Err(GrowError::UnsupportedFilesystem {
            fstype: entry.fstype.clone(),
            device: entry.device.clone(),
            mount: entry.mount.clone(),
        }),
    }
}

/// Grow whichever filesystem lives on the partition or one of the LVs.
pub fn grow(cfg: &GrowConfig, part_dev: &str, lv_devices: &[String]) -> Result<()> {
    let mut targets = IdentitySet::default();
    targets.add_path(part_dev)?;
    for lv in lv_devices {
        targets.add_path(lv)?;
    }

    let mounts = fs::read_to_string(PROC_MOUNTS)?;
    let entries = parse_mounts(&mounts);
    let matches = matching_filesystems(&entries, &targets)?;

    let entry = match matches.as_slice() {
        [] => {
            println!("No filesystem found on {part_dev}; nothing to grow");
            return Ok(());
        }
        [one] => *one,
        many => {
            let described: Vec<String> = many
                .iter()
                .map(|m| format!("{} ({}) on {}", m.device, m.fstype, m.mount))
                .collect();
            return Err(GrowError::AmbiguousFilesystem(described.join(", ")));
        }
    };

    let (tool, args) = grow_command(entry)?;
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    if cfg.dry_run {
        println!("[dry-run] would've run {tool} {}", args.join(" "));
        return Ok(());
    }

    println!(
        "Growing {} filesystem on {} mounted at {} with {tool} {} ...",
        entry.fstype,
        entry.device,
        entry.mount,
        args.join(" ")
    );
    let output = command::run(tool, &arg_refs)?;
    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    if is_benign_grow_output(&combined) {
        println!("... nothing to do.");
        return Ok(());
    }
    print!("{combined}");
    if !output.status.success() {
        return Err(GrowError::tool(tool, combined.trim().to_string()));
    }
    Ok(())
}

pub fn is_benign_grow_output(output: &str) -> bool {
    output.contains(NOTHING_TO_DO_MARKER)
}
