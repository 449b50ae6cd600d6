//! `/sys/block` queries: eligible disks, device-mapper presence and raw
//! device capacity.

use std::fs;
use std::path::Path;

use crate::error::{GrowError, Result};

const SYS_BLOCK: &str = "/sys/block";

/// Disk names that make sense as a grow target: everything under
/// `/sys/block` except optical drives and device-mapper nodes.
pub fn eligible_disk_names() -> Result<Vec<String>> {
    eligible_disk_names_in(Path::new(SYS_BLOCK))
}

fn eligible_disk_names_in(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for name in block_names(dir)? {
        if name == "sr0" || name.starts_with("dm-") {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

/// Whether any device-mapper block device exists. No `dm-*` nodes means no
/// LVM is in use at all.
pub fn has_device_mapper_devices() -> Result<bool> {
    any_device_mapper_in(Path::new(SYS_BLOCK))
}

fn any_device_mapper_in(dir: &Path) -> Result<bool> {
    Ok(block_names(dir)?.iter().any(|n| n.starts_with("dm-")))
}

fn block_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

/// Total capacity of a device in 512-byte sectors, from
/// `/sys/block/<name>/size`.
pub fn device_sectors(device: &str) -> Result<u64> {
    let name = device.rsplit('/').next().unwrap_or(device);
    read_sector_count(&Path::new(SYS_BLOCK).join(name).join("size"))
}

fn read_sector_count(path: &Path) -> Result<u64> {
    let text = fs::read_to_string(path)
        .map_err(|e| GrowError::Sysfs(format!("cannot read {}: {e}", path.display())))?;
    text.trim().parse().map_err(|_| {
        GrowError::Sysfs(format!(
            "{} is not a sector count: {:?}",
            path.display(),
            text.trim()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sys_block(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        dir
    }

    #[test]
    fn skips_optical_and_mapper_devices() {
        let dir = fake_sys_block(&["sda", "sr0", "dm-0", "vdb"]);
        let names = eligible_disk_names_in(dir.path()).unwrap();
        assert_eq!(names, vec!["sda", "vdb"]);
    }

    #[test]
    fn detects_device_mapper_presence() {
        let with = fake_sys_block(&["sda", "dm-0"]);
        let without = fake_sys_block(&["sda"]);
        assert!(any_device_mapper_in(with.path()).unwrap());
        assert!(!any_device_mapper_in(without.path()).unwrap());
    }

    #[test]
    fn reads_sector_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("size");
        fs::write(&path, "335544320\n").unwrap();
        assert_eq!(read_sector_count(&path).unwrap(), 335544320);

        fs::write(&path, "not a number\n").unwrap();
        assert!(read_sector_count(&path).is_err());
    }
}
