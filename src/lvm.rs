//! LVM growth: resize the physical volume on the grown partition, then
//! extend every logical volume in its group.

use crate::command;
use crate::error::{GrowError, Result};
use crate::pipeline::GrowConfig;
use crate::sysfs;

/// lvextend prints this when the LV already spans all free extents.
const LV_AT_MAX_MARKER: &str = "matches existing size";

/// One record of `pvdisplay -c` / `lvdisplay -c` output: colon-delimited,
/// device path first, volume group second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRecord {
    pub device: String,
    pub group: String,
}

pub fn parse_colon_records(output: &str) -> Vec<VolumeRecord> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.trim().split(':');
            let device = fields.next()?;
            let group = fields.next()?;
            if device.is_empty() {
                return None;
            }
            Some(VolumeRecord {
                device: device.to_string(),
                group: group.to_string(),
            })
        })
        .collect()
}

/// What the LVM stage hands to the filesystem stage: the volume group that
/// was grown (if any) and the LV device paths belonging to it.
#[derive(Debug, Default)]
pub struct LvmOutcome {
    pub group: Option<String>,
    pub lv_devices: Vec<String>,
}

/// Extend the LVM structures sitting on `part_dev`, if there are any.
pub fn grow(cfg: &GrowConfig, part_dev: &str) -> Result<LvmOutcome> {
    if !sysfs::has_device_mapper_devices()? {
        println!("No LVM LVs found; skipping PV resize");
        return Ok(LvmOutcome::default());
    }

    let listing = command::run_checked("pvdisplay", &["-c"])?;
    let Some(pv) = parse_colon_records(&listing)
        .into_iter()
        .find(|record| record.device == part_dev)
    else {
        println!("No LVM PV found on {part_dev}; not resized");
        return Ok(LvmOutcome::default());
    };

    if cfg.dry_run {
        println!("[dry-run] would've run pvresize {part_dev}");
    } else {
        let output = command::run_checked("pvresize", &[part_dev])?;
        println!("LVM PV {part_dev} resized: {}", output.trim());
    }

    let listing = command::run_checked("lvdisplay", &["-c"])?;
    let mut lv_devices = Vec::new();
    for record in parse_colon_records(&listing) {
        if record.group != pv.group {
            continue;
        }
        // Collected in dry-run mode too, so the filesystem stage can still
        // report what it would match.
        lv_devices.push(record.device.clone());
        if cfg.dry_run {
            println!("[dry-run] would've run lvextend -l +100%FREE {}", record.device);
        } else {
            extend_lv(&record.device)?;
        }
    }

    Ok(LvmOutcome {
        group: Some(pv.group),
        lv_devices,
    })
}

/// Extend one LV to consume all free extents in its group. An LV that is
/// already at maximum size is a benign no-op, not a failure.
fn extend_lv(lv_device: &str) -> Result<()> {
    let output = command::run("lvextend", &["-l", "+100%FREE", lv_device])?;
    if output.status.success() {
        println!("ran lvextend -l +100%FREE {lv_device}");
        return Ok(());
    }
    let stderr = command::stderr_text(&output);
    if is_benign_lv_extend_error(&stderr) {
        println!("lvextend -l +100%FREE {lv_device}: no change; already at max size");
        Ok(())
    } else {
        Err(GrowError::tool("lvextend", stderr))
    }
}

pub fn is_benign_lv_extend_error(stderr: &str) -> bool {
    stderr.contains(LV_AT_MAX_MARKER)
}
