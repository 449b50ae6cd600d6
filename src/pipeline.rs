//! Stage sequencing for one grow run.
//!
//! Order is load-bearing: the filesystem can only see new space after the
//! LVM layer grew, which can only see it after the partition was rewritten
//! and the kernel re-probed it.

use crate::error::Result;
use crate::{filesystem, lvm, partition};

/// Settings for one run, passed explicitly instead of living in globals.
#[derive(Debug, Clone)]
pub struct GrowConfig {
    /// Whole-disk device path, e.g. `/dev/sda`.
    pub device: String,
    pub dry_run: bool,
    pub verbose: bool,
}

/// Run partition -> LVM -> filesystem, threading each stage's output into
/// the next. Any error aborts the run; completed destructive steps are not
/// rolled back.
pub fn run(cfg: &GrowConfig) -> Result<()> {
    let part_dev = partition::grow(cfg)?;
    let lvm = lvm::grow(cfg, &part_dev)?;
    if cfg.verbose && let Some(group) = &lvm.group {
        println!("Volume group {group} holds {} LV(s)", lvm.lv_devices.len());
    }
    filesystem::grow(cfg, &part_dev, &lvm.lv_devices)?;
    Ok(())
}
