//! Last-partition extension: the safety policy, the arithmetic and the
//! sfdisk rewrite.

use std::io::Write;
use std::process::{Command, Stdio};

use crate::command;
use crate::error::{GrowError, Result};
use crate::pipeline::GrowConfig;
use crate::sfdisk::{PartitionEntry, PartitionTable};
use crate::sysfs;

const LVM_GPT_TYPE: &str = "E6D6D379-F507-44C2-A23C-238F2A3DF928";
const ROOT_X86_64_GPT_TYPE: &str = "4F68BCE3-E8CD-4DB1-96E7-FBCAF984B709";
const LINUX_MBR_TYPE: &str = "83";

/// Assumed sector size in bytes. sfdisk dumps count in sectors and the 1 MiB
/// end reserve is converted at this size. Disks with larger hardware sectors
/// are untested; /sys/block/<dev>/queue/hw_sector_size would tell.
pub const SECTOR_SIZE: u64 = 512;

/// Slack deliberately left unallocated at the end of the disk, for the GPT
/// backup header and boot loaders.
const END_RESERVE_SECTORS: u64 = (1 << 20) / SECTOR_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Mbr,
    Gpt,
}

/// Outcome of planning against the current table. On `Grow` the table has
/// already been mutated and is ready to render.
#[derive(Debug, PartialEq, Eq)]
pub enum Extension {
    AtMaxSize { device: String },
    Grow { device: String, sectors: u64 },
}

fn label_kind(table: &PartitionTable, disk: &str) -> Result<Label> {
    match table.meta("label") {
        Some("dos") => Ok(Label::Mbr),
        Some("gpt") => Ok(Label::Gpt),
        // Other labels might work, but refuse as a precaution. Untested.
        other => Err(GrowError::Format(format!(
            "unsupported partition table type {:?} on {disk}",
            other.unwrap_or("")
        ))),
    }
}

/// Refuse to touch partition types we cannot recognize; guessing at foreign
/// structures risks corrupting them.
fn check_partition_type(label: Label, entry: &PartitionEntry) -> Result<()> {
    let ptype = entry.type_code().unwrap_or("");
    let known = match label {
        Label::Gpt => ptype == LVM_GPT_TYPE || ptype == ROOT_X86_64_GPT_TYPE,
        Label::Mbr => ptype == LINUX_MBR_TYPE,
    };
    if known {
        Ok(())
    } else {
        let kind = match label {
            Label::Gpt => "GPT",
            Label::Mbr => "MBR",
        };
        Err(GrowError::Format(format!(
            "unknown {kind} partition type {ptype:?} for {}",
            entry.device
        )))
    }
}

/// Decide whether the last partition can grow and, if so, mutate the table:
/// bump its `size=` in place and drop the now-stale `last-lba` metadata
/// (sfdisk rejects a table whose total extent contradicts the new size).
pub fn apply_extension(
    table: &mut PartitionTable,
    total_sectors: u64,
    disk: &str,
) -> Result<Extension> {
    let Some(last) = table.entries.last() else {
        return Err(GrowError::Format(format!("device {disk:?} has no partitions")));
    };
    let label = label_kind(table, disk)?;
    check_partition_type(label, last)?;

    let device = last.device.clone();
    let (start, size) = (last.start()?, last.size()?);
    let end = start + size;
    let remaining = total_sectors.saturating_sub(end);
    if remaining <= END_RESERVE_SECTORS {
        return Ok(Extension::AtMaxSize { device });
    }

    let sectors = remaining - END_RESERVE_SECTORS;
    if let Some(last) = table.entries.last_mut() {
        last.set_size(size + sectors)?;
    }
    table.remove_meta("last-lba");
    Ok(Extension::Grow { device, sectors })
}

/// Grow the last partition of the configured device. Returns the partition's
/// device path for the later stages whether or not a resize happened.
pub fn grow(cfg: &GrowConfig) -> Result<String> {
    let dump = command::run_checked("sfdisk", &["-d", &cfg.device])?;
    let mut table = PartitionTable::parse(&dump)?;
    if cfg.verbose {
        println!("Current partition table:");
        print!("{}", table.render());
    }

    let total = sysfs::device_sectors(&cfg.device)?;
    if cfg.verbose && let Some(last) = table.entries.last() {
        let (start, size) = (last.start()?, last.size()?);
        println!("Total sectors: {total}");
        println!("Last partition start: {start}");
        println!("Last partition size: {size}");
        println!(
            "Remaining after last partition: {}",
            total.saturating_sub(start + size)
        );
    }

    match apply_extension(&mut table, total, &cfg.device)? {
        Extension::AtMaxSize { device } => {
            println!("Partition {device} is at max size; no need to extend.");
            Ok(device)
        }
        Extension::Grow { device, sectors } => {
            let bytes = sectors * SECTOR_SIZE;
            println!(
                "Need to extend {device} by {sectors} sectors ({bytes} bytes, {:.3} GiB)",
                bytes as f64 / (1u64 << 30) as f64
            );
            let rendered = table.render();
            println!("New partition table to write:");
            print!("{rendered}");
            if cfg.dry_run {
                println!(
                    "[dry-run] would've run sfdisk -f --no-reread --no-tell-kernel {}",
                    cfg.device
                );
                return Ok(device);
            }
            println!("Setting new partition table...");
            write_partition_table(&cfg.device, &rendered)?;
            reread_partitions()?;
            Ok(device)
        }
    }
}

/// Feed the rendered table to sfdisk on stdin. The kernel re-read is
/// suppressed here; `partprobe` follows as an explicit step so later stages
/// see the new layout.
fn write_partition_table(device: &str, table: &str) -> Result<()> {
    let mut child = Command::new("sfdisk")
        .args(["-f", "--no-reread", "--no-tell-kernel", device])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| GrowError::tool("sfdisk", format!("failed to execute: {e}")))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(table.as_bytes())?;
    }
    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(GrowError::tool("sfdisk", command::stderr_text(&output)));
    }
    Ok(())
}

fn reread_partitions() -> Result<()> {
    match command::run("partprobe", &[]) {
        Ok(output) if output.status.success() => Ok(()),
        Ok(output) => Err(GrowError::tool("partprobe", command::stderr_text(&output))),
        Err(e) => {
            if which::which("partprobe").is_err() {
                Err(GrowError::tool(
                    "partprobe",
                    "not found; install the parted package",
                ))
            } else {
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GPT_DUMP: &str = "\
label: gpt
label-id: 841DBE6B-6A8D-43E1-93E1-D765373DDE3B
device: /dev/sda
unit: sectors
first-lba: 34
last-lba: 10485726

/dev/sda1 : start=2048, size=192512, type=21686148-6449-6E6F-744E-656564454649
/dev/sda2 : start=194560, size=391168, type=0FC63DAF-8483-4772-8E79-3D69D8477DE4
/dev/sda3 : start=585728, size=9897984, type=E6D6D379-F507-44C2-A23C-238F2A3DF928
";

    const DOS_DUMP: &str = "\
label: dos
label-id: 0x877f0a6b
device: /dev/sda
unit: sectors

/dev/sda1 : start=2048, size=497664, type=83, bootable
/dev/sda2 : start=501758, size=314068994, type=5
/dev/sda5 : start=501760, size=314068992, type=83
";

    #[test]
    fn remaining_within_reserve_is_a_no_op() {
        // Last partition ends at 10483712; 2000 sectors remain, below the
        // 2048-sector (1 MiB) reserve.
        let mut table = PartitionTable::parse(GPT_DUMP).unwrap();
        let outcome = apply_extension(&mut table, 10483712 + 2000, "/dev/sda").unwrap();
        assert_eq!(
            outcome,
            Extension::AtMaxSize {
                device: "/dev/sda3".to_string()
            }
        );
        // Nothing was touched, last-lba included.
        assert_eq!(table.render(), GPT_DUMP);
    }

    #[test]
    fn extension_math_leaves_the_reserve() {
        // end = 501760 + 314068992, remaining = 400000, reserve = 2048.
        let mut table = PartitionTable::parse(DOS_DUMP).unwrap();
        let total = 501760 + 314068992 + 400000;
        let outcome = apply_extension(&mut table, total, "/dev/sda").unwrap();
        assert_eq!(
            outcome,
            Extension::Grow {
                device: "/dev/sda5".to_string(),
                sectors: 397952
            }
        );
        let last = table.entries.last().unwrap();
        assert_eq!(last.size().unwrap(), 314466944);
        // Earlier entries keep their sizes.
        assert_eq!(table.entries[0].size().unwrap(), 497664);
    }

    #[test]
    fn growing_drops_stale_last_lba() {
        let mut table = PartitionTable::parse(GPT_DUMP).unwrap();
        let outcome = apply_extension(&mut table, 10483712 + 400000, "/dev/sda").unwrap();
        assert_eq!(
            outcome,
            Extension::Grow {
                device: "/dev/sda3".to_string(),
                sectors: 397952
            }
        );
        assert_eq!(table.meta("last-lba"), None);
        assert_eq!(table.meta("first-lba"), Some("34"));
    }

    #[test]
    fn accepts_root_gpt_type() {
        let dump = "\
label: gpt

/dev/vda1 : start=2048, size=1000000, type=4F68BCE3-E8CD-4DB1-96E7-FBCAF984B709
";
        let mut table = PartitionTable::parse(dump).unwrap();
        assert!(apply_extension(&mut table, 2_000_000, "/dev/vda").is_ok());
    }

    #[test]
    fn rejects_unknown_gpt_type() {
        let dump = "\
label: gpt

/dev/sda1 : start=2048, size=1000000, type=00000000-0000-0000-0000-000000000000
";
        let mut table = PartitionTable::parse(dump).unwrap();
        let err = apply_extension(&mut table, 2_000_000, "/dev/sda").unwrap_err();
        assert!(err.to_string().contains("unknown GPT partition type"));
    }

    #[test]
    fn rejects_unknown_mbr_type() {
        let dump = "\
label: dos

/dev/sda1 : start=2048, size=1000000, type=82
";
        let mut table = PartitionTable::parse(dump).unwrap();
        let err = apply_extension(&mut table, 2_000_000, "/dev/sda").unwrap_err();
        assert!(err.to_string().contains("unknown MBR partition type"));
    }

    #[test]
    fn rejects_unsupported_label() {
        let dump = "\
label: sun

/dev/sda1 : start=2048, size=1000000, type=83
";
        let mut table = PartitionTable::parse(dump).unwrap();
        let err = apply_extension(&mut table, 2_000_000, "/dev/sda").unwrap_err();
        assert!(err.to_string().contains("unsupported partition table type"));
    }

    #[test]
    fn empty_table_is_fatal() {
        let mut table = PartitionTable::parse("label: gpt\nunit: sectors\n").unwrap();
        let err = apply_extension(&mut table, 2_000_000, "/dev/sda").unwrap_err();
        assert!(err.to_string().contains("has no partitions"));
    }

    #[test]
    fn shrunk_device_reports_max_size() {
        // total below the partition end must not underflow; it reads as
        // nothing remaining.
        let mut table = PartitionTable::parse(GPT_DUMP).unwrap();
        let outcome = apply_extension(&mut table, 1_000_000, "/dev/sda").unwrap();
        assert!(matches!(outcome, Extension::AtMaxSize { .. }));
    }
}
