mod command;
mod error;
mod filesystem;
mod identity;
mod lvm;
mod partition;
mod pipeline;
mod sfdisk;
mod sysfs;

use clap::Parser;
use colored::Colorize;

use crate::error::{GrowError, Result};
use crate::pipeline::GrowConfig;

/// Grow the last partition of an externally enlarged disk, then any LVM
/// volumes and the filesystem on top of it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Device to enlarge; defaults to the only eligible disk when unambiguous
    #[arg(short, long)]
    device: Option<String>,

    /// Print what would be done without making changes
    #[arg(long)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => println!("{}", "Success.".green()),
        Err(e) => {
            eprintln!("{} {e}", "error:".red());
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let device = resolve_device(cli.device)?;
    let cfg = GrowConfig {
        device,
        dry_run: cli.dry_run,
        verbose: cli.verbose,
    };
    pipeline::run(&cfg)
}

/// Turn the --device argument (or its absence) into a full device path.
fn resolve_device(arg: Option<String>) -> Result<String> {
    let name = match arg {
        Some(device) => device,
        None => {
            let mut names = sysfs::eligible_disk_names()?;
            match names.len() {
                0 => return Err(GrowError::Config("no block devices found".to_string())),
                1 => names.remove(0),
                _ => {
                    return Err(GrowError::Config(format!(
                        "no --device given and it's ambiguous which disk to grow: {names:?}"
                    )));
                }
            }
        }
    };
    Ok(if name.contains('/') {
        name
    } else {
        format!("/dev/{name}")
    })
}
