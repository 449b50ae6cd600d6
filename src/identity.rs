//! Device identity comparison.
//!
//! A device can be named by several path spellings (a symlink under
//! `/dev/mapper` and its `/dev/dm-*` target, for instance). Equality has to
//! be decided at the inode level, never by comparing the strings.

use std::collections::HashSet;

use nix::sys::stat::stat;

use crate::error::{GrowError, Result};

/// Identity of the file a path resolves to, as a `(st_dev, st_ino)` pair
/// from a symlink-following `stat(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    dev: u64,
    ino: u64,
}

impl DeviceIdentity {
    pub fn of(path: &str) -> Result<Self> {
        let st = stat(path).map_err(|errno| GrowError::Stat {
            path: path.to_string(),
            source: std::io::Error::from(errno),
        })?;
        Ok(DeviceIdentity {
            dev: st.st_dev as u64,
            ino: st.st_ino as u64,
        })
    }
}

/// The set of devices grown so far; mount sources are matched against it.
#[derive(Debug, Default)]
pub struct IdentitySet(HashSet<DeviceIdentity>);

impl IdentitySet {
    pub fn add_path(&mut self, path: &str) -> Result<()> {
        self.0.insert(DeviceIdentity::of(path)?);
        Ok(())
    }

    pub fn contains(&self, identity: &DeviceIdentity) -> bool {
        self.0.contains(identity)
    }
}
