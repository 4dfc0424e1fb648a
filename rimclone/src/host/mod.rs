// SPDX-License-Identifier: MIT

//! Everything that touches a real device goes through [`BlockHost`].
//!
//! The engine only sees this trait; [`LinuxHost`] binds it to util-linux,
//! e2fsprogs and fsarchiver, and the integration tests bind it to an
//! in-memory fake.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::source::{FsFootprint, PartitionInfo, PartitionTable};

pub mod cmd_builder;
pub mod linux;
pub mod parse;

#[macro_use]
mod macros;

pub use cmd_builder::*;
pub use linux::LinuxHost;

/// Outcome of a best-effort operation that succeeded.
///
/// `NotApplicable` means there was nothing to do (no mounted filesystem, no
/// signature to erase). It is not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Done,
    NotApplicable,
}

pub trait BlockHost: Send + Sync {
    /// Names of top-level block devices (`sda`, `mmcblk0`, ...).
    fn list_block_devices(&self) -> anyhow::Result<BTreeSet<String>>;

    /// Disk holding `device`, or `None` when `device` is a disk itself.
    fn parent_disk(&self, device: &Path) -> anyhow::Result<Option<String>>;

    fn partitions_of(&self, device: &Path) -> anyhow::Result<Vec<PartitionInfo>>;

    fn capacity_bytes(&self, device: &Path) -> anyhow::Result<u64>;

    fn fs_footprint(&self, partition: &Path) -> anyhow::Result<FsFootprint>;

    /// DOS disk identifier (`0x1a2b3c4d`), if the disk has one.
    fn disk_identifier(&self, device: &Path) -> anyhow::Result<Option<String>>;

    fn write_partition_table(&self, device: &Path, table: &PartitionTable) -> anyhow::Result<()>;

    /// Extends partition `index` to the end of the disk. Other entries are left untouched.
    fn grow_partition(&self, device: &Path, index: u32) -> anyhow::Result<()>;

    fn erase_signatures(&self, device: &Path) -> anyhow::Result<Effect>;

    /// Makes the kernel re-read the table of `device` and waits for udev.
    fn settle_device_nodes(&self, device: &Path) -> anyhow::Result<()>;

    fn unmount_all(&self, device: &Path) -> anyhow::Result<Effect>;

    fn node_exists(&self, node: &Path) -> bool {
        node.exists()
    }

    fn copy_blocks(&self, src: &Path, dst: &Path) -> anyhow::Result<()>;

    fn restore_filesystem(&self, src: &Path, dst: &Path) -> anyhow::Result<()>;

    fn grow_filesystem(&self, partition: &Path) -> anyhow::Result<()>;

    fn flush_buffers(&self, device: &Path) -> anyhow::Result<()>;

    fn sync(&self) -> anyhow::Result<()>;

    /// Attaches an image file with partition scanning, returns the loop node.
    fn attach_image(&self, image: &Path) -> anyhow::Result<PathBuf>;

    fn detach_image(&self, loop_device: &Path) -> anyhow::Result<()>;
}
