// SPDX-License-Identifier: MIT

use std::path::{Path, PathBuf};

pub const SECTOR_SIZE: u64 = 512;

/// MBR type written for the boot partition when the source does not report one.
pub const DEFAULT_BOOT_TYPE: &str = "c";
pub const LINUX_TYPE: &str = "83";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsFamily {
    Fat,
    Ext,
    Other,
}

impl FsFamily {
    pub fn from_fstype(fstype: &str) -> Self {
        let t = fstype.trim().to_ascii_lowercase();
        match t.as_str() {
            "vfat" | "fat" | "fat12" | "fat16" | "fat32" | "msdos" => FsFamily::Fat,
            _ if t.starts_with("ext") => FsFamily::Ext,
            _ => FsFamily::Other,
        }
    }
}

impl core::fmt::Display for FsFamily {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            FsFamily::Fat => "FAT (boot)",
            FsFamily::Ext => "ext (root)",
            FsFamily::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// One partition as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub name: String,
    pub fs_type: String,
    pub start_sector: u64,
    pub size_sectors: u64,
    /// MBR type code without the `0x` prefix, e.g. `c`.
    pub part_type: Option<String>,
}

impl PartitionInfo {
    pub fn family(&self) -> FsFamily {
        FsFamily::from_fstype(&self.fs_type)
    }

    /// First sector past the partition. Saturates on absurd geometry.
    pub fn end_sector(&self) -> u64 {
        self.start_sector.saturating_add(self.size_sectors)
    }

    pub fn node(&self) -> PathBuf {
        Path::new("/dev").join(&self.name)
    }
}

/// Shrink-to-fit estimate of a filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsFootprint {
    pub block_size: u64,
    pub min_blocks: u64,
}

impl FsFootprint {
    /// `None` when the estimate does not fit in a `u64`.
    pub fn bytes(&self) -> Option<u64> {
        self.block_size.checked_mul(self.min_blocks)
    }
}

/// Device node of partition `index` on `disk`.
///
/// Disks whose name ends in a digit (`mmcblk0`, `loop3`, `nvme0n1`) take a `p`
/// separator, the others (`sdb`) do not.
pub fn partition_node(disk: &Path, index: u32) -> PathBuf {
    let base = disk.as_os_str().to_string_lossy();
    let sep = if base.ends_with(|c: char| c.is_ascii_digit()) {
        "p"
    } else {
        ""
    };
    PathBuf::from(format!("{base}{sep}{index}"))
}

/// Short name of a device node: `/dev/sdb` -> `sdb`.
pub fn device_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_family_classification() {
        assert_eq!(FsFamily::from_fstype("vfat"), FsFamily::Fat);
        assert_eq!(FsFamily::from_fstype("FAT32"), FsFamily::Fat);
        assert_eq!(FsFamily::from_fstype("ext4"), FsFamily::Ext);
        assert_eq!(FsFamily::from_fstype("ext2"), FsFamily::Ext);
        assert_eq!(FsFamily::from_fstype("exfat"), FsFamily::Other);
        assert_eq!(FsFamily::from_fstype(""), FsFamily::Other);
    }

    #[test]
    fn test_partition_node_naming() {
        assert_eq!(partition_node(Path::new("/dev/sdb"), 1), PathBuf::from("/dev/sdb1"));
        assert_eq!(
            partition_node(Path::new("/dev/mmcblk0"), 2),
            PathBuf::from("/dev/mmcblk0p2")
        );
        assert_eq!(
            partition_node(Path::new("/dev/nvme0n1"), 1),
            PathBuf::from("/dev/nvme0n1p1")
        );
        assert_eq!(partition_node(Path::new("/dev/loop7"), 2), PathBuf::from("/dev/loop7p2"));
    }

    #[test]
    fn test_footprint_bytes() {
        let fp = FsFootprint {
            block_size: 4096,
            min_blocks: 10_240,
        };
        assert_eq!(fp.bytes(), Some(40 * 1024 * 1024));
    }

    #[test]
    fn test_device_name() {
        assert_eq!(device_name(Path::new("/dev/sdc")), "sdc");
    }
}
