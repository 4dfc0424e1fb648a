// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use crate::source::{FsFootprint, LINUX_TYPE, PartitionTable, SECTOR_SIZE, TableEntry};
use crate::utils;

/// What every target must reproduce, computed once from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub device: PathBuf,
    pub boot_partition: PathBuf,
    pub root_partition: PathBuf,
    pub boot_start_sector: u64,
    pub boot_size_sectors: u64,
    pub boot_type: String,
    pub root_start_sector: u64,
    pub root_fs_type: String,
    pub footprint: FsFootprint,
    pub min_filesystem_bytes: u64,
    /// Smallest capacity a target may have.
    pub required_total_bytes: u64,
    pub disk_id: Option<String>,
}

impl SourceDescriptor {
    /// Table written on every target: boot at the source geometry, root open-ended.
    pub fn partition_table(&self) -> PartitionTable {
        PartitionTable {
            disk_id: self.disk_id.clone(),
            entries: vec![
                TableEntry {
                    start_sector: self.boot_start_sector,
                    size_sectors: Some(self.boot_size_sectors),
                    part_type: self.boot_type.clone(),
                },
                TableEntry {
                    start_sector: self.root_start_sector,
                    size_sectors: None,
                    part_type: LINUX_TYPE.to_string(),
                },
            ],
        }
    }

    pub fn boot_bytes(&self) -> u64 {
        self.boot_size_sectors.saturating_mul(SECTOR_SIZE)
    }
}

impl core::fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "\n  Source: {}", self.device.display())?;
        writeln!(
            f,
            "  ┌────┬──────────────────────┬──────────┬──────────────┬────────────┬──────┐"
        )?;
        writeln!(
            f,
            "  | Id | Node                 | FS       | Start sector | Size       | Type |"
        )?;
        writeln!(
            f,
            "  ├────┼──────────────────────┼──────────┼──────────────┼────────────┼──────┤"
        )?;
        writeln!(
            f,
            "  | {:<2} | {:<20} | {:<8} | {:>12} | {:>10} | {:>4} |",
            1,
            self.boot_partition.display().to_string(),
            "fat",
            self.boot_start_sector,
            utils::pretty_bytes(self.boot_bytes()),
            self.boot_type,
        )?;
        writeln!(
            f,
            "  | {:<2} | {:<20} | {:<8} | {:>12} | {:>10} | {:>4} |",
            2,
            self.root_partition.display().to_string(),
            self.root_fs_type,
            self.root_start_sector,
            format!("≥{}", utils::pretty_bytes(self.min_filesystem_bytes)),
            LINUX_TYPE,
        )?;
        writeln!(
            f,
            "  └────┴──────────────────────┴──────────┴──────────────┴────────────┴──────┘"
        )?;
        write!(
            f,
            "  Required target capacity: {} ({})",
            utils::pretty_bytes(self.required_total_bytes),
            utils::decimal_gb(self.required_total_bytes)
        )
    }
}
