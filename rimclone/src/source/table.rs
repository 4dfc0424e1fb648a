// SPDX-License-Identifier: MIT

/// One primary entry of a DOS partition table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub start_sector: u64,
    /// `None` runs the partition to the end of the disk.
    pub size_sectors: Option<u64>,
    pub part_type: String,
}

/// DOS partition table to write onto a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTable {
    pub disk_id: Option<String>,
    pub entries: Vec<TableEntry>,
}
