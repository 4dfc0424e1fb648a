// SPDX-License-Identifier: MIT

use std::path::Path;

use crate::host::BlockHost;
use crate::source::{
    CloneError, DEFAULT_BOOT_TYPE, FsFamily, FsFootprint, LayoutError, PartitionInfo, SECTOR_SIZE,
    SourceDescriptor,
};

#[derive(Debug, Clone, Copy)]
pub struct AnalyzeOptions {
    pub preserve_disk_id: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            preserve_disk_id: true,
        }
    }
}

/// Reads the layout of `device` and sizes its root filesystem.
///
/// Read-only: nothing is mounted or written on the source.
pub fn analyze<H: BlockHost + ?Sized>(
    host: &H,
    device: &Path,
    opts: AnalyzeOptions,
) -> Result<SourceDescriptor, CloneError> {
    let parts = host
        .partitions_of(device)
        .map_err(|e| LayoutError::Enumerate(format!("{e:#}")))?;

    let boot = pick_one(&parts, FsFamily::Fat)?;
    let root = pick_one(&parts, FsFamily::Ext)?;
    if parts.len() > 2 {
        return Err(LayoutError::TooManyPartitions(parts.len()).into());
    }
    if root.start_sector < boot.end_sector() {
        return Err(LayoutError::Overlap {
            boot_end: boot.end_sector(),
            root_start: root.start_sector,
        }
        .into());
    }

    let root_node = root.node();
    let footprint = host
        .fs_footprint(&root_node)
        .map_err(|e| CloneError::Sizing {
            partition: root_node.display().to_string(),
            reason: format!("{e:#}"),
        })?;
    if footprint.block_size == 0 || footprint.min_blocks == 0 {
        return Err(CloneError::Sizing {
            partition: root_node.display().to_string(),
            reason: format!(
                "implausible estimate ({} blocks of {} bytes)",
                footprint.min_blocks, footprint.block_size
            ),
        });
    }

    let (min_filesystem_bytes, required_total_bytes) =
        required_bytes(root.start_sector, &footprint).ok_or_else(|| CloneError::Sizing {
            partition: root_node.display().to_string(),
            reason: format!(
                "estimate overflows ({} blocks of {} bytes at sector {})",
                footprint.min_blocks, footprint.block_size, root.start_sector
            ),
        })?;

    let disk_id = if opts.preserve_disk_id {
        host.disk_identifier(device).unwrap_or_else(|e| {
            crate::log_verbose!("No disk identifier on {}: {e:#}", device.display());
            None
        })
    } else {
        None
    };

    crate::log_verbose!(
        "Root footprint: {} blocks of {} bytes",
        footprint.min_blocks,
        footprint.block_size
    );

    Ok(SourceDescriptor {
        device: device.to_path_buf(),
        boot_partition: boot.node(),
        root_partition: root_node,
        boot_start_sector: boot.start_sector,
        boot_size_sectors: boot.size_sectors,
        boot_type: boot
            .part_type
            .clone()
            .unwrap_or_else(|| DEFAULT_BOOT_TYPE.to_string()),
        root_start_sector: root.start_sector,
        root_fs_type: root.fs_type.clone(),
        footprint,
        min_filesystem_bytes,
        required_total_bytes,
        disk_id,
    })
}

/// Filesystem bytes and the capacity floor, `None` on overflow.
fn required_bytes(root_start: u64, footprint: &FsFootprint) -> Option<(u64, u64)> {
    let fs_bytes = footprint.bytes()?;
    let total = root_start.checked_mul(SECTOR_SIZE)?.checked_add(fs_bytes)?;
    Some((fs_bytes, total))
}

fn pick_one(parts: &[PartitionInfo], family: FsFamily) -> Result<&PartitionInfo, LayoutError> {
    let found: Vec<&PartitionInfo> = parts.iter().filter(|p| p.family() == family).collect();
    match found.as_slice() {
        [] => Err(LayoutError::Missing(family)),
        [one] => Ok(*one),
        many => Err(LayoutError::Ambiguous(
            family,
            many.iter().map(|p| p.name.clone()).collect(),
        )),
    }
}
