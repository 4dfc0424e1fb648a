// SPDX-License-Identifier: MIT

//! Parsers for the text the host tools print.

use anyhow::Context;
use serde::Deserialize;
use std::collections::BTreeSet;

use crate::source::{PartitionInfo, SECTOR_SIZE};

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    fstype: Option<String>,
    start: Option<NumField>,
    size: Option<NumField>,
    parttype: Option<String>,
    #[serde(default)]
    children: Vec<LsblkDevice>,
}

/// lsblk prints numbers as JSON numbers on recent util-linux, as strings on older ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumField {
    Num(u64),
    Str(String),
}

impl NumField {
    fn value(&self, what: &str, dev: &str) -> anyhow::Result<u64> {
        match self {
            NumField::Num(n) => Ok(*n),
            NumField::Str(s) => s
                .trim()
                .parse()
                .with_context(|| format!("lsblk: bad {what} '{s}' for {dev}")),
        }
    }
}

/// Partitions under the devices of an `lsblk -J -b` listing.
pub fn lsblk_partitions(json: &str) -> anyhow::Result<Vec<PartitionInfo>> {
    let out: LsblkOutput = serde_json::from_str(json).context("lsblk: invalid JSON")?;
    let mut parts = Vec::new();
    for dev in &out.blockdevices {
        collect_partitions(dev, &mut parts)?;
    }
    Ok(parts)
}

fn collect_partitions(dev: &LsblkDevice, parts: &mut Vec<PartitionInfo>) -> anyhow::Result<()> {
    if dev.kind.as_deref() == Some("part") {
        let start = dev
            .start
            .as_ref()
            .with_context(|| format!("lsblk did not report START for {}", dev.name))?
            .value("START", &dev.name)?;
        let size = dev
            .size
            .as_ref()
            .with_context(|| format!("lsblk did not report SIZE for {}", dev.name))?
            .value("SIZE", &dev.name)?;
        parts.push(PartitionInfo {
            name: dev.name.clone(),
            fs_type: dev.fstype.clone().unwrap_or_default(),
            start_sector: start,
            size_sectors: size / SECTOR_SIZE,
            part_type: dev.parttype.as_deref().and_then(mbr_type_code),
        });
    }
    for child in &dev.children {
        collect_partitions(child, parts)?;
    }
    Ok(())
}

/// `0xc` -> `c`. GPT type GUIDs have no DOS equivalent and yield `None`.
pub fn mbr_type_code(parttype: &str) -> Option<String> {
    let code = parttype.trim().trim_start_matches("0x");
    if code.is_empty() || code.len() > 2 || !code.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(code.to_ascii_lowercase())
}

pub fn device_names(out: &str) -> BTreeSet<String> {
    out.split_whitespace().map(str::to_string).collect()
}

pub fn first_line(out: &str) -> Option<String> {
    out.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

pub fn size_bytes(out: &str) -> anyhow::Result<u64> {
    let s = out.trim();
    s.parse()
        .with_context(|| format!("blockdev: unexpected size '{s}'"))
}

/// `Block size:               4096` from `dumpe2fs -h`.
pub fn dumpe2fs_block_size(out: &str) -> anyhow::Result<u64> {
    let line = out
        .lines()
        .find(|l| l.trim_start().starts_with("Block size:"))
        .context("dumpe2fs: no 'Block size' line")?;
    let value = line.split(':').nth(1).unwrap_or("").trim();
    value
        .parse()
        .with_context(|| format!("dumpe2fs: bad block size '{value}'"))
}

/// `Estimated minimum size of the filesystem: 123456` from `resize2fs -P`.
pub fn resize2fs_min_blocks(out: &str) -> anyhow::Result<u64> {
    let line = out
        .lines()
        .find(|l| l.contains("minimum size"))
        .context("resize2fs: no minimum size estimate")?;
    let value = line.split_whitespace().last().unwrap_or("");
    value
        .parse()
        .with_context(|| format!("resize2fs: bad block count '{value}'"))
}

/// DOS disk ids only; a GPT disk GUID cannot be written into a dos label.
pub fn dos_disk_id(out: &str) -> Option<String> {
    let id = out.trim().to_ascii_lowercase();
    let hex = id.strip_prefix("0x")?;
    if hex.is_empty() || hex.len() > 8 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(id)
}

/// Mount points (most recent first) of `disk` and its partitions, from `/proc/self/mounts`.
pub fn mounts_of(mounts: &str, disk: &str) -> Vec<String> {
    let mut points = Vec::new();
    for line in mounts.lines() {
        let mut fields = line.split_whitespace();
        let (Some(device), Some(point)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Some(name) = device.strip_prefix("/dev/") else {
            continue;
        };
        if belongs_to(name, disk) {
            points.push(unescape_mount(point));
        }
    }
    points.reverse();
    points
}

/// `sdb1` belongs to `sdb`, `mmcblk0p2` to `mmcblk0`; `sdba` does not belong to `sdb`.
pub fn belongs_to(name: &str, disk: &str) -> bool {
    let Some(rest) = name.strip_prefix(disk) else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }
    let digits = if disk.ends_with(|c: char| c.is_ascii_digit()) {
        match rest.strip_prefix('p') {
            Some(d) => d,
            None => return false,
        }
    } else {
        rest
    };
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn unescape_mount(value: &str) -> String {
    value
        .replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}
