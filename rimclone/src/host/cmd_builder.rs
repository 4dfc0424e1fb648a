// SPDX-License-Identifier: MIT

use std::fmt;
use std::path::Path;

use crate::source::{PartitionTable, SourceDescriptor, partition_node};

/// Tools needed to analyze a source and report on targets.
pub const PROBE_TOOLS: &[&str] = &["lsblk", "blkid", "blockdev", "dumpe2fs", "resize2fs", "sfdisk"];

/// Tools needed on top of [`PROBE_TOOLS`] to actually write targets.
pub const WRITE_TOOLS: &[&str] = &[
    "wipefs",
    "udevadm",
    "partprobe",
    "umount",
    "dd",
    "fsarchiver",
    "e2fsck",
    "sync",
];

pub const LOOP_TOOLS: &[&str] = &["losetup"];

#[cfg(feature = "host-tools")]
pub fn validate_binaries(tools: &[&str]) -> anyhow::Result<()> {
    let missing: Vec<_> = tools
        .iter()
        .copied()
        .filter(|b| which::which(b).is_err())
        .collect();

    if !missing.is_empty() {
        anyhow::bail!(
            "Missing required tool(s) not installed or not in PATH: {}",
            missing.join(", ")
        );
    }

    Ok(())
}

#[cfg(not(feature = "host-tools"))]
pub fn validate_binaries(_tools: &[&str]) -> anyhow::Result<()> {
    Ok(())
}

/// A fully built command line, optionally fed a script on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    pub program: &'static str,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    /// Exit codes that count as success.
    pub ok_codes: &'static [i32],
}

impl Cmd {
    fn new(program: &'static str, args: Vec<String>) -> Self {
        Self {
            program,
            args,
            stdin: None,
            ok_codes: &[0],
        }
    }

    fn with_stdin(mut self, input: String) -> Self {
        self.stdin = Some(input);
        self
    }

    fn accepting(mut self, codes: &'static [i32]) -> Self {
        self.ok_codes = codes;
        self
    }

    pub fn accepts(&self, code: Option<i32>) -> bool {
        code.is_some_and(|c| self.ok_codes.contains(&c))
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for a in &self.args {
            if a.contains(char::is_whitespace) {
                write!(f, " \"{a}\"")?;
            } else {
                write!(f, " {a}")?;
            }
        }
        if let Some(input) = &self.stdin {
            let oneline = input.trim_end().replace('\n', "\\n");
            write!(f, " <<< \"{oneline}\"")?;
        }
        Ok(())
    }
}

fn p(path: &Path) -> String {
    path.display().to_string()
}

pub fn list_devices() -> Cmd {
    Cmd::new("lsblk", crate::args!["-dn", "-o", "NAME"])
}

pub fn parent_disk(device: &Path) -> Cmd {
    Cmd::new("lsblk", crate::args!["-no", "PKNAME", p(device)])
}

pub fn list_partitions(device: &Path) -> Cmd {
    Cmd::new(
        "lsblk",
        crate::args!["-J", "-b", "-o", "NAME,TYPE,FSTYPE,START,SIZE,PARTTYPE", p(device)],
    )
}

pub fn probe_fstype(partition: &Path) -> Cmd {
    Cmd::new("blkid", crate::args!["-s", "TYPE", "-o", "value", p(partition)])
}

pub fn capacity(device: &Path) -> Cmd {
    Cmd::new("blockdev", crate::args!["--getsize64", p(device)])
}

pub fn superblock(partition: &Path) -> Cmd {
    Cmd::new("dumpe2fs", crate::args!["-h", p(partition)])
}

pub fn min_blocks(partition: &Path) -> Cmd {
    Cmd::new("resize2fs", crate::args!["-P", p(partition)])
}

pub fn disk_id(device: &Path) -> Cmd {
    Cmd::new("sfdisk", crate::args!["--disk-id", p(device)])
}

/// sfdisk input reproducing `table`.
pub fn sfdisk_script(table: &PartitionTable) -> String {
    let mut s = String::from("label: dos\n");
    if let Some(id) = &table.disk_id {
        s.push_str(&format!("label-id: {id}\n"));
    }
    s.push_str("unit: sectors\n\n");
    for e in &table.entries {
        match e.size_sectors {
            Some(size) => s.push_str(&format!(
                "start={}, size={}, type={}\n",
                e.start_sector, size, e.part_type
            )),
            None => s.push_str(&format!("start={}, type={}\n", e.start_sector, e.part_type)),
        }
    }
    s
}

pub fn write_table(device: &Path, table: &PartitionTable) -> Cmd {
    Cmd::new("sfdisk", crate::args!["--wipe", "always", p(device)]).with_stdin(sfdisk_script(table))
}

/// Rewrites only the size of entry `index`: keep start, take all free space.
pub fn grow_partition(device: &Path, index: u32) -> Cmd {
    Cmd::new("sfdisk", crate::args!["--no-reread", "-N", index, p(device)])
        .with_stdin(", +\n".to_string())
}

pub fn wipe(device: &Path) -> Cmd {
    Cmd::new("wipefs", crate::args!["-a", p(device)])
}

pub fn udev_settle() -> Cmd {
    Cmd::new("udevadm", crate::args!["settle"])
}

pub fn reread_table(device: &Path) -> Cmd {
    Cmd::new("partprobe", crate::args![p(device)])
}

pub fn umount(mountpoint: &str) -> Cmd {
    Cmd::new("umount", crate::args![mountpoint])
}

pub fn block_copy(src: &Path, dst: &Path) -> Cmd {
    Cmd::new(
        "dd",
        crate::args![
            format!("if={}", p(src)),
            format!("of={}", p(dst)),
            "bs=4M",
            "conv=fsync",
            "status=none"
        ],
    )
}

/// Streams the used blocks of `src` as an archive on stdout.
pub fn save_fs(src: &Path) -> Cmd {
    Cmd::new("fsarchiver", crate::args!["savefs", "-", p(src)])
}

/// Recreates the archived filesystem read from stdin onto `dst`.
pub fn restore_fs(dst: &Path) -> Cmd {
    Cmd::new("fsarchiver", crate::args!["restfs", "-", format!("id=0,dest={}", p(dst))])
}

/// e2fsck exits 1 when it corrected errors, which is still a usable filesystem.
pub fn check_fs(partition: &Path) -> Cmd {
    Cmd::new("e2fsck", crate::args!["-f", "-y", p(partition)]).accepting(&[0, 1])
}

pub fn resize_fs(partition: &Path) -> Cmd {
    Cmd::new("resize2fs", crate::args![p(partition)])
}

pub fn flush_buffers(device: &Path) -> Cmd {
    Cmd::new("blockdev", crate::args!["--flushbufs", p(device)])
}

pub fn sync() -> Cmd {
    Cmd::new("sync", vec![])
}

pub fn loop_attach(image: &Path) -> Cmd {
    Cmd::new("losetup", crate::args!["-fP", "--show", p(image)])
}

pub fn loop_detach(loop_device: &Path) -> Cmd {
    Cmd::new("losetup", crate::args!["-d", p(loop_device)])
}

/// Every command a real run would issue for one target, in order.
pub fn clone_plan(source: &SourceDescriptor, disk: &Path) -> Vec<Cmd> {
    let boot = partition_node(disk, 1);
    let root = partition_node(disk, 2);
    vec![
        wipe(disk),
        write_table(disk, &source.partition_table()),
        udev_settle(),
        reread_table(disk),
        block_copy(&source.boot_partition, &boot),
        save_fs(&source.root_partition),
        restore_fs(&root),
        grow_partition(disk, 2),
        udev_settle(),
        reread_table(disk),
        check_fs(&root),
        resize_fs(&root),
        flush_buffers(disk),
    ]
}
