// SPDX-License-Identifier: MIT

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rimclone::fleet::{Operator, StopSignal};
use rimclone::host::{BlockHost, Effect};
use rimclone::source::{FsFootprint, PartitionInfo, PartitionTable};

pub const MIB: u64 = 1024 * 1024;

/// Source used by most tests: 64 MiB FAT boot at 1 MiB, ext4 root at 65 MiB
/// holding 40 MiB of live data. Required capacity is 105 MiB.
pub const SOURCE: &str = "mmcblk0";
pub const BOOT_START: u64 = 2048;
pub const BOOT_SECTORS: u64 = 64 * MIB / 512;
pub const ROOT_START: u64 = 65 * MIB / 512;
pub const BLOCK_SIZE: u64 = 4096;
pub const MIN_BLOCKS: u64 = 40 * MIB / 4096;
pub const REQUIRED: u64 = 105 * MIB;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Unmount(String),
    Wipe(String),
    WriteTable(String, PartitionTable),
    Settle(String),
    Copy(String, String),
    Restore(String, String),
    GrowPartition(String, u32),
    GrowFs(String),
    Flush(String),
    Sync,
    Attach(String),
    Detach(String),
}

impl Op {
    /// Device written by this operation, if any.
    pub fn written(&self) -> Option<&str> {
        match self {
            Op::Wipe(d)
            | Op::WriteTable(d, _)
            | Op::Copy(_, d)
            | Op::Restore(_, d)
            | Op::GrowPartition(d, _)
            | Op::GrowFs(d) => Some(d.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Event {
    Plug(String, u64),
    Unplug(String),
}

#[derive(Default)]
struct State {
    present: BTreeSet<String>,
    capacities: HashMap<String, u64>,
    partitions: HashMap<String, Vec<PartitionInfo>>,
    parents: HashMap<String, String>,
    footprint: Option<FsFootprint>,
    disk_id: Option<String>,
    /// (argument path, operation) -> error message.
    failures: HashMap<(String, &'static str), String>,
    missing_nodes: HashSet<String>,
    /// Copy destinations whose copy panics instead of failing.
    panics: HashSet<String>,
    mounted: HashSet<String>,
    events: Vec<(usize, Event)>,
    list_calls: usize,
    ops: Vec<Op>,
    tables: HashMap<String, PartitionTable>,
    fs_bytes: HashMap<String, u64>,
    content: HashMap<String, u64>,
}

/// In-memory [`BlockHost`]: devices are names with a capacity, writes are recorded.
pub struct FakeHost {
    state: Mutex<State>,
    copy_delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn p(path: &Path) -> String {
    path.display().to_string()
}

/// `/dev/sdc2` -> (`sdc`, 2), `/dev/mmcblk1p1` -> (`mmcblk1`, 1).
///
/// A bare `mmcblkN` disk would be read as a partition, so targets in these
/// tests are always `sdX` disks.
pub fn split_node(node: &str) -> (String, u32) {
    let name = node.trim_start_matches("/dev/");
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let (disk, index) = name.split_at(name.len() - digits);
    let disk = match disk.strip_suffix('p') {
        Some(d) if d.ends_with(|c: char| c.is_ascii_digit()) => d,
        _ => disk,
    };
    (disk.to_string(), index.parse().unwrap_or(0))
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            copy_delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// A host with `sda` (system disk) and the standard source attached.
    pub fn with_source() -> Self {
        let host = Self::new();
        host.plug_now("sda", 256 * 1024 * MIB);
        host.plug_now(SOURCE, 32 * 1024 * MIB);
        host.set_partitions(
            SOURCE,
            vec![
                part("mmcblk0p1", "vfat", BOOT_START, BOOT_SECTORS, Some("c")),
                part("mmcblk0p2", "ext4", ROOT_START, 60_000_000, Some("83")),
            ],
        );
        host.set_footprint(BLOCK_SIZE, MIN_BLOCKS);
        host.set_disk_id("0x1a2b3c4d");
        host
    }

    pub fn with_copy_delay(mut self, delay: Duration) -> Self {
        self.copy_delay = delay;
        self
    }

    fn st(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn plug_now(&self, name: &str, capacity: u64) {
        let mut st = self.st();
        st.present.insert(name.to_string());
        st.capacities.insert(name.to_string(), capacity);
    }

    /// Device appears on the `tick`-th enumeration (1-based, the baseline is call 1).
    pub fn plug_at(&self, tick: usize, name: &str, capacity: u64) {
        self.st()
            .events
            .push((tick, Event::Plug(name.to_string(), capacity)));
    }

    pub fn unplug_at(&self, tick: usize, name: &str) {
        self.st().events.push((tick, Event::Unplug(name.to_string())));
    }

    pub fn set_capacity(&self, name: &str, capacity: u64) {
        self.st().capacities.insert(name.to_string(), capacity);
    }

    pub fn set_partitions(&self, disk: &str, parts: Vec<PartitionInfo>) {
        self.st().partitions.insert(format!("/dev/{disk}"), parts);
    }

    pub fn set_parent(&self, partition: &str, disk: &str) {
        self.st()
            .parents
            .insert(format!("/dev/{partition}"), disk.to_string());
    }

    pub fn set_footprint(&self, block_size: u64, min_blocks: u64) {
        self.st().footprint = Some(FsFootprint {
            block_size,
            min_blocks,
        });
    }

    pub fn clear_footprint(&self) {
        self.st().footprint = None;
    }

    pub fn set_disk_id(&self, id: &str) {
        self.st().disk_id = Some(id.to_string());
    }

    pub fn fail(&self, path: &str, op: &'static str, message: &str) {
        self.st()
            .failures
            .insert((path.to_string(), op), message.to_string());
    }

    pub fn panic_on_copy(&self, dst: &str) {
        self.st().panics.insert(dst.to_string());
    }

    pub fn hide_node(&self, node: &str) {
        self.st().missing_nodes.insert(node.to_string());
    }

    pub fn mount(&self, disk: &str) {
        self.st().mounted.insert(format!("/dev/{disk}"));
    }

    pub fn ops(&self) -> Vec<Op> {
        self.st().ops.clone()
    }

    pub fn writes_to(&self, disk: &str) -> Vec<Op> {
        self.ops()
            .into_iter()
            .filter(|op| op.written().is_some_and(|d| split_node(d).0 == disk))
            .collect()
    }

    pub fn table_of(&self, disk: &str) -> Option<PartitionTable> {
        self.st().tables.get(&format!("/dev/{disk}")).cloned()
    }

    pub fn fs_bytes_of(&self, node: &str) -> Option<u64> {
        self.st().fs_bytes.get(node).copied()
    }

    /// Stand-in for a hash of the whole device content.
    pub fn content_hash(&self, disk: &str) -> u64 {
        self.st().content.get(disk).copied().unwrap_or(0)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn check(&self, path: &Path, op: &'static str) -> anyhow::Result<()> {
        if let Some(msg) = self.st().failures.get(&(p(path), op)) {
            anyhow::bail!("{msg}");
        }
        Ok(())
    }

    fn record(&self, op: Op) {
        let mut st = self.st();
        let seq = st.ops.len() as u64 + 1;
        if let Some(dev) = op.written() {
            let h = st.content.entry(split_node(dev).0).or_insert(0);
            *h = h.wrapping_mul(31).wrapping_add(seq);
        }
        st.ops.push(op);
    }
}

pub fn part(name: &str, fs: &str, start: u64, sectors: u64, ty: Option<&str>) -> PartitionInfo {
    PartitionInfo {
        name: name.to_string(),
        fs_type: fs.to_string(),
        start_sector: start,
        size_sectors: sectors,
        part_type: ty.map(str::to_string),
    }
}

impl BlockHost for FakeHost {
    fn list_block_devices(&self) -> anyhow::Result<BTreeSet<String>> {
        let mut st = self.st();
        st.list_calls += 1;
        let tick = st.list_calls;
        let due: Vec<Event> = st
            .events
            .iter()
            .filter(|(t, _)| *t == tick)
            .map(|(_, e)| e.clone())
            .collect();
        for event in due {
            match event {
                Event::Plug(name, cap) => {
                    st.present.insert(name.clone());
                    st.capacities.insert(name, cap);
                }
                Event::Unplug(name) => {
                    st.present.remove(&name);
                    st.capacities.remove(&name);
                }
            }
        }
        Ok(st.present.clone())
    }

    fn parent_disk(&self, device: &Path) -> anyhow::Result<Option<String>> {
        Ok(self.st().parents.get(&p(device)).cloned())
    }

    fn partitions_of(&self, device: &Path) -> anyhow::Result<Vec<PartitionInfo>> {
        self.st()
            .partitions
            .get(&p(device))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{}: not a block device", p(device)))
    }

    fn capacity_bytes(&self, device: &Path) -> anyhow::Result<u64> {
        self.check(device, "capacity")?;
        let st = self.st();
        let name = name_of(device);
        if !st.present.contains(&name) {
            anyhow::bail!("{}: no such device", p(device));
        }
        st.capacities
            .get(&name)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("{}: no medium", p(device)))
    }

    fn fs_footprint(&self, partition: &Path) -> anyhow::Result<FsFootprint> {
        self.check(partition, "footprint")?;
        self.st()
            .footprint
            .ok_or_else(|| anyhow::anyhow!("resize2fs: bad magic number in super-block"))
    }

    fn disk_identifier(&self, _device: &Path) -> anyhow::Result<Option<String>> {
        Ok(self.st().disk_id.clone())
    }

    fn write_partition_table(&self, device: &Path, table: &PartitionTable) -> anyhow::Result<()> {
        self.check(device, "table")?;
        self.st().tables.insert(p(device), table.clone());
        self.record(Op::WriteTable(p(device), table.clone()));
        Ok(())
    }

    fn grow_partition(&self, device: &Path, index: u32) -> anyhow::Result<()> {
        self.check(device, "grow-part")?;
        let cap_sectors = self.capacity_bytes(device)? / 512;
        {
            let mut st = self.st();
            let table = st
                .tables
                .get_mut(&p(device))
                .ok_or_else(|| anyhow::anyhow!("no partition table"))?;
            let entry = table
                .entries
                .get_mut(index as usize - 1)
                .ok_or_else(|| anyhow::anyhow!("no partition {index}"))?;
            entry.size_sectors = Some(cap_sectors - entry.start_sector);
        }
        self.record(Op::GrowPartition(p(device), index));
        Ok(())
    }

    fn erase_signatures(&self, device: &Path) -> anyhow::Result<Effect> {
        self.check(device, "wipe")?;
        let had_table = self.st().tables.remove(&p(device)).is_some();
        self.record(Op::Wipe(p(device)));
        Ok(if had_table {
            Effect::Done
        } else {
            Effect::NotApplicable
        })
    }

    fn settle_device_nodes(&self, device: &Path) -> anyhow::Result<()> {
        self.check(device, "settle")?;
        self.record(Op::Settle(p(device)));
        Ok(())
    }

    fn unmount_all(&self, device: &Path) -> anyhow::Result<Effect> {
        self.record(Op::Unmount(p(device)));
        self.check(device, "unmount")?;
        Ok(if self.st().mounted.remove(&p(device)) {
            Effect::Done
        } else {
            Effect::NotApplicable
        })
    }

    fn node_exists(&self, node: &Path) -> bool {
        !self.st().missing_nodes.contains(&p(node))
    }

    fn copy_blocks(&self, src: &Path, dst: &Path) -> anyhow::Result<()> {
        // Lock released before panicking so other workers keep a usable state.
        let boom = self.st().panics.contains(&p(dst));
        if boom {
            panic!("copy to {} blew up", p(dst));
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.copy_delay.is_zero() {
            std::thread::sleep(self.copy_delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.check(dst, "copy")?;
        self.record(Op::Copy(p(src), p(dst)));
        Ok(())
    }

    fn restore_filesystem(&self, src: &Path, dst: &Path) -> anyhow::Result<()> {
        self.check(dst, "restore")?;
        let fp = self.fs_footprint(src)?;
        self.st().fs_bytes.insert(p(dst), fp.bytes().unwrap_or(0));
        self.record(Op::Restore(p(src), p(dst)));
        Ok(())
    }

    fn grow_filesystem(&self, partition: &Path) -> anyhow::Result<()> {
        self.check(partition, "grow-fs")?;
        let (disk, index) = split_node(&p(partition));
        let size = {
            let st = self.st();
            let table = st
                .tables
                .get(&format!("/dev/{disk}"))
                .ok_or_else(|| anyhow::anyhow!("no partition table"))?;
            table.entries[index as usize - 1]
                .size_sectors
                .ok_or_else(|| anyhow::anyhow!("open-ended partition"))?
                * 512
        };
        self.st().fs_bytes.insert(p(partition), size);
        self.record(Op::GrowFs(p(partition)));
        Ok(())
    }

    fn flush_buffers(&self, device: &Path) -> anyhow::Result<()> {
        self.check(device, "flush")?;
        self.record(Op::Flush(p(device)));
        Ok(())
    }

    fn sync(&self) -> anyhow::Result<()> {
        self.record(Op::Sync);
        Ok(())
    }

    fn attach_image(&self, image: &Path) -> anyhow::Result<PathBuf> {
        self.record(Op::Attach(p(image)));
        Ok(PathBuf::from("/dev/loop0"))
    }

    fn detach_image(&self, loop_device: &Path) -> anyhow::Result<()> {
        self.record(Op::Detach(p(loop_device)));
        Ok(())
    }
}

/// Operator that presses Enter after `ticks` polling intervals.
pub struct ScriptedOperator {
    pub stop_after: usize,
    pub ticks: usize,
    pub confirm: bool,
    pub confirmations: usize,
}

impl ScriptedOperator {
    pub fn new(stop_after: usize) -> Self {
        Self {
            stop_after,
            ticks: 0,
            confirm: true,
            confirmations: 0,
        }
    }

    pub fn declining(mut self) -> Self {
        self.confirm = false;
        self
    }
}

impl StopSignal for ScriptedOperator {
    fn wait(&mut self, _timeout: Duration) -> bool {
        self.ticks += 1;
        self.ticks > self.stop_after
    }
}

impl Operator for ScriptedOperator {
    fn confirm_start(&mut self) -> bool {
        self.confirmations += 1;
        self.confirm
    }
}
