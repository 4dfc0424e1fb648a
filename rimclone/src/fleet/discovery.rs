// SPDX-License-Identifier: MIT

use indicatif::ProgressBar;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::fleet::Target;
use crate::host::BlockHost;
use crate::source::CloneError;

/// Operator side of the discovery loop.
pub trait StopSignal {
    /// Waits up to `timeout` for the operator; `true` ends discovery.
    fn wait(&mut self, timeout: Duration) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct DiscoveryOptions {
    pub poll_interval: Duration,
    pub max_wait: Option<Duration>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_wait: None,
        }
    }
}

/// Accumulates devices that appear after the baseline was captured.
///
/// A name is recorded at most once and never removed, even if the device
/// disappears again.
pub struct Discovery<'h, H: BlockHost + ?Sized> {
    host: &'h H,
    baseline: BTreeSet<String>,
    excluded: BTreeSet<String>,
    seen: HashSet<String>,
    targets: Vec<Target>,
}

impl<'h, H: BlockHost + ?Sized> Discovery<'h, H> {
    /// Snapshots the devices present now. `excluded` names are never recorded.
    pub fn capture(
        host: &'h H,
        excluded: impl IntoIterator<Item = String>,
    ) -> anyhow::Result<Self> {
        let baseline = host.list_block_devices()?;
        crate::log_verbose!("Baseline: {}", join(&baseline));
        Ok(Self {
            host,
            baseline,
            excluded: excluded.into_iter().collect(),
            seen: HashSet::new(),
            targets: Vec::new(),
        })
    }

    pub fn baseline(&self) -> &BTreeSet<String> {
        &self.baseline
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// One enumeration tick. Returns the names recorded by this tick.
    ///
    /// Enumeration errors are transient (nodes being created while we look)
    /// and simply wait for the next tick.
    pub fn poll(&mut self) -> Vec<String> {
        let current = match self.host.list_block_devices() {
            Ok(c) => c,
            Err(e) => {
                crate::log_verbose!("Enumeration failed, retrying next tick: {e:#}");
                return Vec::new();
            }
        };

        let mut added = Vec::new();
        for name in current.difference(&self.baseline) {
            if self.seen.contains(name) || self.excluded.contains(name) {
                continue;
            }
            // Card readers expose empty slots as zero-sized disks.
            let device = Path::new("/dev").join(name);
            match self.host.capacity_bytes(&device) {
                Ok(n) if n > 0 => {}
                _ => continue,
            }
            self.seen.insert(name.clone());
            self.targets.push(Target::new(name.clone()));
            added.push(name.clone());
        }
        added
    }

    /// Polls until the operator signals completion or `max_wait` runs out.
    pub fn run<S: StopSignal + ?Sized>(
        mut self,
        stop: &mut S,
        opts: &DiscoveryOptions,
        pb: &ProgressBar,
    ) -> Result<Vec<Target>, CloneError> {
        let started = Instant::now();
        loop {
            if stop.wait(opts.poll_interval) {
                break;
            }
            if opts.max_wait.is_some_and(|max| started.elapsed() >= max) {
                crate::log_verbose!("Discovery deadline reached");
                break;
            }
            for name in self.poll() {
                pb.println(format!("  + /dev/{name}"));
            }
            pb.set_message(format!("Detected: {}", self.targets.len()));
        }
        pb.finish_and_clear();

        if self.targets.is_empty() {
            return Err(CloneError::NoTargets);
        }
        Ok(self.targets)
    }
}

fn join(names: &BTreeSet<String>) -> String {
    names.iter().cloned().collect::<Vec<_>>().join(" ")
}
