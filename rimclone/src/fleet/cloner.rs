// SPDX-License-Identifier: MIT

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fleet::{SkipReason, Step, StepFailure, Target, TargetStatus, measure_capacity};
use crate::host::{BlockHost, Effect};
use crate::source::{SourceDescriptor, partition_node};

/// Runs the clone sequence on one target at a time.
///
/// Shared by every worker: it holds only read-only state, and each call
/// touches nothing but the target it was given.
pub struct Cloner<'a, H: BlockHost + ?Sized> {
    host: &'a H,
    source: &'a SourceDescriptor,
    settle_delay: Duration,
}

fn attempt<T>(step: Step, result: anyhow::Result<T>) -> Result<T, StepFailure> {
    result.map_err(|e| StepFailure {
        step,
        detail: format!("{e:#}"),
    })
}

impl<'a, H: BlockHost + ?Sized> Cloner<'a, H> {
    pub fn new(host: &'a H, source: &'a SourceDescriptor, settle_delay: Duration) -> Self {
        Self {
            host,
            source,
            settle_delay,
        }
    }

    /// Takes a validated target to `Succeeded`, `Failed` or `Skipped`.
    ///
    /// There is no rollback: a target failing mid-way is left partially written.
    pub fn clone_target(&self, target: &mut Target) {
        if !target.is_validated() {
            crate::log_verbose!("[{}] not validated, not cloning", target.name);
            return;
        }
        target.status = TargetStatus::Cloning;
        crate::log_info!("[{}] cloning ...", target.name);

        target.status = match self.run_steps(target) {
            Ok(status) => status,
            Err(failure) => {
                crate::log_normal!("[{}] FAILED at {failure}", target.name);
                TargetStatus::Failed(failure)
            }
        };
        if target.status == TargetStatus::Succeeded {
            crate::log_info!("[{}] finished", target.name);
        }
    }

    fn run_steps(&self, target: &mut Target) -> Result<TargetStatus, StepFailure> {
        let host = self.host;
        let src = self.source;
        let tag = target.name.clone();
        let disk = target.device();

        match host.unmount_all(&disk) {
            Ok(Effect::Done) => crate::log_verbose!("[{tag}] unmounted"),
            Ok(Effect::NotApplicable) => {}
            Err(e) => crate::log_warn!("[{tag}] unmount failed, continuing: {e:#}"),
        }

        // The card may have been pulled or swapped since validation.
        let capacity = measure_capacity(host, &disk);
        target.capacity = Some(capacity);
        if capacity < src.required_total_bytes {
            crate::log_info!("[{tag}] too small now, skipping");
            return Ok(TargetStatus::Skipped(SkipReason::TooSmall));
        }

        crate::log_verbose!("[{tag}] erasing signatures");
        if attempt(Step::Wipe, host.erase_signatures(&disk))? == Effect::NotApplicable {
            crate::log_verbose!("[{tag}] no signature to erase");
        }

        crate::log_verbose!("[{tag}] writing partition table");
        attempt(
            Step::PartitionTable,
            host.write_partition_table(&disk, &src.partition_table()),
        )?;

        let (boot, root) = self.settle_partitions(&disk)?;

        crate::log_verbose!("[{tag}] copying boot partition to {}", boot.display());
        attempt(Step::BootCopy, host.copy_blocks(&src.boot_partition, &boot))?;

        crate::log_verbose!("[{tag}] restoring root filesystem to {}", root.display());
        attempt(
            Step::RootRestore,
            host.restore_filesystem(&src.root_partition, &root),
        )?;

        crate::log_verbose!("[{tag}] growing partition 2");
        attempt(Step::GrowPartition, host.grow_partition(&disk, 2))?;
        attempt(Step::GrowPartition, host.settle_device_nodes(&disk))?;
        self.pause();

        crate::log_verbose!("[{tag}] growing filesystem on {}", root.display());
        attempt(Step::GrowFs, host.grow_filesystem(&root))?;

        attempt(Step::Flush, host.flush_buffers(&disk))?;

        Ok(TargetStatus::Succeeded)
    }

    /// Re-reads the new table and waits for both partition nodes.
    fn settle_partitions(&self, disk: &Path) -> Result<(PathBuf, PathBuf), StepFailure> {
        let boot = partition_node(disk, 1);
        let root = partition_node(disk, 2);

        for round in 0..2 {
            attempt(Step::Settle, self.host.settle_device_nodes(disk))?;
            self.pause();
            if self.host.node_exists(&boot) && self.host.node_exists(&root) {
                return Ok((boot, root));
            }
            crate::log_verbose!(
                "{} partitions not visible yet (round {})",
                disk.display(),
                round + 1
            );
        }

        let missing = [&boot, &root]
            .into_iter()
            .filter(|n| !self.host.node_exists(n))
            .map(|n| n.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Err(StepFailure {
            step: Step::Settle,
            detail: format!("device node(s) {missing} did not appear"),
        })
    }

    fn pause(&self) {
        if !self.settle_delay.is_zero() {
            std::thread::sleep(self.settle_delay);
        }
    }
}
