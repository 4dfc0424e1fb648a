// SPDX-License-Identifier: MIT

use core::fmt;
use std::path::{Path, PathBuf};

/// Clone steps that can fail a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Wipe,
    PartitionTable,
    Settle,
    BootCopy,
    RootRestore,
    GrowPartition,
    GrowFs,
    Flush,
    /// The worker running the clone died.
    Worker,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::Wipe => "wipe",
            Step::PartitionTable => "partition-table",
            Step::Settle => "settle",
            Step::BootCopy => "boot-copy",
            Step::RootRestore => "root-restore",
            Step::GrowPartition => "grow-partition",
            Step::GrowFs => "grow-fs",
            Step::Flush => "flush",
            Step::Worker => "worker",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: Step,
    pub detail: String,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.detail)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TooSmall,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetStatus {
    Discovered,
    Validated,
    Skipped(SkipReason),
    Cloning,
    Succeeded,
    Failed(StepFailure),
}

/// A device that appeared while discovery was running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    /// Last measured capacity, 0 when it could not be read.
    pub capacity: Option<u64>,
    pub status: TargetStatus,
}

impl Target {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: None,
            status: TargetStatus::Discovered,
        }
    }

    pub fn device(&self) -> PathBuf {
        Path::new("/dev").join(&self.name)
    }

    pub fn is_validated(&self) -> bool {
        self.status == TargetStatus::Validated
    }
}
