// SPDX-License-Identifier: MIT

use core::fmt;

use crate::source::FsFamily;

/// Why the source layout cannot be cloned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    Enumerate(String),
    Missing(FsFamily),
    Ambiguous(FsFamily, Vec<String>),
    TooManyPartitions(usize),
    Overlap { boot_end: u64, root_start: u64 },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::Enumerate(reason) => {
                write!(f, "cannot enumerate source partitions: {reason}")
            }
            LayoutError::Missing(family) => {
                write!(f, "no {family} partition found on source")
            }
            LayoutError::Ambiguous(family, names) => {
                write!(
                    f,
                    "several {family} partitions found on source ({}), cannot pick one",
                    names.join(", ")
                )
            }
            LayoutError::TooManyPartitions(n) => {
                write!(f, "source has {n} partitions, only boot + root layouts are supported")
            }
            LayoutError::Overlap {
                boot_end,
                root_start,
            } => write!(
                f,
                "root partition starts at sector {root_start}, inside the boot partition (ends at {boot_end})"
            ),
        }
    }
}

/// Fatal errors: each one aborts the run before any target is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneError {
    Layout(LayoutError),
    Sizing { partition: String, reason: String },
    NoTargets,
    NoUsableTargets { discovered: usize },
}

impl fmt::Display for CloneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloneError::Layout(e) => write!(f, "Invalid source layout: {e}"),
            CloneError::Sizing { partition, reason } => {
                write!(f, "Cannot size root filesystem on {partition}: {reason}")
            }
            CloneError::NoTargets => write!(f, "No targets detected"),
            CloneError::NoUsableTargets { discovered } => write!(
                f,
                "None of the {discovered} detected target(s) is large enough"
            ),
        }
    }
}

impl std::error::Error for CloneError {}

impl From<LayoutError> for CloneError {
    fn from(e: LayoutError) -> Self {
        CloneError::Layout(e)
    }
}
