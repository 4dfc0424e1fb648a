// SPDX-License-Identifier: MIT

use std::path::Path;

use crate::fleet::{SkipReason, Target, TargetStatus};
use crate::host::BlockHost;

/// Capacity of `device` in bytes.
///
/// A failed read counts as 0 and is never propagated: the device is then
/// reported too small instead of aborting every other target.
pub fn measure_capacity<H: BlockHost + ?Sized>(host: &H, device: &Path) -> u64 {
    host.capacity_bytes(device).unwrap_or_else(|e| {
        crate::log_verbose!("Cannot read capacity of {}: {e:#}", device.display());
        0
    })
}

/// Marks `target` validated or skipped. Returns `true` when it may be cloned.
pub fn validate<H: BlockHost + ?Sized>(host: &H, target: &mut Target, required: u64) -> bool {
    let capacity = measure_capacity(host, &target.device());
    target.capacity = Some(capacity);
    if capacity < required {
        target.status = TargetStatus::Skipped(SkipReason::TooSmall);
        false
    } else {
        target.status = TargetStatus::Validated;
        true
    }
}

/// Validates every target in order, returns how many were accepted.
pub fn validate_all<H: BlockHost + ?Sized>(
    host: &H,
    targets: &mut [Target],
    required: u64,
) -> usize {
    targets
        .iter_mut()
        .map(|t| validate(host, t, required))
        .filter(|ok| *ok)
        .count()
}
