// SPDX-License-Identifier: MIT

use indicatif::ProgressBar;
use serde::Deserialize;
use std::sync::mpsc;
use std::sync::{Condvar, Mutex, PoisonError};

use crate::fleet::{Cloner, Step, StepFailure, Target, TargetStatus};
use crate::host::BlockHost;

pub const DEFAULT_PARALLEL: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Clone up to `parallel` targets at once.
    #[default]
    Batch,
    /// Clone one target after the other.
    Sequential,
}

impl core::fmt::Display for Mode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Mode::Batch => write!(f, "batch"),
            Mode::Sequential => write!(f, "sequential"),
        }
    }
}

/// Counting gate bounding how many clones run at once.
pub struct Slots {
    free: Mutex<usize>,
    freed: Condvar,
}

/// One taken slot, given back on drop (also when the worker unwinds).
pub struct SlotGuard<'a> {
    slots: &'a Slots,
}

impl Slots {
    pub fn new(count: usize) -> Self {
        Self {
            free: Mutex::new(count.max(1)),
            freed: Condvar::new(),
        }
    }

    /// Blocks until a slot is free.
    pub fn acquire(&self) -> SlotGuard<'_> {
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        while *free == 0 {
            free = self
                .freed
                .wait(free)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *free -= 1;
        SlotGuard { slots: self }
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut free = self
            .slots
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *free += 1;
        self.slots.freed.notify_one();
    }
}

/// Clones every validated target. Failures stay with their target.
pub fn run<H: BlockHost + ?Sized>(
    cloner: &Cloner<'_, H>,
    targets: &mut [Target],
    mode: Mode,
    parallel: usize,
    pb: &ProgressBar,
) {
    match mode {
        Mode::Sequential => run_sequential(cloner, targets, pb),
        Mode::Batch => run_batch(cloner, targets, parallel, pb),
    }
}

fn run_sequential<H: BlockHost + ?Sized>(
    cloner: &Cloner<'_, H>,
    targets: &mut [Target],
    pb: &ProgressBar,
) {
    for target in targets.iter_mut().filter(|t| t.is_validated()) {
        cloner.clone_target(target);
        pb.inc(1);
    }
}

/// Launches in discovery order; completion order is whatever the devices make it.
fn run_batch<H: BlockHost + ?Sized>(
    cloner: &Cloner<'_, H>,
    targets: &mut [Target],
    parallel: usize,
    pb: &ProgressBar,
) {
    let slots = Slots::new(parallel);
    let queue: Vec<usize> = targets
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_validated())
        .map(|(i, _)| i)
        .collect();
    let (tx, rx) = mpsc::channel::<(usize, Target)>();
    let mut lost = Vec::new();

    std::thread::scope(|s| {
        let mut workers = Vec::with_capacity(queue.len());
        for &idx in &queue {
            let slot = slots.acquire();
            let mut target = targets[idx].clone();
            let tx = tx.clone();
            let handle = s.spawn(move || {
                let _slot = slot;
                cloner.clone_target(&mut target);
                pb.inc(1);
                let _ = tx.send((idx, target));
            });
            workers.push((idx, handle));
        }
        for (idx, handle) in workers {
            if handle.join().is_err() {
                lost.push(idx);
            }
        }
    });
    drop(tx);

    for (idx, target) in rx.try_iter() {
        targets[idx] = target;
    }
    for idx in lost {
        crate::log_normal!("[{}] FAILED: worker panicked", targets[idx].name);
        targets[idx].status = TargetStatus::Failed(StepFailure {
            step: Step::Worker,
            detail: "worker panicked".into(),
        });
        pb.inc(1);
    }
}
