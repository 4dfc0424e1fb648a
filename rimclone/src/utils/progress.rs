// SPDX-License-Identifier: MIT

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::utils::{LogLevel, log_level};

/// Spinner shown while the operator inserts cards.
pub fn discovery_spinner() -> ProgressBar {
    if log_level() == LogLevel::Quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("Detected: 0");
    pb
}

/// Bar counting finished clones, whatever their outcome.
pub fn clone_bar(total: u64) -> ProgressBar {
    if log_level() == LogLevel::Quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.white}] cloned {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("█░░"),
    );
    pb.enable_steady_tick(Duration::from_millis(250));
    pb
}
