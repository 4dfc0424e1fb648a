// SPDX-License-Identifier: MIT

use colored::{ColoredString, Colorize};

use crate::fleet::{SkipReason, Target, TargetStatus};
use crate::utils;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Summary {
    pub fn of(targets: &[Target]) -> Self {
        let mut s = Summary::default();
        for t in targets {
            match t.status {
                TargetStatus::Succeeded => s.succeeded += 1,
                TargetStatus::Failed(_) => s.failed += 1,
                TargetStatus::Skipped(_) => s.skipped += 1,
                _ => {}
            }
        }
        s
    }
}

/// Uncolored status word, as printed in the per-target lines.
pub fn status_text(status: &TargetStatus) -> String {
    match status {
        TargetStatus::Validated | TargetStatus::Succeeded => "OK".into(),
        TargetStatus::Skipped(SkipReason::TooSmall) => "TOO SMALL".into(),
        TargetStatus::Failed(f) => format!("FAILED: {}", f.step),
        TargetStatus::Discovered => "PENDING".into(),
        TargetStatus::Cloning => "CLONING".into(),
    }
}

fn status_label(status: &TargetStatus) -> ColoredString {
    let text = status_text(status);
    match status {
        TargetStatus::Validated | TargetStatus::Succeeded => text.green().bold(),
        TargetStatus::Skipped(_) => text.yellow().bold(),
        TargetStatus::Failed(_) => text.red().bold(),
        _ => text.normal(),
    }
}

fn line(target: &Target) -> String {
    let capacity = target
        .capacity
        .map(utils::decimal_gb)
        .unwrap_or_else(|| "?".into());
    format!(
        "  /dev/{}: {} ({capacity})",
        target.name,
        status_label(&target.status)
    )
}

/// Per-target validation outcome under `title`.
pub fn validation_report(title: &str, targets: &[Target], required: u64) -> String {
    let mut out = format!(
        "\n{} (Required: {})",
        title.bold(),
        utils::decimal_gb(required)
    );
    for t in targets {
        out.push('\n');
        out.push_str(&line(t));
    }
    out
}

pub fn print_dry_run(targets: &[Target], required: u64) {
    println!("{}", validation_report("Dry run results", targets, required));
}

/// Printed when no target is large enough and nothing will be cloned.
pub fn print_validation(targets: &[Target], required: u64) {
    println!("{}", validation_report("Validation results", targets, required));
}

pub fn print_summary(targets: &[Target]) -> Summary {
    let summary = Summary::of(targets);
    println!("\n{}", "Results".bold());
    for t in targets {
        println!("{}", line(t));
        if let TargetStatus::Failed(f) = &t.status {
            crate::log_verbose!("  {}: {}", t.name, f.detail);
        }
    }
    println!(
        "\n{} {} succeeded, {} failed, {} skipped",
        "Summary:".bold(),
        summary.succeeded.to_string().green(),
        summary.failed.to_string().red(),
        summary.skipped.to_string().yellow()
    );
    summary
}
