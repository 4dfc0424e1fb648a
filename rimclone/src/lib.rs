// SPDX-License-Identifier: MIT

//! Clones one boot + root disk onto a fleet of hot-plugged targets.
//!
//! [`run`] drives a whole session: analyze the source, wait for targets,
//! validate them, then clone them with the configured scheduling.

pub mod config;
pub mod fleet;
pub mod host;
pub mod source;
pub mod utils;

use std::collections::BTreeSet;
use std::path::Path;

use crate::config::Config;
use crate::fleet::{Cloner, Discovery, Operator, Target, report};
use crate::host::BlockHost;
use crate::source::{AnalyzeOptions, CloneError, SourceDescriptor, SourceDevice, device_name};
use crate::utils::progress;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Validate and report, never write.
    pub dry_run: bool,
    /// Start cloning without waiting for the operator.
    pub assume_yes: bool,
}

#[derive(Debug)]
pub struct RunReport {
    pub source: SourceDescriptor,
    pub targets: Vec<Target>,
    pub summary: report::Summary,
}

pub fn run<H: BlockHost + ?Sized, O: Operator + ?Sized>(
    host: &H,
    input: &Path,
    config: &Config,
    opts: RunOptions,
    operator: &mut O,
) -> anyhow::Result<RunReport> {
    let device = SourceDevice::resolve(host, input)?;
    let descriptor = source::analyze(
        host,
        device.disk(),
        AnalyzeOptions {
            preserve_disk_id: config.preserve_disk_id,
        },
    )?;
    crate::log_info!("{descriptor}");

    let mut excluded: BTreeSet<String> = config.ignore.iter().cloned().collect();
    excluded.insert(device_name(device.disk()));
    let discovery = Discovery::capture(host, excluded)?;

    crate::log_normal!("Insert cards. Press Enter when finished.");
    let spinner = progress::discovery_spinner();
    let mut targets = discovery.run(operator, &config.discovery(), &spinner)?;
    crate::log_info!(
        "Targets: {}",
        targets
            .iter()
            .map(|t| t.device().display().to_string())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let required = descriptor.required_total_bytes;
    let validated = fleet::validate_all(host, &mut targets, required);

    if opts.dry_run {
        report::print_dry_run(&targets, required);
        if let Some(first) = targets.iter().find(|t| t.is_validated()) {
            crate::log_verbose!("Commands for {}:", first.device().display());
            for cmd in crate::host::clone_plan(&descriptor, &first.device()) {
                crate::log_verbose!("  {cmd}");
            }
        }
        let summary = report::Summary::of(&targets);
        return Ok(RunReport {
            source: descriptor,
            targets,
            summary,
        });
    }

    if validated == 0 {
        report::print_validation(&targets, required);
        return Err(CloneError::NoUsableTargets {
            discovered: targets.len(),
        }
        .into());
    }

    if !opts.assume_yes {
        crate::log_normal!(
            "{validated} target(s) will be ERASED. Press Enter to start, or Ctrl-C to cancel."
        );
        if !operator.confirm_start() {
            anyhow::bail!("No confirmation received, nothing written (use --yes to skip it)");
        }
    }

    crate::log_info!(
        "Cloning {validated} target(s), mode {} (parallel {})",
        config.mode,
        config.parallel
    );
    let cloner = Cloner::new(host, &descriptor, config.settle_delay());
    let bar = progress::clone_bar(validated as u64);
    fleet::run(&cloner, &mut targets, config.mode, config.parallel, &bar);
    bar.finish_and_clear();

    let summary = report::print_summary(&targets);

    crate::log_info!("Final sync");
    if let Err(e) = host.sync() {
        crate::log_warn!("sync failed: {e:#}");
    }

    Ok(RunReport {
        source: descriptor,
        targets,
        summary,
    })
}
