// SPDX-License-Identifier: MIT

use clap::Parser;
use rimclone::config::Config;
use rimclone::fleet::{Mode, OperatorInput};
use rimclone::host::{self, LinuxHost};
use rimclone::utils::{LogLevel, set_log_level};
use rimclone::{RunOptions, log_normal};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rimclone", version, about = "Clone a boot + root disk onto many cards at once", long_about = None)]
struct Cli {
    /// Source disk, one of its partitions, or a raw disk image
    source: PathBuf,

    /// Scheduling mode
    #[arg(value_enum)]
    mode: Option<Mode>,

    /// Maximum number of targets cloned at the same time in batch mode
    parallel: Option<usize>,

    /// Only report which targets are large enough, write nothing
    #[arg(short = 'n', long)]
    dry_run: bool,

    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    #[arg(short, long)]
    quiet: bool,

    /// TOML file with tunables
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop discovery after this many seconds even without Enter
    #[arg(long, value_name = "SECS")]
    max_wait: Option<u64>,

    /// Start cloning without asking for confirmation
    #[arg(short = 'y', long)]
    yes: bool,

    /// Do not copy the source disk identifier (PARTUUIDs will differ)
    #[arg(long)]
    no_disk_id: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    set_log_level(if cli.verbose {
        LogLevel::Verbose
    } else if cli.quiet {
        LogLevel::Quiet
    } else {
        LogLevel::Normal
    });

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if let Some(parallel) = cli.parallel {
        config.parallel = parallel;
    }
    if cli.max_wait.is_some() {
        config.max_wait_secs = cli.max_wait;
    }
    if cli.no_disk_id {
        config.preserve_disk_id = false;
    }
    config.validate()?;

    // SAFETY: geteuid has no preconditions and cannot fail.
    if unsafe { libc::geteuid() } != 0 {
        anyhow::bail!("rimclone needs raw device access, please run as root");
    }

    let mut tools = host::PROBE_TOOLS.to_vec();
    if !cli.dry_run {
        tools.extend_from_slice(host::WRITE_TOOLS);
    }
    if cli.source.is_file() {
        tools.extend_from_slice(host::LOOP_TOOLS);
    }
    host::validate_binaries(&tools)?;

    let host = LinuxHost::new();
    let mut operator = OperatorInput::spawn();
    rimclone::run(
        &host,
        &cli.source,
        &config,
        RunOptions {
            dry_run: cli.dry_run,
            assume_yes: cli.yes,
        },
        &mut operator,
    )?;

    log_normal!("Done");
    Ok(())
}
