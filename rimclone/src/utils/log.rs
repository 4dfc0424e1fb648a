// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LogLevel {
    Quiet = 0,
    Normal = 1,
    Verbose = 2,
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Normal as u8);

pub fn set_log_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn log_level() -> LogLevel {
    match LOG_LEVEL.load(Ordering::Relaxed) {
        0 => LogLevel::Quiet,
        2 => LogLevel::Verbose,
        _ => LogLevel::Normal,
    }
}

/// Always printed, whatever the level.
#[macro_export]
macro_rules! log_normal {
    ($($arg:tt)*) => {{
        println!("[rimclone] {}", format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if $crate::utils::log_level() != $crate::utils::LogLevel::Quiet {
            println!("[rimclone] {}", format_args!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! log_verbose {
    ($($arg:tt)*) => {
        if $crate::utils::log_level() == $crate::utils::LogLevel::Verbose {
            println!("[rimclone] {}", format_args!($($arg)*));
        }
    };
}

/// Warnings go to stderr and survive `--quiet`.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        eprintln!("[rimclone] warning: {}", format_args!($($arg)*));
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_expand_in_expression_position() {
        set_log_level(LogLevel::Quiet);
        let outcome: Result<(), &str> = Err("busy");
        match outcome {
            Ok(()) => crate::log_normal!("unmounted"),
            Err(e) => crate::log_warn!("unmount failed: {e}"),
        }
        let () = if outcome.is_err() {
            crate::log_normal!("retrying")
        } else {
            crate::log_warn!("nothing to retry")
        };
        assert_eq!(log_level(), LogLevel::Quiet);
        set_log_level(LogLevel::Normal);
    }
}
