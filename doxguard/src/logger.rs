// doxguard/src/logger.rs
//! Logging setup for the doxguard binary.
//!
//! `RUST_LOG` is honoured when no explicit level is requested. Output goes to stderr so
//! JSON written to stdout stays machine readable.
//!
//! License: MIT OR APACHE 2.0

use env_logger::{Builder, Env};
use log::LevelFilter;

/// Initializes the global logger. Safe to call more than once; later calls are ignored.
pub fn init_logger(level: Option<LevelFilter>) {
    let mut builder = Builder::from_env(Env::default().default_filter_or("warn"));
    if let Some(level) = level {
        builder.filter_level(level);
    }
    builder.format_timestamp(None).format_target(false);
    let _ = builder.try_init();
}

/// Maps the global `--quiet` / `--debug` flags to a level override.
pub fn level_for(quiet: bool, debug: bool) -> Option<LevelFilter> {
    if quiet {
        Some(LevelFilter::Off)
    } else if debug {
        Some(LevelFilter::Debug)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_wins_over_debug() {
        assert_eq!(level_for(true, true), Some(LevelFilter::Off));
        assert_eq!(level_for(false, true), Some(LevelFilter::Debug));
        assert_eq!(level_for(false, false), None);
    }
}
