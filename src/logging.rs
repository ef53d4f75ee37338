//! # Diagnostic Logging
//!
//! Log records go to stderr as `LEVEL: message` lines. The print front-end
//! reads that stream and keys on the prefix, so the format carries no
//! timestamps or targets.
//!
//! Informational output is suppressed unless debug mode is on; errors are
//! always written. `RUST_LOG` still applies on top of the chosen default.

use std::io::Write;

use env_logger::{Builder, Target};
use log::LevelFilter;

/// Default level filter for the given debug flag.
pub fn level_for(debug: bool) -> LevelFilter {
    if debug {
        LevelFilter::Info
    } else {
        LevelFilter::Error
    }
}

/// Install the global logger. Safe to call more than once; later calls are no-ops.
pub fn init(debug: bool) {
    let _ = Builder::new()
        .filter_level(level_for(debug))
        .parse_env("RUST_LOG")
        .target(Target::Stderr)
        .format(|buf, record| writeln!(buf, "{}: {}", record.level(), record.args()))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_unless_debug() {
        assert_eq!(level_for(false), LevelFilter::Error);
        assert_eq!(level_for(true), LevelFilter::Info);
    }
}
