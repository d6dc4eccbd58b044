//! Logging setup using tracing.
//!
//! The bar logs through `tracing` macros everywhere; this module installs the
//! fmt subscriber once at startup.

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

/// Map the number of `-v` flags to a base level.
pub fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` directives are honoured on top of the verbosity level.
///
/// # Example
/// ```
/// duskbar_core::logging::init(1); // info level
/// ```
pub fn init(verbosity: u8) {
    let filter = EnvFilter::from_default_env().add_directive(level_for(verbosity).into());

    // try_init: a second call (tests, doc examples) must not panic.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_verbosity() {
        assert_eq!(level_for(0), Level::WARN);
        assert_eq!(level_for(1), Level::INFO);
        assert_eq!(level_for(2), Level::DEBUG);
        assert_eq!(level_for(3), Level::TRACE);
        assert_eq!(level_for(9), Level::TRACE);
    }
}
