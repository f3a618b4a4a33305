//! Logging utilities
//!
//! The crate logs through the `log` facade; applications pick the sink.
//! `env_logger` is the default sink and honours `RUST_LOG`.

pub use log::{debug, error, info, trace, warn, LevelFilter};

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    env_logger::init();
}

/// Initialize logging with a default level, still overridable by `RUST_LOG`.
///
/// Returns `false` if a logger was already installed.
pub fn init_with_level(level: LevelFilter) -> bool {
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init()
        .is_ok()
}
