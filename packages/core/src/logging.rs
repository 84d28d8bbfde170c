//! Logger initialisation.

use log::LevelFilter;

/// Installs the process-wide logger.
///
/// `default_level` applies when `RUST_LOG` is unset. Calling this twice is
/// harmless; the second call is ignored.
pub fn init(default_level: &str) {
    let level = default_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_target(false)
        .try_init();
}
