//! Tessera Core
//!
//! Shared plumbing for the Tessera crates: logging, profiling, configuration,
//! math re-exports and small geometry value types.

pub mod alloc;
pub mod config;
pub mod geometry;
pub mod logging;
pub mod math;
pub mod profiling;

use config::Config;

/// Initialize logging and profiling from a [`Config`].
///
/// Call once at startup, before creating any devices.
pub fn init(config: &Config) {
    logging::init_with_filter(&config.log_filter);
    profiling::init_profiling(config.profiling);
}
