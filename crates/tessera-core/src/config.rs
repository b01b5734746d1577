/// Process-wide configuration for Tessera.
#[derive(Debug, Clone)]
pub struct Config {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub profiling: ProfilingMode,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_filter: crate::logging::DEFAULT_FILTER.to_string(),
            profiling: ProfilingMode::Off,
        }
    }
}

impl Config {
    /// Builder-style override of the log filter.
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Builder-style override of the profiling mode.
    pub fn with_profiling(mut self, profiling: ProfilingMode) -> Self {
        self.profiling = profiling;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfilingMode {
    /// Profiling scopes are compiled in but not recorded
    #[default]
    Off,
    /// Scopes are recorded and can be inspected in-process
    On,
    /// Scopes are recorded and served to external tools such as `puffin_viewer`
    /// (requires the `profiling` feature)
    WithWebserver,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.profiling, ProfilingMode::Off);
        assert_eq!(config.log_filter, crate::logging::DEFAULT_FILTER);
    }

    #[test]
    fn test_builder_overrides() {
        let config = Config::default()
            .with_log_filter("tessera_render=trace")
            .with_profiling(ProfilingMode::On);
        assert_eq!(config.log_filter, "tessera_render=trace");
        assert_eq!(config.profiling, ProfilingMode::On);
    }
}
