use crate::config::Config;
use log::LevelFilter;
use simplelog::{ConfigBuilder, SharedLogger, TermLogger};

/// Dependency modules silenced unless the level is Trace.
const FILTERED_MODULES: &[&str] = &["redis", "tower", "tower_http", "hyper", "axum", "tokio_util"];

/// Log target used for the scan audit trail. Never filtered.
pub const SCAN_AUDIT_TARGET: &str = "scan_audit";

pub struct Logger {}

impl Logger {
    /// Installs the global terminal logger for the configured level.
    ///
    /// Returns an error if a global logger was already installed, which happens
    /// when tests or embedding applications initialize logging first.
    pub fn init_logger(config: &Config) -> Result<(), log::SetLoggerError> {
        let logger = Self::build_logger(config.log_level_filter);
        let level = logger.level();
        log::set_max_level(level);
        log::set_boxed_logger(logger)
    }

    fn build_logger(level: LevelFilter) -> Box<TermLogger> {
        TermLogger::new(
            level,
            Self::build_log_config(Self::should_filter_dependencies(level)),
            simplelog::TerminalMode::Mixed,
            simplelog::ColorChoice::Auto,
        )
    }

    /// Trace shows everything, including dependency chatter.
    fn should_filter_dependencies(level: LevelFilter) -> bool {
        level != LevelFilter::Trace
    }

    fn build_log_config(apply_filters: bool) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder
            .set_time_format_rfc3339()
            .set_target_level(LevelFilter::Error);

        if apply_filters {
            for module in FILTERED_MODULES {
                builder.add_filter_ignore_str(module);
            }
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filtered_modules_cover_transport_and_store_clients() {
        for module in ["redis", "hyper", "axum", "tower"] {
            assert!(
                FILTERED_MODULES.contains(&module),
                "{module} should be filtered"
            );
        }
    }

    #[test]
    fn test_audit_target_is_never_filtered() {
        assert!(!FILTERED_MODULES
            .iter()
            .any(|module| SCAN_AUDIT_TARGET.starts_with(module)));
    }

    #[test]
    fn test_only_trace_disables_dependency_filtering() {
        assert!(!Logger::should_filter_dependencies(LevelFilter::Trace));
        for level in [
            LevelFilter::Off,
            LevelFilter::Error,
            LevelFilter::Warn,
            LevelFilter::Info,
            LevelFilter::Debug,
        ] {
            assert!(
                Logger::should_filter_dependencies(level),
                "{level} should filter dependencies"
            );
        }
    }

    #[test]
    fn test_built_logger_keeps_requested_level() {
        let logger = Logger::build_logger(LevelFilter::Warn);
        assert_eq!(logger.level(), LevelFilter::Warn);
    }
}
