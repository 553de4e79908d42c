pub mod logging {
    use clap::ValueEnum;
    use std::fs::OpenOptions;
    use std::path::PathBuf;
    use std::sync::OnceLock;
    use tracing::level_filters::LevelFilter;
    use tracing_appender::non_blocking::WorkerGuard;
    use tracing_subscriber::EnvFilter;

    #[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
    pub enum LogLevel {
        Error,
        #[default]
        Warn,
        Info,
        Debug,
        Trace,
    }

    impl LogLevel {
        pub fn to_filter(self) -> LevelFilter {
            match self {
                LogLevel::Error => LevelFilter::ERROR,
                LogLevel::Warn => LevelFilter::WARN,
                LogLevel::Info => LevelFilter::INFO,
                LogLevel::Debug => LevelFilter::DEBUG,
                LogLevel::Trace => LevelFilter::TRACE,
            }
        }
    }

    #[derive(Clone, Debug, Default)]
    pub struct LogConfig {
        pub level: LogLevel,
        pub file: Option<PathBuf>,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum InitError {
        #[error("failed to open log file {path:?}: {source}")]
        Io {
            path: PathBuf,
            source: std::io::Error,
        },
        #[error("failed to configure logger: {0}")]
        Configure(String),
    }

    static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

    /// Installs the global subscriber. Later calls are no-ops.
    pub fn init(config: &LogConfig) -> Result<(), InitError> {
        if GUARD.get().is_some() {
            return Ok(());
        }

        let (writer, guard) = match &config.file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| InitError::Io {
                        path: path.clone(),
                        source,
                    })?;
                tracing_appender::non_blocking(file)
            }
            None => tracing_appender::non_blocking(std::io::stderr()),
        };

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(build_env_filter(config.level.to_filter()))
            .with_target(config.level >= LogLevel::Debug)
            .with_ansi(config.file.is_none())
            .with_writer(writer)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|err| InitError::Configure(err.to_string()))?;
        let _ = GUARD.set(guard);
        Ok(())
    }

    fn build_env_filter(level: LevelFilter) -> EnvFilter {
        match std::env::var("VMDECK_LOG_FILTER") {
            Ok(filter) if !filter.trim().is_empty() => EnvFilter::new(filter),
            _ => EnvFilter::new(default_filter_for(level, allow_dependency_traces())),
        }
    }

    const NOISY_DEPENDENCIES: &[&str] = &[
        "hyper",
        "hyper_util",
        "reqwest",
        "rustls",
        "tokio_tungstenite",
        "tungstenite",
        "mio",
    ];

    fn default_filter_for(level: LevelFilter, dependency_traces: bool) -> String {
        let mut filter = match level {
            LevelFilter::TRACE => "info,vmdeck=trace,vmdeck_console=trace".to_owned(),
            LevelFilter::DEBUG => "info,vmdeck=debug,vmdeck_console=debug".to_owned(),
            other => other.to_string().to_ascii_lowercase(),
        };
        if level == LevelFilter::TRACE && !dependency_traces {
            for target in NOISY_DEPENDENCIES {
                filter.push_str(&format!(",{target}=info"));
            }
        }
        filter
    }

    fn allow_dependency_traces() -> bool {
        std::env::var("VMDECK_TRACE_DEPS")
            .map(|v| v != "0" && !v.is_empty())
            .unwrap_or(false)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test_timeout::timeout]
        fn plain_levels_map_to_their_names() {
            assert_eq!(default_filter_for(LevelFilter::WARN, false), "warn");
            assert_eq!(default_filter_for(LevelFilter::ERROR, false), "error");
        }

        #[test_timeout::timeout]
        fn trace_throttles_dependencies_unless_allowed() {
            let throttled = default_filter_for(LevelFilter::TRACE, false);
            assert!(throttled.starts_with("info,vmdeck=trace"));
            assert!(throttled.contains("tungstenite=info"));

            let open = default_filter_for(LevelFilter::TRACE, true);
            assert!(!open.contains("hyper=info"));
        }
    }
}
