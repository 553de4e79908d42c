use thiserror::Error;

use crate::api::ApiError;
use crate::console::ConsoleError;
use crate::telemetry::logging::InitError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("{0}")]
    Console(#[from] ConsoleError),
    #[error("logging initialization failed: {0}")]
    Logging(#[from] InitError),
    #[error("output encoding failed: {0}")]
    Output(#[from] serde_json::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test_timeout::timeout]
    fn logging_failures_keep_their_cause() {
        let err = CliError::from(InitError::Configure("subscriber already set".into()));
        assert!(matches!(err, CliError::Logging(_)));
        assert_eq!(
            err.to_string(),
            "logging initialization failed: failed to configure logger: subscriber already set"
        );

        let err = CliError::from(InitError::Io {
            path: PathBuf::from("/nonexistent/vmdeck.log"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
        assert!(err.to_string().contains("vmdeck.log"));
    }
}
