use thiserror::Error;

/// Errors that can occur while resolving the batch configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Missing configuration value: {0}")]
    MissingValue(String),

    #[error("Invalid integer for '{field}': {value:?}")]
    InvalidInteger { field: &'static str, value: String },

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Errors for a single result row that cannot become an attribute
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("Row has no '{0}' column")]
    MissingColumn(&'static str),
}

/// Errors that can occur while reading the results file
#[derive(Error, Debug)]
pub enum ResultsError {
    #[error("Results file does not exist: {0}")]
    Missing(String),

    #[error("Results file could not be opened/read: {0}")]
    Unreadable(String),
}

/// Errors that can occur when handing one event to the submission sink
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Failed to start submission process: {0}")]
    SpawnFailed(String),

    #[error("Failed to serialize submission arguments: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that abort a whole batch run
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Results(#[from] ResultsError),
}

impl RunError {
    /// Process exit status reported to the host for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::InvalidPayload(_) | RunError::Config(_) => 1,
            RunError::Results(ResultsError::Missing(_)) => 2,
            RunError::Results(ResultsError::Unreadable(_)) => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let invalid = RunError::InvalidPayload("bad json".to_string());
        let config = RunError::Config(ConfigError::MissingValue("mispsrv".to_string()));
        let missing = RunError::Results(ResultsError::Missing("/tmp/x".to_string()));
        let unreadable = RunError::Results(ResultsError::Unreadable("/tmp/x".to_string()));

        assert_eq!(invalid.exit_code(), 1);
        assert_eq!(config.exit_code(), 1);
        assert_eq!(missing.exit_code(), 2);
        assert_eq!(unreadable.exit_code(), 3);
    }

    #[test]
    fn test_invalid_integer_message_names_field() {
        let err = ConfigError::InvalidInteger {
            field: "tlp",
            value: "amber".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid integer for 'tlp': \"amber\"");
    }
}
