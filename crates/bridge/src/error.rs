//! Error types for the bridge
//!
//! Compile and runtime failures carry the VM's message verbatim. Type
//! mismatches are not errors: typed reads return `None`.

use std::fmt;

/// Failure of a compile-and-run or closure call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The buffer did not compile; holds the VM diagnostic
    Compile(String),
    /// The script raised an error while running
    Runtime(String),
}

impl Error {
    /// The VM message, without the failure kind
    pub fn message(&self) -> &str {
        match self {
            Error::Compile(msg) | Error::Runtime(msg) => msg,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Compile(msg) => write!(f, "Compile error: {}", msg),
            Error::Runtime(msg) => write!(f, "Runtime error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Failure to load a [`VmConfig`](crate::VmConfig)
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read VM config: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse VM config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_and_message() {
        let err = Error::Runtime("the index 'x' does not exist".to_string());
        assert_eq!(err.message(), "the index 'x' does not exist");
        assert_eq!(
            err.to_string(),
            "Runtime error: the index 'x' does not exist"
        );
        assert!(Error::Compile("bad".to_string()).to_string().starts_with("Compile"));
    }

    #[test]
    fn test_config_error_source() {
        use std::error::Error as _;
        let err = ConfigError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("gone"));
    }
}
