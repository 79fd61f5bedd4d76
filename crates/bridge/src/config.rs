//! VM configuration
//!
//! Read from TOML:
//!
//! ```toml
//! stack_size = 2048
//! buffer_name = "game.nut"
//! ```
//!
//! Every field is optional and falls back to its default.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Stack capacity used when none is configured
pub const DEFAULT_STACK_SIZE: usize = 1024;

/// Diagnostic name given to compiled buffers when none is configured
pub const DEFAULT_BUFFER_NAME: &str = "buffer";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfig {
    /// Initial stack capacity passed to the VM
    #[serde(default = "default_stack_size")]
    pub stack_size: usize,
    /// Name reported in compile diagnostics (`<name>:<line>:<column>`)
    #[serde(default = "default_buffer_name")]
    pub buffer_name: String,
}

fn default_stack_size() -> usize {
    DEFAULT_STACK_SIZE
}

fn default_buffer_name() -> String {
    DEFAULT_BUFFER_NAME.to_string()
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_size: default_stack_size(),
            buffer_name: default_buffer_name(),
        }
    }
}

impl VmConfig {
    /// Parse a configuration from TOML content
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }
}
