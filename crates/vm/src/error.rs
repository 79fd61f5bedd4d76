//! Error reporting for the VM
//!
//! Compile errors carry a source position so `sq_compilebuffer` can report
//! `<buffer>:<line>:<column>: <message>`. Runtime errors are plain strings
//! that end up in the VM's last-error slot, where `sq_getlasterror` hands
//! them to the embedder.
//!
//! Native functions are host code called through the ABI. A panic inside
//! one must not unwind through `extern "C"` frames, so callers catch it and
//! turn the payload into a runtime error with [`format_panic_payload`].

use std::fmt;

/// A syntax error found while compiling a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub message: String,
    /// Line number (0-indexed)
    pub line: usize,
    /// Column number (0-indexed)
    pub column: usize,
}

impl CompileError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        CompileError {
            message: message.into(),
            line,
            column,
        }
    }

    /// Render with the buffer name, 1-indexed for user display
    pub fn with_source(&self, source_name: &str) -> String {
        format!(
            "{}:{}:{}: {}",
            source_name,
            self.line + 1,
            self.column + 1,
            self.message
        )
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (line {}, column {})",
            self.message,
            self.line + 1,
            self.column + 1
        )
    }
}

impl std::error::Error for CompileError {}

/// Format a panic payload into an error message
pub fn format_panic_payload(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_with_source() {
        let err = CompileError::new("expression expected", 0, 4);
        assert_eq!(err.with_source("buffer"), "buffer:1:5: expression expected");
    }

    #[test]
    fn test_format_panic_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("panic message");
        assert_eq!(format_panic_payload(&payload), "panic message");

        let payload: Box<dyn std::any::Any + Send> = Box::new("owned panic".to_string());
        assert_eq!(format_panic_payload(&payload), "owned panic");

        let payload: Box<dyn std::any::Any + Send> = Box::new(42);
        assert_eq!(format_panic_payload(&payload), "unknown panic");
    }
}
