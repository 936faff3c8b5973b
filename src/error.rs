//! Error handling for pipeport
//!
//! Only failures of the underlying channel surface as errors. Protocol
//! sequence anomalies (phase calls made out of order, kind mismatches) are
//! recovered locally by the ports and reported through diagnostics instead.

use crate::types::{ProcessId, Tag};
use thiserror::Error;

/// Main error type for pipeport operations
#[derive(Error, Debug)]
pub enum PortError {
    /// The peer endpoint went away while a message was in flight
    #[error("Channel error: {0}")]
    Channel(String),

    /// A message could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A message of an unexpected shape arrived on a tag
    #[error("Unexpected message from process {from} on tag {tag}: expected {expected}")]
    UnexpectedMessage {
        from: ProcessId,
        tag: Tag,
        expected: &'static str,
    },

    /// No endpoint exists for the addressed process
    #[error("Unknown process {0}")]
    UnknownProcess(ProcessId),

    /// A blocking receive exceeded the configured timeout
    #[error("Timeout: no message from process {from} on tag {tag} after {millis} ms")]
    Timeout { from: ProcessId, tag: Tag, millis: u64 },

    /// The local pipeline stage behind a producer failed to execute
    #[error("Source error: {0}")]
    Source(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PortError>,
    },
}

impl PortError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PortError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error came from the channel layer (disconnect, codec, timeout).
    ///
    /// These terminate the affected pipeline branch; the ports never retry them.
    pub fn is_channel_failure(&self) -> bool {
        match self {
            PortError::Channel(_)
            | PortError::Serialization(_)
            | PortError::UnexpectedMessage { .. }
            | PortError::UnknownProcess(_)
            | PortError::Timeout { .. } => true,
            PortError::WithContext { source, .. } => source.is_channel_failure(),
            _ => false,
        }
    }
}

/// Result type alias for pipeport operations
pub type Result<T> = std::result::Result<T, PortError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
