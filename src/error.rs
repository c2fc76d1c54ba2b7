//! Pipeline error types.

use crate::core::edge::EdgeError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while assembling or running a pipeline.
///
/// Nothing here is retried: configuration, I/O and data errors are fatal to
/// the run, and the first process to fail cancels the whole pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Process '{process}': cannot declare port '{port}': {reason}")]
    Declaration {
        process: String,
        port: String,
        reason: String,
    },

    #[error("Type mismatch connecting {from} ({from_type}) to {to} ({to_type})")]
    TypeMismatch {
        from: String,
        from_type: String,
        to: String,
        to_type: String,
    },

    #[error("Unknown process '{0}'")]
    UnknownProcess(String),

    #[error("Unknown process type '{0}'")]
    UnknownProcessType(String),

    #[error("Process '{process}' has no {direction} port '{port}'")]
    UnknownPort {
        process: String,
        port: String,
        direction: &'static str,
    },

    #[error("Input port {0} is already connected")]
    PortAlreadyConnected(String),

    #[error("Required port {0} is not connected")]
    UnconnectedRequiredPort(String),

    #[error("Configuration error in '{process}': {message}")]
    Configuration { process: String, message: String },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Data error in '{process}': {message}")]
    RuntimeData { process: String, message: String },

    #[error("Invalid state transition for '{process}': {from} -> {to}")]
    InvalidTransition {
        process: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("Process task for '{0}' panicked or was aborted")]
    TaskFailed(String),

    #[error(transparent)]
    Edge(#[from] EdgeError),
}

impl PipelineError {
    pub fn config(process: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            process: process.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn data(process: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RuntimeData {
            process: process.into(),
            message: message.into(),
        }
    }

    /// True when this error only reports that the pipeline was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Edge(EdgeError::Cancelled))
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
