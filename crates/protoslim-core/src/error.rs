//! Error types for the protoslim-core library.
//!
//! Every failure here is terminal for a batch: nothing is retried and nothing
//! is rolled back. The variants map onto the stages of a projection run
//! (enumeration, parsing, writing, formatting) so callers can tell which stage
//! stopped the batch.

use crate::gosrc::ParseError;
use crate::projector::CommitMode;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for protoslim operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all protoslim operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The target directory could not be listed
    #[error("failed to enumerate '{path}': {source}")]
    Enumerate {
        /// Root that was being walked
        path: PathBuf,
        /// Underlying walk error
        #[source]
        source: walkdir::Error,
    },

    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to truncate or write a projected file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A generated file could not be parsed as Go source
    #[error("failed to parse '{path}': {source}")]
    Parse {
        /// Offending file
        path: PathBuf,
        /// Parser diagnostic
        #[source]
        source: ParseError,
    },

    /// A generated file is not valid UTF-8
    #[error("file '{path}' is not valid UTF-8")]
    InvalidUtf8 {
        /// Offending file
        path: PathBuf,
    },

    /// An external formatter could not be started
    #[error("failed to run formatter '{tool}': {source}")]
    FormatterSpawn {
        /// Program name
        tool: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// An external formatter exited unsuccessfully
    #[error("formatter '{tool}' failed ({status}):\n{output}")]
    FormatterFailed {
        /// Program name
        tool: String,
        /// Exit status description
        status: String,
        /// Combined stdout and stderr of the tool
        output: String,
    },

    /// Failed to read a configuration file
    #[error("failed to read config '{path}': {source}")]
    ConfigRead {
        /// Config file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Configuration file contents are invalid
    #[error("invalid config '{path}': {source}")]
    ConfigParse {
        /// Config file path
        path: PathBuf,
        /// TOML decode error
        #[source]
        source: toml::de::Error,
    },

    /// Configuration values are inconsistent
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Creates a new enumeration error
    pub fn enumerate(path: impl Into<PathBuf>, source: walkdir::Error) -> Self {
        Self::Enumerate {
            path: path.into(),
            source,
        }
    }

    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new file write error
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a new parse error for a file
    pub fn parse(path: impl Into<PathBuf>, source: ParseError) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }

    /// Creates a new configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Path of the file this error is about, if any
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Enumerate { path, .. }
            | Self::FileRead { path, .. }
            | Self::FileWrite { path, .. }
            | Self::Parse { path, .. }
            | Self::InvalidUtf8 { path }
            | Self::ConfigRead { path, .. }
            | Self::ConfigParse { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Returns true if files may already have been rewritten when this error
    /// stopped a batch committed with `commit`
    pub fn may_leave_partial_batch(&self, commit: CommitMode) -> bool {
        match self {
            Self::FileWrite { .. } | Self::FormatterSpawn { .. } | Self::FormatterFailed { .. } => {
                true
            }
            Self::Parse { .. } | Self::InvalidUtf8 { .. } | Self::FileRead { .. } => {
                commit == CommitMode::FailFast
            }
            _ => false,
        }
    }
}
