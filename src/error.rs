//! Error types for apercal-imstats
//!
//! Every failing stage is reported to the caller with the path involved.
//! Undefined statistics (no valid samples) are NOT an error, see
//! [`StatsResult::is_undefined`](crate::stats::StatsResult::is_undefined).

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Image statistics error types
#[derive(Error, Debug)]
pub enum Error {
    /// Input path is neither a directory nor a regular file
    #[error("Image not found: {}\nOnly MIRIAD (directory) and FITS (file) images are supported", path.display())]
    NotFound {
        /// Path that was classified as missing
        path: PathBuf,
    },

    /// External conversion tool did not produce a usable output
    #[error("Conversion failed: {} -> {}: {reason}", source_path.display(), destination.display())]
    ConversionFailure {
        /// MIRIAD image that was being exported
        source_path: PathBuf,
        /// Expected FITS output
        destination: PathBuf,
        /// Exit status, spawn error or missing output
        reason: String,
    },

    /// Flat-file reader could not parse the file
    #[error("Failed to read FITS image {}: {reason}", path.display())]
    ReadFailure {
        /// FITS file being read
        path: PathBuf,
        /// Parse or I/O failure description
        reason: String,
    },

    /// Temporary workspace could not be allocated
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn read_failure(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ReadFailure {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
