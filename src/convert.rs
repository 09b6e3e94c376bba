//! MIRIAD → FITS conversion
//!
//! The conversion itself is done by an external tool. [`Converter`] is the
//! seam: production code uses [`MiriadFits`], which runs the MIRIAD `fits`
//! task with `op=xyout`; tests substitute their own implementation.
//!
//! Calls are synchronous and never retried.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Default MIRIAD task used for conversion
pub const DEFAULT_FITS_PROGRAM: &str = "fits";

/// Bytes of stderr kept in a failure reason
const STDERR_TAIL_BYTES: usize = 512;

/// Conversion direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionMode {
    /// MIRIAD image → FITS file (`op=xyout`)
    Xyout,
}

impl ConversionMode {
    /// Value passed as the MIRIAD `op` keyword
    #[must_use]
    pub const fn as_op(self) -> &'static str {
        match self {
            Self::Xyout => "xyout",
        }
    }
}

/// One conversion request; lives only for the duration of a call
#[derive(Debug, Clone, Copy)]
pub struct ConversionJob<'a> {
    /// MIRIAD image directory
    pub source: &'a Path,
    /// FITS file to produce (inside a temporary workspace)
    pub destination: &'a Path,
    /// Conversion direction
    pub mode: ConversionMode,
}

impl<'a> ConversionJob<'a> {
    /// Export `source` to a FITS file at `destination`
    #[must_use]
    pub const fn xyout(source: &'a Path, destination: &'a Path) -> Self {
        Self {
            source,
            destination,
            mode: ConversionMode::Xyout,
        }
    }

    /// Build a [`Error::ConversionFailure`] for this job
    #[must_use]
    pub fn failure(&self, reason: impl Into<String>) -> Error {
        Error::ConversionFailure {
            source_path: self.source.to_path_buf(),
            destination: self.destination.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Check that the destination exists and is a non-empty file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConversionFailure`] otherwise
    pub fn verify_output(&self) -> Result<()> {
        match std::fs::metadata(self.destination) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
            Ok(_) => Err(self.failure("output file is empty or not a regular file")),
            Err(e) => Err(self.failure(format!("no output produced: {e}"))),
        }
    }
}

/// Directory-container to flat-file converter
pub trait Converter: Send + Sync {
    /// Run the conversion, blocking until it finishes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConversionFailure`] if no usable output was produced
    fn convert(&self, job: &ConversionJob<'_>) -> Result<()>;
}

impl<C: Converter + ?Sized> Converter for Box<C> {
    fn convert(&self, job: &ConversionJob<'_>) -> Result<()> {
        (**self).convert(job)
    }
}

/// Runs the MIRIAD `fits` task: `fits in=<src> out=<dst> op=xyout`
#[derive(Debug, Clone)]
pub struct MiriadFits {
    program: PathBuf,
}

impl Default for MiriadFits {
    fn default() -> Self {
        Self::new(DEFAULT_FITS_PROGRAM)
    }
}

impl MiriadFits {
    /// Use `program` (name on `PATH` or absolute path) as the `fits` task
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Program that will be executed
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, job: &ConversionJob<'_>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(keyword("in", job.source))
            .arg(keyword("out", job.destination))
            .arg(format!("op={}", job.mode.as_op()));
        cmd
    }
}

fn keyword(name: &str, path: &Path) -> String {
    format!("{name}={}", path.display())
}

impl Converter for MiriadFits {
    fn convert(&self, job: &ConversionJob<'_>) -> Result<()> {
        let mut cmd = self.command(job);
        tracing::debug!(command = ?cmd, "Running MIRIAD conversion");

        let output = cmd.output().map_err(|e| {
            job.failure(format!("failed to run {}: {e}", self.program.display()))
        })?;

        if !output.status.success() {
            return Err(job.failure(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr_tail(&output.stderr)
            )));
        }

        // MIRIAD tasks can exit 0 after printing a fatal message
        job.verify_output()
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}
