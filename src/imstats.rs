//! Image statistics orchestration
//!
//! Resolves the image format, converts MIRIAD images to FITS inside a scoped
//! workspace, reads the primary sample array and reduces it to
//! `{min, max, rms}`.
//!
//! Resource order: the FITS handle is closed before the workspace holding it
//! is released, and the workspace is released on every exit path.

use crate::convert::{ConversionJob, Converter, MiriadFits};
use crate::fits::FitsFile;
use crate::format::{ImageKind, ImageReference};
use crate::stats::{self, Backend, StatsResult};
use crate::workspace::{default_temp_root, TempWorkspaceManager, IMAGES_CATEGORY};
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding the temp root
pub const TMPDIR_ENV: &str = "APERCAL_TMPDIR";

/// Environment variable overriding the MIRIAD `fits` program
pub const FITS_PROGRAM_ENV: &str = "APERCAL_MIRIAD_FITS";

/// Serializable computer configuration
///
/// ```rust
/// use apercal_imstats::imstats::StatsConfig;
/// use apercal_imstats::Backend;
///
/// let config = StatsConfig::from_json(r#"{"temp_root": "/scratch/apercal", "backend": "scalar"}"#)?;
/// assert_eq!(config.backend, Backend::Scalar);
/// # Ok::<(), apercal_imstats::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatsConfig {
    /// Root for temporary workspaces (default `$TMPDIR/apercal`)
    pub temp_root: Option<PathBuf>,
    /// MIRIAD `fits` program (default `fits` on `PATH`)
    pub converter_program: Option<PathBuf>,
    /// Reduction backend
    pub backend: Backend,
}

impl StatsConfig {
    /// Parse a JSON configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on malformed JSON or unknown fields
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Defaults overridden by `APERCAL_TMPDIR` and `APERCAL_MIRIAD_FITS`
    #[must_use]
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var_os(name).filter(|v| !v.is_empty()).map(PathBuf::from);
        Self {
            temp_root: var(TMPDIR_ENV),
            converter_program: var(FITS_PROGRAM_ENV),
            backend: Backend::default(),
        }
    }

    /// Builder seeded with this configuration
    #[must_use]
    pub fn builder(&self) -> ImageStatsComputerBuilder {
        let mut builder = ImageStatsComputer::builder().backend(self.backend);
        if let Some(root) = &self.temp_root {
            builder = builder.temp_root(root);
        }
        if let Some(program) = &self.converter_program {
            builder = builder.converter(MiriadFits::new(program));
        }
        builder
    }
}

/// Computes `{min, max, rms}` for MIRIAD or FITS images
pub struct ImageStatsComputer {
    workspaces: TempWorkspaceManager,
    converter: Box<dyn Converter>,
    backend: Backend,
}

impl std::fmt::Debug for ImageStatsComputer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageStatsComputer")
            .field("workspaces", &self.workspaces)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl Default for ImageStatsComputer {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ImageStatsComputer {
    /// Create a new computer builder
    #[must_use]
    pub fn builder() -> ImageStatsComputerBuilder {
        ImageStatsComputerBuilder::default()
    }

    /// Workspace manager used for conversion artifacts
    #[must_use]
    pub const fn workspaces(&self) -> &TempWorkspaceManager {
        &self.workspaces
    }

    /// Reduction backend
    #[must_use]
    pub const fn backend(&self) -> Backend {
        self.backend
    }

    /// Compute statistics for the image at `path`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if `path` is neither a directory nor a file
    /// - [`Error::Workspace`] if the conversion workspace cannot be created
    /// - [`Error::ConversionFailure`] if MIRIAD → FITS export fails
    /// - [`Error::ReadFailure`] if the FITS file cannot be parsed
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn compute_stats<P: AsRef<Path>>(&self, path: P) -> Result<StatsResult> {
        self.compute(&ImageReference::resolve(path.as_ref()))
    }

    /// Compute statistics for an already resolved reference.
    ///
    /// # Errors
    ///
    /// See [`ImageStatsComputer::compute_stats`]
    pub fn compute(&self, reference: &ImageReference) -> Result<StatsResult> {
        tracing::debug!(kind = %reference.kind(), "Classified image");

        let samples = self.load_samples(reference)?;
        let stats = stats::summarize(&samples, self.backend);

        if stats.is_undefined() {
            tracing::info!(samples = samples.len(), "Image has no valid samples");
        } else {
            tracing::info!(min = stats.min(), max = stats.max(), rms = stats.rms(), "Computed image statistics");
        }
        Ok(stats)
    }

    fn load_samples(&self, reference: &ImageReference) -> Result<Vec<f64>> {
        match reference.kind() {
            ImageKind::Missing => Err(Error::NotFound {
                path: reference.path().to_path_buf(),
            }),
            ImageKind::FlatFile => read_samples(reference.path()),
            ImageKind::DirectoryContainer => {
                // Dropping the workspace on any early return removes the artifact
                let mut workspace = self.workspaces.acquire(IMAGES_CATEGORY)?;
                let destination = workspace.artifact_path("fits");

                self.converter
                    .convert(&ConversionJob::xyout(reference.path(), &destination))?;
                let samples = read_samples(&destination)?;

                if let Err(e) = workspace.release() {
                    tracing::warn!(error = %e, "Failed to release conversion workspace");
                }
                Ok(samples)
            }
        }
    }
}

/// Open, read and close a FITS file, closing even when the read fails
fn read_samples(path: &Path) -> Result<Vec<f64>> {
    let mut file = FitsFile::open(path)?;
    let image = file.read_primary();
    file.close();
    Ok(image?.into_data())
}

/// Builder for [`ImageStatsComputer`]
#[derive(Default)]
pub struct ImageStatsComputerBuilder {
    temp_root: Option<PathBuf>,
    converter: Option<Box<dyn Converter>>,
    backend: Backend,
}

impl ImageStatsComputerBuilder {
    /// Root directory for temporary workspaces
    #[must_use]
    pub fn temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// Converter used for MIRIAD images
    #[must_use]
    pub fn converter(mut self, converter: impl Converter + 'static) -> Self {
        self.converter = Some(Box::new(converter));
        self
    }

    /// Reduction backend
    #[must_use]
    pub const fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Build the computer
    #[must_use]
    pub fn build(self) -> ImageStatsComputer {
        ImageStatsComputer {
            workspaces: TempWorkspaceManager::new(self.temp_root.unwrap_or_else(default_temp_root)),
            converter: self
                .converter
                .unwrap_or_else(|| Box::new(MiriadFits::default())),
            backend: self.backend,
        }
    }
}

/// Compute statistics with the environment-derived configuration.
///
/// # Errors
///
/// See [`ImageStatsComputer::compute_stats`]
pub fn compute_stats<P: AsRef<Path>>(path: P) -> Result<StatsResult> {
    StatsConfig::from_env().builder().build().compute_stats(path)
}
