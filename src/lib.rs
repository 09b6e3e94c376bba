//! # apercal-imstats: Image Statistics for Calibration Pipelines
//!
//! Computes NaN-aware `{min, max, rms}` statistics of radio images stored
//! either as MIRIAD directories or FITS files.
//!
//! MIRIAD images are exported to FITS with the MIRIAD `fits` task
//! (`op=xyout`) inside a per-call temporary workspace, which is removed on
//! every exit path, including failed conversions and unreadable output.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use apercal_imstats::{Backend, ImageStatsComputer};
//!
//! let computer = ImageStatsComputer::builder()
//!     .temp_root("/scratch/apercal")
//!     .backend(Backend::Simd)
//!     .build();
//!
//! let stats = computer.compute_stats("/data/NGC807/image.mir")?;
//! println!("min={} max={} rms={}", stats.min(), stats.max(), stats.rms());
//! # Ok::<(), apercal_imstats::Error>(())
//! ```
//!
//! ## Failure Stages
//!
//! | Stage | Error |
//! |-------|-------|
//! | path is neither directory nor file | [`Error::NotFound`] |
//! | MIRIAD export | [`Error::ConversionFailure`] |
//! | FITS parsing | [`Error::ReadFailure`] |
//!
//! An image without valid samples is not an error: all three statistics
//! are NaN ([`StatsResult::is_undefined`]).

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod convert;
pub mod error;
pub mod fits;
pub mod format;
pub mod imstats;
pub mod stats;
pub mod workspace;

pub use convert::{ConversionJob, Converter, MiriadFits};
pub use error::{Error, Result};
pub use format::{classify, ImageKind, ImageReference};
pub use imstats::{compute_stats, ImageStatsComputer, ImageStatsComputerBuilder, StatsConfig};
pub use stats::{Backend, StatsResult};
pub use workspace::{TempWorkspace, TempWorkspaceManager};
