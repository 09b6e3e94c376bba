//! FITS flat-file images (primary HDU only)
//!
//! Thin adapter over `fitsio`: the library parses the header and applies
//! `BSCALE`/`BZERO`; this module maps integer `BLANK` samples to NaN and
//! reports every library failure as [`Error::ReadFailure`]. Extensions after
//! the primary HDU are never touched.
//!
//! ```rust,no_run
//! use apercal_imstats::fits::FitsFile;
//!
//! let mut file = FitsFile::open("image.fits")?;
//! let image = file.read_primary()?;
//! file.close();
//! println!("{:?}: {} samples", image.shape(), image.data().len());
//! # Ok::<(), apercal_imstats::Error>(())
//! ```

mod writer;

pub use writer::{write_primary_image, PrimaryImageWriter};

use crate::{Error, Result};
use fitsio::hdu::HduInfo;
use fitsio::images::ImageType;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// CFITSIO keeps a global table of open files and is not built reentrant
static LIBRARY: Mutex<()> = Mutex::new(());

pub(crate) fn library_lock() -> MutexGuard<'static, ()> {
    LIBRARY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// FITS logical record size; every header occupies at least one
pub const BLOCK_SIZE: usize = 2880;

/// FITS pixel encoding (`BITPIX`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bitpix {
    /// 8-bit unsigned integer
    U8,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// IEEE single precision
    F32,
    /// IEEE double precision
    F64,
}

impl Bitpix {
    /// `BITPIX` keyword value
    #[must_use]
    pub const fn keyword(self) -> i64 {
        match self {
            Self::U8 => 8,
            Self::I16 => 16,
            Self::I32 => 32,
            Self::I64 => 64,
            Self::F32 => -32,
            Self::F64 => -64,
        }
    }

    /// Bytes per sample
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::I16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    /// True for integer encodings (where `BLANK` applies)
    #[must_use]
    pub const fn is_integer(self) -> bool {
        !matches!(self, Self::F32 | Self::F64)
    }

    const fn from_image_type(image_type: &ImageType) -> Self {
        match image_type {
            ImageType::UnsignedByte | ImageType::Byte => Self::U8,
            ImageType::Short | ImageType::UnsignedShort => Self::I16,
            ImageType::Long | ImageType::UnsignedLong => Self::I32,
            ImageType::LongLong => Self::I64,
            ImageType::Float => Self::F32,
            ImageType::Double => Self::F64,
        }
    }

    pub(crate) const fn image_type(self) -> ImageType {
        match self {
            Self::U8 => ImageType::UnsignedByte,
            Self::I16 => ImageType::Short,
            Self::I32 => ImageType::Long,
            Self::I64 => ImageType::LongLong,
            Self::F32 => ImageType::Float,
            Self::F64 => ImageType::Double,
        }
    }
}

/// Primary image: encoding, shape and physical sample values
#[derive(Debug, Clone)]
pub struct FitsImage {
    bitpix: Bitpix,
    shape: Vec<usize>,
    blank: Option<i64>,
    data: Vec<f64>,
}

impl FitsImage {
    /// Storage encoding of the samples
    #[must_use]
    pub const fn bitpix(&self) -> Bitpix {
        self.bitpix
    }

    /// Axis lengths in FITS order (`NAXIS1` first)
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// `BLANK` value of an integer image, if declared
    #[must_use]
    pub const fn blank(&self) -> Option<i64> {
        self.blank
    }

    /// Physical sample values, `NAXIS1` fastest
    #[must_use]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Take ownership of the samples
    #[must_use]
    pub fn into_data(self) -> Vec<f64> {
        self.data
    }
}

/// An open FITS file.
///
/// The underlying handle is closed by [`FitsFile::close`] or on drop.
pub struct FitsFile {
    path: PathBuf,
    len: u64,
    inner: Option<fitsio::FitsFile>,
}

impl std::fmt::Debug for FitsFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitsFile")
            .field("path", &self.path)
            .field("len", &self.len)
            .field("open", &self.inner.is_some())
            .finish()
    }
}

impl FitsFile {
    /// Open a FITS file for reading
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadFailure`] if the file cannot be opened or is not
    /// a FITS file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let len = std::fs::metadata(&path)
            .map_err(|e| Error::read_failure(&path, format!("failed to open: {e}")))?
            .len();
        let inner = {
            let _lock = library_lock();
            fitsio::FitsFile::open(&path)
                .map_err(|e| Error::read_failure(&path, format!("failed to open: {e}")))?
        };
        Ok(Self {
            path,
            len,
            inner: Some(inner),
        })
    }

    /// Path this file was opened from
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the primary header and data array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadFailure`] if the primary HDU is not an image, or
    /// its declared data unit does not fit in the file
    pub fn read_primary(&mut self) -> Result<FitsImage> {
        let path = &self.path;
        let failure = |e: fitsio::errors::Error| Error::read_failure(path, e.to_string());
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| Error::read_failure(path, "file is closed"))?;
        let _lock = library_lock();

        let hdu = inner.primary_hdu().map_err(failure)?;
        let (fits_shape, bitpix) = match &hdu.info {
            HduInfo::ImageInfo { shape, image_type } => {
                (shape.clone(), Bitpix::from_image_type(image_type))
            }
            HduInfo::TableInfo { .. } | HduInfo::AnyInfo => {
                return Err(Error::read_failure(path, "primary HDU is not an image"));
            }
        };
        // fitsio reports axes slowest first
        let shape: Vec<usize> = fits_shape.iter().rev().copied().collect();

        let count = if shape.is_empty() {
            0
        } else {
            shape
                .iter()
                .try_fold(1usize, |acc, &n| acc.checked_mul(n))
                .ok_or_else(|| Error::read_failure(path, "data array size overflows"))?
        };
        check_data_fits(path, self.len, count, bitpix)?;

        let blank = if bitpix.is_integer() {
            hdu.read_key::<i64>(inner, "BLANK").ok()
        } else {
            None
        };

        let mut data: Vec<f64> = if count == 0 {
            Vec::new()
        } else {
            hdu.read_image(inner).map_err(failure)?
        };

        if let Some(blank) = blank {
            let bscale = hdu.read_key::<f64>(inner, "BSCALE").unwrap_or(1.0);
            let bzero = hdu.read_key::<f64>(inner, "BZERO").unwrap_or(0.0);
            mask_blank(&mut data, blank, bscale, bzero);
        }

        tracing::debug!(
            path = %path.display(),
            bitpix = bitpix.keyword(),
            ?shape,
            "Read FITS primary image"
        );

        Ok(FitsImage {
            bitpix,
            shape,
            blank,
            data,
        })
    }

    /// Close the file handle
    pub fn close(mut self) {
        self.release();
        tracing::trace!(path = %self.path.display(), "Closed FITS file");
    }

    fn release(&mut self) {
        if let Some(inner) = self.inner.take() {
            let _lock = library_lock();
            drop(inner);
        }
    }
}

impl Drop for FitsFile {
    fn drop(&mut self) {
        self.release();
    }
}

/// Reject data units larger than the file before anything is allocated
fn check_data_fits(path: &Path, file_len: u64, count: usize, bitpix: Bitpix) -> Result<()> {
    let byte_len = count
        .checked_mul(bitpix.bytes())
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| Error::read_failure(path, "data array size overflows"))?;
    let available = file_len.saturating_sub(BLOCK_SIZE as u64);
    if byte_len > available {
        return Err(Error::read_failure(
            path,
            format!("truncated data unit ({byte_len} bytes declared, at most {available} present)"),
        ));
    }
    Ok(())
}

/// Open, read and close in one step
///
/// # Errors
///
/// See [`FitsFile::open`] and [`FitsFile::read_primary`]
pub fn read_primary_image<P: AsRef<Path>>(path: P) -> Result<FitsImage> {
    let mut file = FitsFile::open(path)?;
    let image = file.read_primary();
    file.close();
    image
}

/// Replace samples whose stored integer equals `blank` with NaN.
///
/// `fitsio` hands back scaled values, so the stored integer is recovered by
/// inverting `BSCALE`/`BZERO` and rounding.
#[allow(clippy::cast_precision_loss, clippy::float_cmp)]
fn mask_blank(data: &mut [f64], blank: i64, bscale: f64, bzero: f64) {
    let blank = blank as f64;
    for value in data.iter_mut() {
        if ((*value - bzero) / bscale).round() == blank {
            *value = f64::NAN;
        }
    }
}
