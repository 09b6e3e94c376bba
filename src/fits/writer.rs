//! Primary-image writer
//!
//! Produces single-HDU files through `fitsio`. Used for fixtures and demos.

use super::Bitpix;
use crate::Result;
use fitsio::images::ImageDescription;
use fitsio::FitsFile;
use std::io;
use std::path::Path;

/// Write `data` as a `BITPIX = -64` primary image of the given shape.
///
/// # Errors
///
/// Returns error if the shape does not match the data length or the file
/// cannot be written
pub fn write_primary_image<P: AsRef<Path>>(path: P, shape: &[usize], data: &[f64]) -> Result<()> {
    PrimaryImageWriter::new(shape, Bitpix::F64).write(path, data)
}

/// Primary-image writer with configurable encoding and scaling
#[derive(Debug, Clone)]
pub struct PrimaryImageWriter {
    shape: Vec<usize>,
    bitpix: Bitpix,
    bscale: f64,
    bzero: f64,
    blank: Option<i64>,
    strings: Vec<(String, String)>,
}

/// Integer samples as stored on disk
enum Stored {
    U8(Vec<u8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

fn invalid(message: String) -> crate::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message).into()
}

fn fits_error(e: fitsio::errors::Error) -> crate::Error {
    io::Error::other(e.to_string()).into()
}

impl PrimaryImageWriter {
    /// Writer for an image of `shape` (FITS axis order) stored as `bitpix`
    #[must_use]
    pub fn new(shape: &[usize], bitpix: Bitpix) -> Self {
        Self {
            shape: shape.to_vec(),
            bitpix,
            bscale: 1.0,
            bzero: 0.0,
            blank: None,
            strings: Vec::new(),
        }
    }

    /// `BSCALE`/`BZERO`; samples are stored as `(value - BZERO) / BSCALE`
    #[must_use]
    pub const fn scaling(mut self, bscale: f64, bzero: f64) -> Self {
        self.bscale = bscale;
        self.bzero = bzero;
        self
    }

    /// `BLANK` value written for NaN samples of integer encodings
    #[must_use]
    pub const fn blank(mut self, blank: i64) -> Self {
        self.blank = Some(blank);
        self
    }

    /// Extra string keyword such as `BUNIT`
    #[must_use]
    pub fn keyword(mut self, name: &str, value: &str) -> Self {
        self.strings.push((name.to_ascii_uppercase(), value.to_string()));
        self
    }

    /// Write the image, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns [`std::io::ErrorKind::InvalidInput`] if `data.len()` does not
    /// match the shape or a sample (or `BLANK`) does not fit the integer
    /// encoding, and an I/O error if the file cannot be written
    pub fn write<P: AsRef<Path>>(&self, path: P, data: &[f64]) -> Result<()> {
        let expected: usize = if self.shape.is_empty() {
            0
        } else {
            self.shape.iter().product()
        };
        if data.len() != expected {
            return Err(invalid(format!(
                "shape {:?} needs {expected} samples, got {}",
                self.shape,
                data.len()
            )));
        }

        let path = path.as_ref();
        let _lock = super::library_lock();
        if self.shape.is_empty() {
            FitsFile::create(path).overwrite().open().map_err(fits_error)?;
            return Ok(());
        }

        // fitsio takes axes slowest first
        let dimensions: Vec<usize> = self.shape.iter().rev().copied().collect();
        let description = ImageDescription {
            data_type: self.bitpix.image_type(),
            dimensions: &dimensions,
        };
        let mut file = FitsFile::create(path)
            .with_custom_primary(&description)
            .overwrite()
            .open()
            .map_err(fits_error)?;
        let hdu = file.primary_hdu().map_err(fits_error)?;

        // Data goes in before the scaling keywords so fitsio stores it verbatim
        let stored: Vec<f64> = data.iter().map(|&v| (v - self.bzero) / self.bscale).collect();
        match self.bitpix {
            Bitpix::F32 => {
                #[allow(clippy::cast_possible_truncation)]
                let samples: Vec<f32> = stored.iter().map(|&v| v as f32).collect();
                hdu.write_image(&mut file, &samples)
            }
            Bitpix::F64 => hdu.write_image(&mut file, &stored),
            _ => match self.encode_integers(&stored)? {
                Stored::U8(v) => hdu.write_image(&mut file, &v),
                Stored::I16(v) => hdu.write_image(&mut file, &v),
                Stored::I32(v) => hdu.write_image(&mut file, &v),
                Stored::I64(v) => hdu.write_image(&mut file, &v),
            },
        }
        .map_err(fits_error)?;

        if self.is_scaled() {
            hdu.write_key(&mut file, "BSCALE", self.bscale).map_err(fits_error)?;
            hdu.write_key(&mut file, "BZERO", self.bzero).map_err(fits_error)?;
        }
        if let (Some(blank), true) = (self.blank, self.bitpix.is_integer()) {
            hdu.write_key(&mut file, "BLANK", blank).map_err(fits_error)?;
        }
        for (name, value) in &self.strings {
            hdu.write_key(&mut file, name, value.as_str()).map_err(fits_error)?;
        }
        Ok(())
    }

    #[allow(clippy::float_cmp)]
    fn is_scaled(&self) -> bool {
        self.bscale != 1.0 || self.bzero != 0.0
    }

    /// Round and range-check stored values; NaN becomes `BLANK` (or 0)
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn encode_integers(&self, stored: &[f64]) -> Result<Stored> {
        let blank = self.blank.unwrap_or(0);
        let values = stored
            .iter()
            .map(|&v| {
                if v.is_nan() {
                    return Ok(blank);
                }
                let rounded = v.round();
                // i64::MAX as f64 rounds up to 2^63, which is out of range
                if rounded >= -(i64::MIN as f64) || rounded < i64::MIN as f64 {
                    Err(self.out_of_range(v))
                } else {
                    Ok(rounded as i64)
                }
            })
            .collect::<Result<Vec<i64>>>()?;

        Ok(match self.bitpix {
            Bitpix::U8 => Stored::U8(self.narrow(&values)?),
            Bitpix::I16 => Stored::I16(self.narrow(&values)?),
            Bitpix::I32 => Stored::I32(self.narrow(&values)?),
            Bitpix::I64 | Bitpix::F32 | Bitpix::F64 => Stored::I64(values),
        })
    }

    /// Convert to the storage type; `BLANK` must fit even if unused
    fn narrow<T: TryFrom<i64>>(&self, values: &[i64]) -> Result<Vec<T>> {
        if let Some(blank) = self.blank {
            T::try_from(blank).map_err(|_| self.out_of_range(blank))?;
        }
        values
            .iter()
            .map(|&v| T::try_from(v).map_err(|_| self.out_of_range(v)))
            .collect()
    }

    fn out_of_range(&self, value: impl std::fmt::Display) -> crate::Error {
        invalid(format!("value {value} does not fit BITPIX {}", self.bitpix.keyword()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::{read_primary_image, BLOCK_SIZE};
    use super::*;

    #[test]
    fn test_file_is_block_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.fits");
        write_primary_image(&path, &[3, 5], &[1.0; 15]).unwrap();

        let len = std::fs::metadata(&path).unwrap().len() as usize;
        assert_eq!(len % BLOCK_SIZE, 0);
        assert_eq!(len, 2 * BLOCK_SIZE);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = write_primary_image(dir.path().join("img.fits"), &[2, 2], &[1.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_existing_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.fits");
        write_primary_image(&path, &[2], &[1.0, 2.0]).unwrap();
        write_primary_image(&path, &[3], &[7.0, 8.0, 9.0]).unwrap();

        assert_eq!(read_primary_image(&path).unwrap().data(), &[7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_scaled_integer_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("int.fits");
        PrimaryImageWriter::new(&[4], Bitpix::I16)
            .scaling(0.5, 100.0)
            .blank(-32768)
            .write(&path, &[100.0, 101.5, f64::NAN, 90.0])
            .unwrap();

        let image = read_primary_image(&path).unwrap();
        let data = image.data();
        assert_eq!(image.bitpix(), Bitpix::I16);
        assert_eq!(image.blank(), Some(-32768));
        assert!((data[0] - 100.0).abs() < 1e-12);
        assert!((data[1] - 101.5).abs() < 1e-12);
        assert!(data[2].is_nan());
        assert!((data[3] - 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_f32_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f32.fits");
        PrimaryImageWriter::new(&[2, 1, 1], Bitpix::F32)
            .keyword("BUNIT", "JY/BEAM")
            .write(&path, &[0.25, f64::NAN])
            .unwrap();

        let image = read_primary_image(&path).unwrap();
        assert_eq!(image.shape(), &[2, 1, 1]);
        assert_eq!(image.bitpix(), Bitpix::F32);
        assert!((image.data()[0] - 0.25).abs() < f64::EPSILON);
        assert!(image.data()[1].is_nan());
    }

    #[test]
    fn test_blank_out_of_range_for_encoding_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("u8.fits");
        let err = PrimaryImageWriter::new(&[2], Bitpix::U8)
            .blank(-32768)
            .write(&path, &[1.0, f64::NAN])
            .unwrap_err();

        assert!(err.to_string().contains("-32768"), "{err}");
    }

    #[test]
    fn test_sample_out_of_range_for_encoding_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("i16.fits");
        let result = PrimaryImageWriter::new(&[2], Bitpix::I16).write(&path, &[1.0, 40_000.0]);
        assert!(result.is_err());

        let result = PrimaryImageWriter::new(&[1], Bitpix::U8).write(&path, &[-1.0]);
        assert!(result.is_err());
    }
}
