//! Image format resolution
//!
//! MIRIAD images are directories of auxiliary files, FITS images are single
//! files. Classification is a pure existence check: nothing is opened.

use std::fmt;
use std::path::{Path, PathBuf};

/// Container format of an image reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    /// MIRIAD directory container (needs conversion before reading)
    DirectoryContainer,
    /// FITS flat file (read directly)
    FlatFile,
    /// Neither a directory nor a regular file
    Missing,
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DirectoryContainer => "MIRIAD",
            Self::FlatFile => "FITS",
            Self::Missing => "missing",
        };
        f.write_str(name)
    }
}

/// Classify a path as directory container, flat file or missing.
///
/// Symlinks are followed. Paths that exist but are neither (sockets, broken
/// links, permission-denied lookups) are reported as [`ImageKind::Missing`].
#[must_use]
pub fn classify<P: AsRef<Path>>(path: P) -> ImageKind {
    match std::fs::metadata(path.as_ref()) {
        Ok(meta) if meta.is_dir() => ImageKind::DirectoryContainer,
        Ok(meta) if meta.is_file() => ImageKind::FlatFile,
        _ => ImageKind::Missing,
    }
}

/// A path together with its resolved [`ImageKind`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    path: PathBuf,
    kind: ImageKind,
}

impl ImageReference {
    /// Resolve the kind of `path` once; the reference is immutable afterwards.
    #[must_use]
    pub fn resolve(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let kind = classify(&path);
        Self { path, kind }
    }

    /// Path as given by the caller
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Kind resolved at construction
    #[must_use]
    pub const fn kind(&self) -> ImageKind {
        self.kind
    }
}
