//! Scoped temporary workspaces for conversion artifacts
//!
//! Layout: `{root}/{category}/{uuid}/{NAME}.{ext}`
//!
//! Every call gets its own UUID subdirectory inside the shared category
//! directory, so concurrent computations (threads or processes) never write
//! into or remove each other's directories. A [`TempWorkspace`] removes its
//! subdirectory when released or dropped, on success and error paths alike.
//! The category directory itself is removed only once it is empty.

use crate::{Error, Result};
use rand::Rng;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Length of generated artifact names
pub const NAME_LEN: usize = 8;

/// Symbols artifact names are drawn from
pub const NAME_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Default category for converted images
pub const IMAGES_CATEGORY: &str = "images";

const ACQUIRE_ATTEMPTS: usize = 3;

/// Generate an 8-character artifact name over `[A-Z0-9]`.
///
/// Each character is drawn independently and uniformly from
/// [`NAME_ALPHABET`] with the thread-local CSPRNG, giving `36^8 ≈ 2.8e12`
/// equally likely names. See [`collision_probability`] for the bound.
#[must_use]
pub fn generate_name() -> String {
    let mut rng = rand::thread_rng();
    (0..NAME_LEN)
        .map(|_| char::from(NAME_ALPHABET[rng.gen_range(0..NAME_ALPHABET.len())]))
        .collect()
}

/// Birthday-bound probability that `draws` generated names contain a clash.
///
/// `P ≈ 1 - exp(-n(n-1) / 2N)` with `N = 36^8`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn collision_probability(draws: u64) -> f64 {
    let space = (NAME_ALPHABET.len() as f64).powi(NAME_LEN as i32);
    let n = draws as f64;
    -(-(n * (n - 1.0)) / (2.0 * space)).exp_m1()
}

/// Allocates per-call workspaces under a temp root
#[derive(Debug, Clone)]
pub struct TempWorkspaceManager {
    root: PathBuf,
}

impl Default for TempWorkspaceManager {
    fn default() -> Self {
        Self::new(default_temp_root())
    }
}

/// `$TMPDIR/apercal`
#[must_use]
pub fn default_temp_root() -> PathBuf {
    std::env::temp_dir().join("apercal")
}

impl TempWorkspaceManager {
    /// Create a manager rooted at `root` (created lazily on first acquire)
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Temp root all categories live under
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory shared by every workspace of `category`
    #[must_use]
    pub fn category_dir(&self, category: &str) -> PathBuf {
        self.root.join(category)
    }

    /// Acquire a fresh workspace in `category`.
    ///
    /// Creates the category directory if absent, then a unique subdirectory
    /// owned by the returned handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Workspace`] if `category` is not a single plain path
    /// component, or if the directories cannot be created.
    pub fn acquire(&self, category: &str) -> Result<TempWorkspace> {
        validate_category(category)?;

        let category_dir = self.category_dir(category);
        let dir = category_dir.join(Uuid::new_v4().simple().to_string());

        // A concurrent release may remove the empty category directory between
        // create_dir_all's parent and child steps.
        let mut attempt = 0;
        loop {
            attempt += 1;
            match std::fs::create_dir_all(&dir) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::NotFound && attempt < ACQUIRE_ATTEMPTS => {}
                Err(e) => {
                    return Err(Error::Workspace(format!(
                        "failed to create {}: {e}",
                        dir.display()
                    )))
                }
            }
        }

        tracing::debug!(category, path = %dir.display(), "Acquired temporary workspace");

        Ok(TempWorkspace {
            category: category.to_string(),
            category_dir,
            dir,
            artifacts: BTreeSet::new(),
            released: false,
        })
    }

    /// Release a workspace, removing its directory and every artifact in it.
    ///
    /// # Errors
    ///
    /// Returns error if the workspace directory exists but cannot be removed
    pub fn release(&self, workspace: TempWorkspace) -> Result<()> {
        workspace.release()
    }
}

fn validate_category(category: &str) -> Result<()> {
    let mut components = Path::new(category).components();
    match (components.next(), components.next()) {
        (Some(std::path::Component::Normal(_)), None) => Ok(()),
        _ => Err(Error::Workspace(format!(
            "invalid workspace category {category:?}: must be a single directory name"
        ))),
    }
}

/// Temporary directory owned by one computation.
///
/// Released explicitly with [`TempWorkspace::release`] or implicitly on drop.
#[derive(Debug)]
pub struct TempWorkspace {
    category: String,
    category_dir: PathBuf,
    dir: PathBuf,
    artifacts: BTreeSet<String>,
    released: bool,
}

impl TempWorkspace {
    /// Category this workspace was acquired in
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Directory owned by this workspace
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Names of the artifacts handed out so far
    pub fn artifacts(&self) -> impl Iterator<Item = &str> {
        self.artifacts.iter().map(String::as_str)
    }

    /// Reserve a fresh artifact path `{NAME}.{extension}` inside the workspace.
    ///
    /// The file itself is not created.
    pub fn artifact_path(&mut self, extension: &str) -> PathBuf {
        loop {
            let name = format!("{}.{extension}", generate_name());
            if self.artifacts.insert(name.clone()) {
                return self.dir.join(name);
            }
        }
    }

    /// Remove the workspace directory and all its contents.
    ///
    /// Safe on empty or partially populated workspaces.
    ///
    /// # Errors
    ///
    /// Returns error if the directory exists but cannot be removed
    pub fn release(mut self) -> Result<()> {
        self.cleanup().map_err(Error::from)
    }

    fn cleanup(&mut self) -> io::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        // Fails while other workspaces of the category are live
        if let Err(e) = std::fs::remove_dir(&self.category_dir) {
            if !category_still_in_use(&self.category_dir, &e) {
                tracing::debug!(
                    path = %self.category_dir.display(),
                    error = %e,
                    "Failed to remove category directory"
                );
            }
        }

        tracing::debug!(
            category = %self.category,
            artifacts = self.artifacts.len(),
            "Released temporary workspace"
        );
        Ok(())
    }
}

/// True when `remove_dir` failed only because the category is gone or still
/// holds other workspaces
fn category_still_in_use(category_dir: &Path, error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::NotFound
        || std::fs::read_dir(category_dir).is_ok_and(|mut entries| entries.next().is_some())
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            tracing::warn!(
                path = %self.dir.display(),
                error = %e,
                "Failed to remove temporary workspace"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_name_shape() {
        let name = generate_name();
        assert_eq!(name.len(), NAME_LEN);
        assert!(name.bytes().all(|b| NAME_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_generate_name_no_collisions_in_10k() {
        let names: HashSet<String> = (0..10_000).map(|_| generate_name()).collect();
        assert_eq!(names.len(), 10_000);
    }

    #[test]
    fn test_collision_probability_bound() {
        assert!(collision_probability(0).abs() < f64::EPSILON);
        assert!(collision_probability(1).abs() < f64::EPSILON);
        let p = collision_probability(10_000);
        assert!(p > 1.0e-5 && p < 2.0e-5, "unexpected bound {p}");
    }

    #[test]
    fn test_acquire_creates_unique_dirs() {
        let root = tempfile::tempdir().unwrap();
        let manager = TempWorkspaceManager::new(root.path());

        let a = manager.acquire(IMAGES_CATEGORY).unwrap();
        let b = manager.acquire(IMAGES_CATEGORY).unwrap();

        assert_ne!(a.path(), b.path());
        assert!(a.path().is_dir());
        assert!(b.path().is_dir());
        assert_eq!(a.path().parent(), Some(manager.category_dir("images").as_path()));
    }

    #[test]
    fn test_acquire_rejects_bad_category() {
        let root = tempfile::tempdir().unwrap();
        let manager = TempWorkspaceManager::new(root.path());

        for category in ["", "..", "a/b", "/abs"] {
            let err = manager.acquire(category).unwrap_err();
            assert!(matches!(err, Error::Workspace(_)), "{category:?}");
        }
    }

    #[test]
    fn test_artifact_paths_are_tracked() {
        let root = tempfile::tempdir().unwrap();
        let manager = TempWorkspaceManager::new(root.path());
        let mut ws = manager.acquire("images").unwrap();

        let first = ws.artifact_path("fits");
        let second = ws.artifact_path("fits");

        assert_ne!(first, second);
        assert_eq!(first.parent(), Some(ws.path()));
        assert_eq!(first.extension().unwrap(), "fits");
        assert_eq!(ws.artifacts().count(), 2);
    }

    #[test]
    fn test_release_removes_contents_and_empty_category() {
        let root = tempfile::tempdir().unwrap();
        let manager = TempWorkspaceManager::new(root.path());
        let mut ws = manager.acquire("images").unwrap();
        let artifact = ws.artifact_path("fits");
        std::fs::write(&artifact, b"data").unwrap();

        manager.release(ws).unwrap();

        assert!(!artifact.exists());
        assert!(!manager.category_dir("images").exists());
    }

    #[test]
    fn test_release_keeps_other_live_workspaces() {
        let root = tempfile::tempdir().unwrap();
        let manager = TempWorkspaceManager::new(root.path());
        let first = manager.acquire("images").unwrap();
        let second = manager.acquire("images").unwrap();
        let second_dir = second.path().to_path_buf();

        first.release().unwrap();

        assert!(second_dir.is_dir());
        drop(second);
        assert!(!manager.category_dir("images").exists());
    }

    #[test]
    fn test_release_after_external_removal() {
        let root = tempfile::tempdir().unwrap();
        let manager = TempWorkspaceManager::new(root.path());
        let ws = manager.acquire("images").unwrap();
        std::fs::remove_dir_all(ws.path()).unwrap();

        assert!(ws.release().is_ok());
    }

    #[test]
    fn test_drop_releases() {
        let root = tempfile::tempdir().unwrap();
        let manager = TempWorkspaceManager::new(root.path());
        let dir = {
            let mut ws = manager.acquire("images").unwrap();
            std::fs::write(ws.artifact_path("fits"), b"partial").unwrap();
            ws.path().to_path_buf()
        };
        assert!(!dir.exists());
    }

    #[test]
    fn test_category_removal_failures_are_classified() {
        let root = tempfile::tempdir().unwrap();

        let missing = root.path().join("gone");
        let err = std::fs::remove_dir(&missing).unwrap_err();
        assert!(category_still_in_use(&missing, &err));

        let busy = root.path().join("busy");
        std::fs::create_dir_all(busy.join("live")).unwrap();
        let err = std::fs::remove_dir(&busy).unwrap_err();
        assert!(category_still_in_use(&busy, &err));

        // A category path that is not a directory is unexpected
        let file = root.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        let err = std::fs::remove_dir(&file).unwrap_err();
        assert!(!category_still_in_use(&file, &err));
    }
}
