use std::path::{Path, PathBuf};

use image::ImageFormat;

/// Source of candidate paths for next/previous navigation.
pub trait PathProvider: Send + Sync {
    fn is_image(&self, path: &Path) -> bool;
    fn exists(&self, path: &Path) -> bool;
    /// Files next to `path`, sorted, including `path` itself.
    fn siblings(&self, path: &Path) -> Vec<PathBuf>;
}

/// Filesystem-backed provider; recognises images by extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsPathProvider;

impl PathProvider for FsPathProvider {
    fn is_image(&self, path: &Path) -> bool {
        ImageFormat::from_path(path).is_ok()
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn siblings(&self, path: &Path) -> Vec<PathBuf> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let entries = match std::fs::read_dir(parent) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(?err, dir = %parent.display(), "failed to list sibling images");
                return vec![path.to_path_buf()];
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|candidate| candidate.is_file())
            .collect();
        paths.sort();
        paths
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// Position in the navigable path list, wrapping at both ends.
#[derive(Debug, Default)]
pub struct PathCursor {
    paths: Vec<PathBuf>,
    index: Option<usize>,
}

impl PathCursor {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths, index: None }
    }

    /// Replaces the list and points the cursor at `current`, adding it when
    /// the list does not contain it.
    pub fn seed(&mut self, mut paths: Vec<PathBuf>, current: &Path) {
        let index = match paths.iter().position(|path| path == current) {
            Some(index) => index,
            None => {
                paths.push(current.to_path_buf());
                paths.len() - 1
            }
        };
        self.paths = paths;
        self.index = Some(index);
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn current(&self) -> Option<&Path> {
        self.index
            .and_then(|index| self.paths.get(index))
            .map(PathBuf::as_path)
    }

    /// Moves to the nearest existing image in `direction`. Returns `None`
    /// when no entry qualifies.
    pub fn advance(&mut self, direction: Direction, provider: &dyn PathProvider) -> Option<&Path> {
        let len = self.paths.len();
        if len == 0 {
            return None;
        }

        let found = (1..=len)
            .map(|step| match direction {
                Direction::Next => (self.index.unwrap_or(len - 1) + step) % len,
                Direction::Previous => (self.index.unwrap_or(0) + len - step % len) % len,
            })
            .find(|&candidate| {
                let path = &self.paths[candidate];
                provider.is_image(path) && provider.exists(path)
            })?;

        self.index = Some(found);
        self.current()
    }
}
