//! Preopened directories.

use std::collections::BTreeMap;

use tracing::trace;

use crate::error::{VfsError, VfsResult};
use crate::file::{OpenFile, OpenMode, VirtualFile};

/// A flat, named directory of virtual files handed to the guest at startup.
///
/// Lookups are exact, case-sensitive string matches against the relative
/// paths the directory was built with. There is no `..` handling, no
/// globbing, and no way for the guest to add or remove entries.
#[derive(Debug, Clone)]
pub struct PreopenDirectory {
    name: String,
    entries: BTreeMap<String, VirtualFile>,
}

impl PreopenDirectory {
    /// Create an empty directory reported to the guest as `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Add an entry, replacing any file already bound to `path`.
    pub fn with_file(mut self, path: impl Into<String>, file: impl Into<VirtualFile>) -> Self {
        self.insert(path, file);
        self
    }

    /// Bind `path` to `file`. Returns the file previously bound there, if any.
    pub fn insert(
        &mut self,
        path: impl Into<String>,
        file: impl Into<VirtualFile>,
    ) -> Option<VirtualFile> {
        self.entries.insert(path.into(), file.into())
    }

    /// The name the guest sees for this directory.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the directory has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in path order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &VirtualFile)> {
        self.entries.iter().map(|(path, file)| (path.as_str(), file))
    }

    /// Find the file bound to exactly `path`.
    ///
    /// The returned value shares its buffer with the directory entry.
    pub fn resolve(&self, path: &str) -> VfsResult<VirtualFile> {
        self.entries
            .get(path)
            .cloned()
            .ok_or_else(|| VfsError::NotFound {
                directory: self.name.clone(),
                path: path.to_string(),
            })
    }

    /// Resolve `path` and open it with the cursor at 0.
    pub fn open_at(&self, path: &str, mode: OpenMode) -> VfsResult<OpenFile> {
        let file = self.resolve(path)?;
        trace!(directory = %self.name, path, ?mode, "Opened preopened file");
        Ok(OpenFile::new(file, mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PreopenDirectory {
        PreopenDirectory::new(".")
            .with_file("a.txt", "hi")
            .with_file("hello.rs", r#"fn main() { println!("Hello World!"); }"#)
    }

    #[test]
    fn test_resolve_existing_file() {
        let dir = sample();
        let file = dir.resolve("a.txt").unwrap();
        assert_eq!(file.contents(), b"hi");
    }

    #[test]
    fn test_resolve_is_referentially_stable() {
        let dir = sample();
        let first = dir.resolve("hello.rs").unwrap();
        let second = dir.resolve("hello.rs").unwrap();
        assert!(first.ptr_eq(&second));
    }

    #[test]
    fn test_resolve_missing_file() {
        let dir = sample();
        let err = dir.resolve("missing.txt").unwrap_err();
        assert_eq!(
            err,
            VfsError::NotFound {
                directory: ".".to_string(),
                path: "missing.txt".to_string()
            }
        );
    }

    #[test]
    fn test_resolve_is_exact_match_only() {
        let dir = sample();
        assert!(dir.resolve("A.txt").is_err());
        assert!(dir.resolve("./a.txt").is_err());
        assert!(dir.resolve("sub/../a.txt").is_err());
        assert!(dir.resolve("*.txt").is_err());
    }

    #[test]
    fn test_open_at_starts_at_zero_and_shares_content() {
        let dir = sample();
        let mut handle = dir.open_at("a.txt", OpenMode::Read).unwrap();
        assert_eq!(handle.tell(), 0);

        handle.write(b"HI").unwrap();
        assert_eq!(dir.resolve("a.txt").unwrap().contents(), b"HI");
    }

    #[test]
    fn test_entries_are_sorted() {
        let dir = sample();
        let names: Vec<_> = dir.entries().map(|(path, _)| path).collect();
        assert_eq!(names, vec!["a.txt", "hello.rs"]);
        assert_eq!(dir.len(), 2);
    }
}
