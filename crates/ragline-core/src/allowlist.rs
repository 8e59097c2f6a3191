//! Directory allow-list for ingestion.
//!
//! Ingestion only reads from directories that resolve inside one of the
//! configured roots. Symlinks and `..` segments are resolved before the
//! comparison, so a path cannot escape a root by traversal.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{RagError, Result};

/// Gate that decides whether a directory may be ingested.
#[derive(Debug, Clone)]
pub struct DirectoryAllowList {
    roots: Vec<PathBuf>,
}

impl DirectoryAllowList {
    /// Build an allow-list from configured directory strings.
    ///
    /// Relative entries are resolved against the current working directory.
    /// Entries that exist are canonicalized; missing entries are kept as
    /// absolute paths so they start matching once created.
    pub fn new<I, S>(directories: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cwd = std::env::current_dir()?;
        let roots = directories
            .into_iter()
            .map(|d| d.as_ref().trim().to_string())
            .filter(|d| !d.is_empty())
            .map(|d| resolve_root(&cwd, Path::new(&d)))
            .collect::<Vec<_>>();

        if roots.is_empty() {
            return Err(RagError::Validation(
                "allowed directory list is empty".to_string(),
            ));
        }
        Ok(Self { roots })
    }

    /// Resolved roots, in configuration order.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Check a directory against the allow-list.
    ///
    /// Returns the canonical path on success. Fails with a validation error
    /// naming the offending path if the directory does not exist, is not a
    /// directory, or lies outside every allowed root.
    pub fn check(&self, directory: &Path) -> Result<PathBuf> {
        if !directory.is_dir() {
            warn!(directory = %directory.display(), "Directory does not exist");
            return Err(RagError::Validation(format!(
                "Directory {} does not exist",
                directory.display()
            )));
        }

        let canonical = directory.canonicalize().map_err(|e| {
            RagError::Validation(format!(
                "Directory {} cannot be resolved: {}",
                directory.display(),
                e
            ))
        })?;

        if self.roots.iter().any(|root| canonical.starts_with(root)) {
            debug!(directory = %canonical.display(), "Directory allowed");
            Ok(canonical)
        } else {
            warn!(directory = %directory.display(), "Directory not in allowed list");
            Err(RagError::Validation(format!(
                "Directory {} is not in the allowed list",
                directory.display()
            )))
        }
    }
}

fn resolve_root(cwd: &Path, dir: &Path) -> PathBuf {
    let absolute = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        cwd.join(dir)
    };
    absolute.canonicalize().unwrap_or(absolute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_allows_root_and_descendants() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("reports").join("2024");
        std::fs::create_dir_all(&nested).unwrap();

        let list = DirectoryAllowList::new([root.path().to_string_lossy()]).unwrap();
        assert!(list.check(root.path()).is_ok());
        assert_eq!(
            list.check(&nested).unwrap(),
            nested.canonicalize().unwrap()
        );
    }

    #[test]
    fn test_rejects_outside_directory() {
        let allowed = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();

        let list = DirectoryAllowList::new([allowed.path().to_string_lossy()]).unwrap();
        let err = list.check(other.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err
            .to_string()
            .contains(&other.path().display().to_string()));
    }

    #[test]
    fn test_rejects_traversal_out_of_root() {
        let parent = tempfile::tempdir().unwrap();
        let allowed = parent.path().join("allowed");
        let secret = parent.path().join("secret");
        std::fs::create_dir_all(&allowed).unwrap();
        std::fs::create_dir_all(&secret).unwrap();

        let list = DirectoryAllowList::new([allowed.to_string_lossy()]).unwrap();
        let sneaky = allowed.join("..").join("secret");
        assert!(list.check(&sneaky).is_err());
    }

    #[test]
    fn test_rejects_sibling_with_common_prefix() {
        let parent = tempfile::tempdir().unwrap();
        let allowed = parent.path().join("data");
        let sibling = parent.path().join("data-private");
        std::fs::create_dir_all(&allowed).unwrap();
        std::fs::create_dir_all(&sibling).unwrap();

        let list = DirectoryAllowList::new([allowed.to_string_lossy()]).unwrap();
        assert!(list.check(&sibling).is_err());
    }

    #[test]
    fn test_missing_directory_is_validation_error() {
        let root = tempfile::tempdir().unwrap();
        let list = DirectoryAllowList::new([root.path().to_string_lossy()]).unwrap();
        let missing = root.path().join("nope");
        let err = list.check(&missing).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_file_is_not_a_directory() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("doc.pdf");
        std::fs::write(&file, b"%PDF-1.4").unwrap();
        let list = DirectoryAllowList::new([root.path().to_string_lossy()]).unwrap();
        assert!(list.check(&file).is_err());
    }

    #[test]
    fn test_empty_list_rejected() {
        let err = DirectoryAllowList::new(Vec::<String>::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(DirectoryAllowList::new([" "]).is_err());
    }

    #[test]
    fn test_missing_root_kept_absolute() {
        let list = DirectoryAllowList::new(["/definitely/not/here"]).unwrap();
        assert_eq!(list.roots()[0], PathBuf::from("/definitely/not/here"));
    }
}
