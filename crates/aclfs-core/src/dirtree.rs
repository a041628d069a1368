// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Recursive directory creation
//!
//! `mkdir -p` semantics with the mode bridge applied at every newly created
//! level, not just the leaf. The ancestor walk is an explicit stack rather
//! than call recursion so stack depth stays bounded for deep paths.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{AclError, AclResult};
use crate::fs::AclFs;
use crate::platform::{NativeMetadata, SecurityPlatform};

impl<P: SecurityPlatform> AclFs<P> {
    /// Create a single directory and apply `mode` to it. The parent must
    /// already exist.
    pub fn mkdir(&self, path: &Path, mode: u32) -> AclResult<()> {
        self.platform.mkdir(path)?;
        self.chmod(path, mode)
    }

    /// Create a directory along with any missing ancestors, applying `mode`
    /// to each directory actually created.
    ///
    /// Succeeds with no side effects when the path already is a directory;
    /// fails with [`AclError::NotADirectory`] when the path or any ancestor
    /// exists as something else. Directories created before a later failure
    /// are left in place.
    pub fn mkdir_all(&self, path: &Path, mode: u32) -> AclResult<()> {
        // Walk upward to the first existing ancestor, stacking the missing
        // levels. Trailing separators are normalized away by the component
        // iteration.
        let mut pending: Vec<PathBuf> = Vec::new();
        let mut current: PathBuf = path.components().collect();
        loop {
            match self.metadata_if_exists(&current)? {
                Some(meta) if meta.is_dir() => break,
                Some(_) => return Err(AclError::NotADirectory(current)),
                None => {
                    pending.push(current.clone());
                    match current.parent() {
                        Some(parent) if !parent.as_os_str().is_empty() => {
                            current = parent.to_path_buf();
                        }
                        // Root of the walk; assume it exists and let mkdir
                        // report otherwise.
                        _ => break,
                    }
                }
            }
        }

        // Create strictly parent before child.
        for dir in pending.iter().rev() {
            debug!(path = %dir.display(), mode = format_args!("{mode:04o}"), "creating directory");
            self.mkdir(dir, mode)?;
        }
        Ok(())
    }

    fn metadata_if_exists(&self, path: &Path) -> AclResult<Option<NativeMetadata>> {
        match self.platform.metadata(path, true) {
            Ok(meta) => Ok(Some(meta)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemPlatform;

    #[test]
    fn test_mkdir_all_creates_every_level_with_mode() {
        let fs = AclFs::new(MemPlatform::new());
        fs.mkdir_all("/a/b/c".as_ref(), 0o750).expect("mkdir_all should succeed");

        for dir in ["/a", "/a/b", "/a/b/c"] {
            let meta = fs.platform().metadata(dir.as_ref(), false).expect("dir should exist");
            assert!(meta.is_dir(), "{dir} should be a directory");
            assert_eq!(
                fs.declared_mode(dir.as_ref()).expect("decode should succeed"),
                0o750,
                "{dir} should carry the requested mode"
            );
        }
    }

    #[test]
    fn test_mkdir_all_is_idempotent() {
        let fs = AclFs::new(MemPlatform::new());
        fs.mkdir_all("/a/b/c".as_ref(), 0o750).expect("first mkdir_all should succeed");
        fs.mkdir_all("/a/b/c".as_ref(), 0o700).expect("second mkdir_all should succeed");

        // The second call found the directory and did nothing, so the
        // original permissions survive on every level.
        for dir in ["/a", "/a/b", "/a/b/c"] {
            assert_eq!(fs.declared_mode(dir.as_ref()).unwrap(), 0o750);
        }
    }

    #[test]
    fn test_mkdir_all_fails_on_file_obstruction() {
        let fs = AclFs::new(MemPlatform::new());
        fs.mkdir_all("/a".as_ref(), 0o755).expect("mkdir_all should succeed");
        fs.platform().add_file("/a/b".as_ref());

        let err = fs.mkdir_all("/a/b/c".as_ref(), 0o755).unwrap_err();
        assert!(matches!(err, AclError::NotADirectory(ref p) if p == Path::new("/a/b")));
        // The leaf must not have been created.
        assert!(fs
            .platform()
            .metadata("/a/b/c".as_ref(), false)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_mkdir_all_obstruction_at_leaf() {
        let fs = AclFs::new(MemPlatform::new());
        fs.platform().add_file("/plain".as_ref());
        let err = fs.mkdir_all("/plain".as_ref(), 0o755).unwrap_err();
        assert!(matches!(err, AclError::NotADirectory(_)));
    }

    #[test]
    fn test_mkdir_all_strips_trailing_separators() {
        let fs = AclFs::new(MemPlatform::new());
        fs.mkdir_all("/x/y/".as_ref(), 0o755).expect("mkdir_all should succeed");
        assert!(fs.platform().metadata("/x/y".as_ref(), false).unwrap().is_dir());
    }

    #[test]
    fn test_mkdir_all_keeps_already_created_ancestors_on_failure() {
        let fs = AclFs::new(MemPlatform::new());
        fs.platform().fail_mkdir_at("/a/b/c".as_ref());

        assert!(fs.mkdir_all("/a/b/c".as_ref(), 0o755).is_err());
        // mkdir -p semantics: earlier levels stay.
        assert!(fs.platform().metadata("/a".as_ref(), false).unwrap().is_dir());
        assert!(fs.platform().metadata("/a/b".as_ref(), false).unwrap().is_dir());
    }

    #[test]
    fn test_mkdir_applies_mode() {
        let fs = AclFs::new(MemPlatform::new());
        fs.mkdir("/solo".as_ref(), 0o711).expect("mkdir should succeed");
        assert_eq!(fs.declared_mode("/solo".as_ref()).unwrap(), 0o711);
    }
}
