// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! File-info values with ACL-derived permission bits
//!
//! A plain value holding the native attributes plus the bridged mode word;
//! the type bits come from the platform and the low 9 bits from the
//! effective decoder, so permission bridging and type detection stay
//! consistent.

use std::path::Path;
use std::time::SystemTime;

use crate::error::AclResult;
use crate::fs::AclFs;
use crate::platform::SecurityPlatform;
use crate::types::{MODE_DIR, MODE_PERM_MASK, MODE_SYMLINK, MODE_TYPE_MASK};

#[derive(Clone, Debug)]
pub struct FileInfo {
    name: String,
    len: u64,
    modified: SystemTime,
    mode: u32,
}

impl FileInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Native high-order attribute bits combined with the effective
    /// permission bits.
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Derived from the combined mode, not from a separate native flag.
    pub fn is_dir(&self) -> bool {
        self.mode & MODE_TYPE_MASK == MODE_DIR
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & MODE_TYPE_MASK == MODE_SYMLINK
    }
}

impl<P: SecurityPlatform> AclFs<P> {
    /// File info for a path, following symlinks.
    pub fn stat(&self, path: &Path) -> AclResult<FileInfo> {
        self.file_info(path, true)
    }

    /// File info for a path without following a final symlink.
    pub fn lstat(&self, path: &Path) -> AclResult<FileInfo> {
        self.file_info(path, false)
    }

    fn file_info(&self, path: &Path, follow: bool) -> AclResult<FileInfo> {
        // Permissions must be read from the same node the attributes come
        // from, so the link is resolved once up front.
        let target = if follow {
            self.platform.resolve_link(path)?
        } else {
            path.to_path_buf()
        };
        let meta = self.platform.metadata(&target, false)?;
        let perm = self.effective_mode(&target)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(FileInfo {
            name,
            len: meta.len,
            modified: meta.modified,
            mode: (meta.type_bits & !MODE_PERM_MASK) | (perm & MODE_PERM_MASK),
        })
    }
}
