// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the ACL bridge

use std::io;
use std::path::{Path, PathBuf};

/// Bridge error type. Platform-call failures always carry the name of the
/// failing native operation and the path it was applied to.
#[derive(thiserror::Error, Debug)]
pub enum AclError {
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("access denied: {}", .0.display())]
    PermissionDenied(PathBuf),
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("enabling privilege {privilege}: {source}")]
    PrivilegeElevation {
        privilege: String,
        #[source]
        source: Box<AclError>,
    },
    #[error("{op} failed for {}: {source}", .path.display())]
    Platform {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{op}({privilege}) failed: {source}")]
    Token {
        op: &'static str,
        privilege: String,
        #[source]
        source: io::Error,
    },
    /// Primary failure plus a best-effort cleanup failure. The privilege was
    /// left in an unknown state; nothing is rolled back.
    #[error("{primary} (privilege revocation also failed: {revocation})")]
    Joined {
        #[source]
        primary: Box<AclError>,
        revocation: Box<AclError>,
    },
    #[error("invalid principal string: {0}")]
    InvalidPrincipal(String),
}

impl AclError {
    /// Wrap a native call failure, promoting the well-known error classes so
    /// callers can match on them regardless of which backend produced them.
    pub fn platform(op: &'static str, path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => AclError::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => AclError::PermissionDenied(path.to_path_buf()),
            _ => AclError::Platform {
                op,
                path: path.to_path_buf(),
                source,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AclError::NotFound(_))
    }
}

pub type AclResult<T> = Result<T, AclError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_wrap_promotes_not_found() {
        let err = AclError::platform(
            "GetNamedSecurityInfoW",
            Path::new("/missing"),
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_platform_wrap_keeps_op_and_path() {
        let err = AclError::platform(
            "SetNamedSecurityInfoW",
            Path::new("/locked"),
            io::Error::other("sharing violation"),
        );
        let msg = err.to_string();
        assert!(msg.contains("SetNamedSecurityInfoW"), "{msg}");
        assert!(msg.contains("/locked"), "{msg}");
    }
}
