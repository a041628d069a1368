// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Abstract platform security API
//!
//! The bridge algorithms are written against this trait; `aclfs-windows`
//! maps it onto the Win32 security API, and [`crate::testing::MemPlatform`]
//! provides an in-memory implementation so the algorithms are testable on
//! every host. Backends own the lifetime of any platform-allocated descriptor
//! memory and must release it on all exit paths before returning the
//! marshaled value objects.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::AclResult;
use crate::rights::RightsMask;
use crate::types::{Ace, Principal, SecurityDescriptor, MODE_DIR, MODE_SYMLINK, MODE_TYPE_MASK};

/// Field selectors for [`SecurityPlatform::security_info`].
pub const FIELD_OWNER: u32 = 0b001;
pub const FIELD_GROUP: u32 = 0b010;
pub const FIELD_DACL: u32 = 0b100;

/// Whether a written DACL blocks inheritance from the parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DaclProtection {
    /// Entries inherited from the parent stop applying.
    Protected,
    /// Parent entries continue to apply alongside the explicit ones.
    Unprotected,
}

/// The fields written by one [`SecurityPlatform::set_security_info`] call.
/// Built as one complete set so the descriptor is updated atomically; a
/// partially applied DACL is never left behind.
#[derive(Clone, Debug)]
pub struct SecurityUpdate {
    pub owner: Option<Principal>,
    pub group: Option<Principal>,
    pub dacl: Option<Vec<Ace>>,
    pub protection: DaclProtection,
}

impl SecurityUpdate {
    pub fn replace_dacl(dacl: Vec<Ace>, protection: DaclProtection) -> Self {
        Self {
            owner: None,
            group: None,
            dacl: Some(dacl),
            protection,
        }
    }

    pub fn ownership(owner: Principal, group: Principal) -> Self {
        Self {
            owner: Some(owner),
            group: Some(group),
            dacl: None,
            protection: DaclProtection::Unprotected,
        }
    }
}

/// The native attributes the bridge needs alongside security state.
#[derive(Clone, Debug)]
pub struct NativeMetadata {
    pub len: u64,
    pub modified: SystemTime,
    /// File-type bits in the [`crate::types::MODE_TYPE_MASK`] encoding.
    pub type_bits: u32,
}

impl NativeMetadata {
    pub fn is_dir(&self) -> bool {
        self.type_bits & MODE_TYPE_MASK == MODE_DIR
    }

    pub fn is_symlink(&self) -> bool {
        self.type_bits & MODE_TYPE_MASK == MODE_SYMLINK
    }
}

/// Synchronous access to the native security model. All operations block on
/// underlying platform calls; paths are independent resources, but
/// `adjust_privilege` mutates process-wide token state and is only called
/// under the serialization enforced by [`crate::AclFs::with_privilege`].
#[cfg_attr(test, mockall::automock)]
pub trait SecurityPlatform: Send + Sync {
    /// Read the requested descriptor fields for a path. Unrequested fields
    /// come back `None`.
    fn security_info(&self, path: &Path, fields: u32) -> AclResult<SecurityDescriptor>;

    /// Write the given descriptor fields for a path.
    fn set_security_info(&self, path: &Path, update: &SecurityUpdate) -> AclResult<()>;

    /// Merge new explicit entries into an existing DACL. New entries take
    /// precedence per platform merge rules; relative order of retained
    /// entries is preserved.
    fn merge_entries(&self, new: &[Ace], existing: &[Ace]) -> AclResult<Vec<Ace>>;

    /// Evaluate the rights actually granted to a trustee by the full DACL,
    /// honoring deny entries and entry order.
    fn effective_rights(&self, dacl: &[Ace], trustee: &Principal) -> AclResult<RightsMask>;

    /// Enable or disable a named privilege on the process token.
    fn adjust_privilege(&self, privilege: &str, enable: bool) -> AclResult<()>;

    /// Native attributes for a path, following the final symlink when
    /// `follow` is set.
    fn metadata(&self, path: &Path, follow: bool) -> AclResult<NativeMetadata>;

    /// Create a single directory; the parent must already exist.
    fn mkdir(&self, path: &Path) -> AclResult<()>;

    /// Resolve a path through any symlinks to its final target.
    fn resolve_link(&self, path: &Path) -> AclResult<PathBuf>;
}
