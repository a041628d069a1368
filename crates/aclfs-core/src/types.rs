// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions for the ACL bridge

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::rights::RightsMask;

/// Well-known identity granted to all users.
pub const SID_EVERYONE: &str = "S-1-1-0";
/// Placeholder the platform resolves to the object's actual owner.
pub const SID_CREATOR_OWNER: &str = "S-1-3-0";
/// Placeholder the platform resolves to the object's actual primary group.
pub const SID_CREATOR_GROUP: &str = "S-1-3-1";

/// A user, group, or well-known identity in canonical SID string form.
/// Two principals are equal iff their canonical strings match; raw numeric
/// identifiers never appear in the bridge.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal(String);

impl Principal {
    pub fn new(sid: impl Into<String>) -> Self {
        Self(sid.into())
    }

    pub fn everyone() -> Self {
        Self(SID_EVERYONE.to_string())
    }

    pub fn creator_owner() -> Self {
        Self(SID_CREATOR_OWNER.to_string())
    }

    pub fn creator_group() -> Self {
        Self(SID_CREATOR_GROUP.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_everyone(&self) -> bool {
        self.0 == SID_EVERYONE
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(sid: &str) -> Self {
        Self(sid.to_string())
    }
}

/// Whether an entry grants or withholds its rights. The bridge only ever
/// produces grants; deny entries written by others are respected when
/// decoding effective rights.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    Grant,
    Deny,
}

/// Inheritance behavior carried by an individual entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AceInheritance {
    None,
    /// Propagates to subdirectories and files below a directory.
    SubContainersAndObjects,
}

/// One access-control entry. Order within a DACL is semantically significant
/// for effective-rights evaluation and must never be shuffled when merging.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ace {
    pub trustee: Principal,
    pub mode: AccessMode,
    pub rights: RightsMask,
    pub inheritance: AceInheritance,
    /// True for entries that arrived via inheritance from a parent rather
    /// than being set on the object itself.
    pub inherited: bool,
}

impl Ace {
    pub fn grant(trustee: Principal, rights: RightsMask) -> Self {
        Self {
            trustee,
            mode: AccessMode::Grant,
            rights,
            inheritance: AceInheritance::SubContainersAndObjects,
            inherited: false,
        }
    }

    pub fn deny(trustee: Principal, rights: RightsMask) -> Self {
        Self {
            trustee,
            mode: AccessMode::Deny,
            rights,
            inheritance: AceInheritance::SubContainersAndObjects,
            inherited: false,
        }
    }
}

/// A per-path security descriptor, marshaled out of the platform on demand.
/// Transient: fetched per call, never cached. Fields the caller did not
/// request are `None`.
#[derive(Clone, Debug, Default)]
pub struct SecurityDescriptor {
    pub owner: Option<Principal>,
    pub group: Option<Principal>,
    pub dacl: Option<Vec<Ace>>,
}

/// File-type portion of a POSIX mode word. Only the low 9 permission bits are
/// derived from access-control state; these pass through the bridge untouched.
pub const MODE_TYPE_MASK: u32 = 0o170000;
pub const MODE_DIR: u32 = 0o040000;
pub const MODE_FILE: u32 = 0o100000;
pub const MODE_SYMLINK: u32 = 0o120000;
/// The rwxrwxrwx bits.
pub const MODE_PERM_MASK: u32 = 0o777;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_equality_is_canonical_string_equality() {
        assert_eq!(Principal::new("S-1-1-0"), Principal::everyone());
        assert_ne!(Principal::creator_owner(), Principal::creator_group());
    }

    #[test]
    fn test_grant_entries_default_to_inheritable() {
        let ace = Ace::grant(Principal::everyone(), crate::rights::PERM_READ);
        assert_eq!(ace.mode, AccessMode::Grant);
        assert_eq!(ace.inheritance, AceInheritance::SubContainersAndObjects);
        assert!(!ace.inherited);
    }
}
