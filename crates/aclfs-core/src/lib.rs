// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! POSIX permission bits bridged onto discretionary access-control lists.
//!
//! Platforms whose security model is a list of per-principal grants rather
//! than a 9-bit mode word need a translation layer before a POSIX-style
//! filesystem abstraction behaves correctly on them. This crate implements
//! that bridge: encoding a requested mode into grant entries, decoding a
//! security descriptor back into mode bits (either from the declared explicit
//! entries or from the platform's effective-rights evaluation), ownership
//! changes behind a scoped privilege elevation, and `mkdir -p` semantics that
//! apply the bridge at every newly created level.
//!
//! The native security API is reached through the [`SecurityPlatform`] trait;
//! the Windows implementation lives in the `aclfs-windows` crate, and an
//! in-memory implementation for tests is shipped under [`testing`].

pub mod acl;
pub mod dirtree;
pub mod error;
pub mod file_info;
pub mod fs;
pub mod ownership;
pub mod platform;
pub mod privilege;
pub mod rights;
pub mod testing;
pub mod types;

pub use error::{AclError, AclResult};
pub use file_info::FileInfo;
pub use fs::AclFs;
pub use ownership::SE_RESTORE_PRIVILEGE;
pub use platform::{
    DaclProtection, NativeMetadata, SecurityPlatform, SecurityUpdate, FIELD_DACL, FIELD_GROUP,
    FIELD_OWNER,
};
pub use privilege::ScopeOutcome;
pub use rights::{rights_for_class, RightsMask, PERM_EXECUTE, PERM_READ, PERM_WRITE};
pub use types::{
    AccessMode, Ace, AceInheritance, Principal, SecurityDescriptor, MODE_DIR, MODE_FILE,
    MODE_PERM_MASK, MODE_SYMLINK, MODE_TYPE_MASK,
};
