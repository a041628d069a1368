// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Win32 implementation of the aclfs security platform
//!
//! Maps the abstract [`aclfs_core::SecurityPlatform`] operations onto the
//! Win32 security API: named security descriptors, explicit-entry and
//! effective-rights queries against DACLs, SID string conversion, and
//! process-token privilege adjustment. Compiles to an empty crate on other
//! targets; the platform-independent algorithms live in `aclfs-core`.

#[cfg(windows)]
mod platform;
#[cfg(windows)]
mod sid;

#[cfg(windows)]
pub use platform::WindowsPlatform;
