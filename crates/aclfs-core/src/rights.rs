// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Invariant access-right bit tables
//!
//! The granular rights and the `PERM_*` unions below must match the
//! documented Windows file and directory access-right values bit for bit;
//! wrong values silently produce wrong-but-plausible permission checks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// A fixed-width bitmask of granular platform access rights.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RightsMask(pub u32);

/// Read file data; for a directory, list its contents.
pub const FILE_READ_DATA: RightsMask = RightsMask(0x0000_0001);
/// Write file data; for a directory, add a file.
pub const FILE_WRITE_DATA: RightsMask = RightsMask(0x0000_0002);
/// Append to a file; for a directory, add a subdirectory.
pub const FILE_APPEND_DATA: RightsMask = RightsMask(0x0000_0004);
pub const FILE_READ_EA: RightsMask = RightsMask(0x0000_0008);
pub const FILE_WRITE_EA: RightsMask = RightsMask(0x0000_0010);
/// Execute a file; for a directory, traverse it.
pub const FILE_EXECUTE: RightsMask = RightsMask(0x0000_0020);
pub const FILE_READ_ATTRIBUTES: RightsMask = RightsMask(0x0000_0080);
pub const FILE_WRITE_ATTRIBUTES: RightsMask = RightsMask(0x0000_0100);
pub const DELETE: RightsMask = RightsMask(0x0001_0000);
pub const READ_CONTROL: RightsMask = RightsMask(0x0002_0000);
pub const SYNCHRONIZE: RightsMask = RightsMask(0x0010_0000);

/// The standard right groups all collapse to READ_CONTROL.
pub const STANDARD_RIGHTS_READ: RightsMask = READ_CONTROL;
pub const STANDARD_RIGHTS_WRITE: RightsMask = READ_CONTROL;
pub const STANDARD_RIGHTS_EXECUTE: RightsMask = READ_CONTROL;

/// Rights that together constitute POSIX "read".
pub const PERM_READ: RightsMask = RightsMask(
    FILE_READ_ATTRIBUTES.0
        | FILE_READ_DATA.0
        | FILE_READ_EA.0
        | STANDARD_RIGHTS_READ.0
        | SYNCHRONIZE.0,
);

/// Rights that together constitute POSIX "write". DELETE is not part of the
/// union itself; the encoder grants it alongside so files stay deletable and
/// renamable, while classification stays insensitive to it.
pub const PERM_WRITE: RightsMask = RightsMask(
    FILE_APPEND_DATA.0
        | FILE_WRITE_ATTRIBUTES.0
        | FILE_WRITE_DATA.0
        | FILE_WRITE_EA.0
        | STANDARD_RIGHTS_WRITE.0
        | SYNCHRONIZE.0,
);

/// Rights that together constitute POSIX "execute".
pub const PERM_EXECUTE: RightsMask =
    RightsMask(FILE_EXECUTE.0 | FILE_READ_ATTRIBUTES.0 | STANDARD_RIGHTS_EXECUTE.0 | SYNCHRONIZE.0);

impl RightsMask {
    pub const EMPTY: RightsMask = RightsMask(0);

    pub const fn contains(self, required: RightsMask) -> bool {
        self.0 & required.0 == required.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Collapse a rights mask into a 3-bit rwx class. A class bit is set only
    /// when every granular right of the corresponding union is present.
    pub fn classify(self) -> u32 {
        let mut class = 0;
        if self.contains(PERM_READ) {
            class |= 0b100;
        }
        if self.contains(PERM_WRITE) {
            class |= 0b010;
        }
        if self.contains(PERM_EXECUTE) {
            class |= 0b001;
        }
        class
    }
}

/// Expand a 3-bit rwx class into the rights granted for it. Every entry gets
/// SYNCHRONIZE, otherwise handles opened with it could never be waited on.
pub fn rights_for_class(class: u32) -> RightsMask {
    let mut mask = SYNCHRONIZE.0;
    if class & 0b100 != 0 {
        mask |= PERM_READ.0;
    }
    if class & 0b010 != 0 {
        mask |= PERM_WRITE.0 | DELETE.0;
    }
    if class & 0b001 != 0 {
        mask |= PERM_EXECUTE.0;
    }
    RightsMask(mask)
}

impl BitOr for RightsMask {
    type Output = RightsMask;
    fn bitor(self, rhs: RightsMask) -> RightsMask {
        RightsMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for RightsMask {
    fn bitor_assign(&mut self, rhs: RightsMask) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for RightsMask {
    type Output = RightsMask;
    fn bitand(self, rhs: RightsMask) -> RightsMask {
        RightsMask(self.0 & rhs.0)
    }
}

impl fmt::Display for RightsMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perm_unions_are_bit_exact() {
        assert_eq!(PERM_READ.0, 0x0012_0089);
        assert_eq!(PERM_WRITE.0, 0x0012_0116);
        assert_eq!(PERM_EXECUTE.0, 0x0012_00a0);
    }

    #[test]
    fn test_classify_single_classes() {
        assert_eq!(PERM_READ.classify(), 0b100);
        assert_eq!(PERM_WRITE.classify(), 0b010);
        assert_eq!(PERM_EXECUTE.classify(), 0b001);
        assert_eq!((PERM_READ | PERM_WRITE | PERM_EXECUTE).classify(), 0b111);
    }

    #[test]
    fn test_classify_requires_every_right_of_the_union() {
        // One right short of PERM_READ must not classify as readable.
        let almost_read = RightsMask(PERM_READ.0 & !FILE_READ_EA.0);
        assert_eq!(almost_read.classify() & 0b100, 0);

        // Write-flavored rights alone never satisfy read or execute.
        assert_eq!((PERM_WRITE | DELETE).classify(), 0b010);

        // Execute includes FILE_READ_ATTRIBUTES but must not leak into read.
        assert_eq!(PERM_EXECUTE.classify(), 0b001);
    }

    #[test]
    fn test_classify_tolerates_supersets() {
        // Extra rights on top of a full union still classify; partial overlap
        // with a second union must not set that union's bit.
        let mask = PERM_READ | DELETE | FILE_WRITE_ATTRIBUTES;
        assert_eq!(mask.classify(), 0b100);
    }

    #[test]
    fn test_rights_for_class_round_trips_through_classify() {
        for class in 0..8 {
            assert_eq!(rights_for_class(class).classify(), class);
        }
    }

    #[test]
    fn test_write_class_grants_delete() {
        assert!(rights_for_class(0b010).contains(DELETE));
        assert!(!rights_for_class(0b101).contains(DELETE));
    }

    #[test]
    fn test_empty_class_is_synchronize_only() {
        assert_eq!(rights_for_class(0), SYNCHRONIZE);
        assert_eq!(rights_for_class(0).classify(), 0);
    }
}
