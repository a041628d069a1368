// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Mode encoding and decoding
//!
//! A chmod-style request flows encoder -> DACL merge/replace -> descriptor
//! write. A stat-style request flows descriptor read -> decoder -> mode bits.
//! The declared decoder reads the explicit grant entries back literally; the
//! effective decoder asks the platform what each identity can actually do,
//! which also accounts for deny and inherited entries. The two are distinct
//! by design and never interchangeable.

use std::path::Path;

use tracing::debug;

use crate::error::AclResult;
use crate::fs::AclFs;
use crate::platform::{
    DaclProtection, SecurityPlatform, SecurityUpdate, FIELD_DACL, FIELD_GROUP, FIELD_OWNER,
};
use crate::rights::rights_for_class;
use crate::types::{AccessMode, Ace, Principal};

impl<P: SecurityPlatform> AclFs<P> {
    /// Encode the low 9 bits of `mode` into three grant entries for `owner`,
    /// `group` and Everyone and install them as the path's DACL.
    ///
    /// With `replace` unset the new entries are merged into the existing DACL
    /// instead of replacing it. With `inherit` unset the resulting DACL is
    /// protected, cutting off entries inherited from the parent. The DACL is
    /// built as one complete set and written in a single descriptor update.
    pub fn encode_mode(
        &self,
        path: &Path,
        mode: u32,
        owner: &Principal,
        group: &Principal,
        replace: bool,
        inherit: bool,
    ) -> AclResult<()> {
        let entries = vec![
            Ace::grant(owner.clone(), rights_for_class((mode >> 6) & 0o7)),
            Ace::grant(group.clone(), rights_for_class((mode >> 3) & 0o7)),
            Ace::grant(Principal::everyone(), rights_for_class(mode & 0o7)),
        ];

        let dacl = if replace {
            entries
        } else {
            let existing = self
                .platform
                .security_info(path, FIELD_DACL)?
                .dacl
                .unwrap_or_default();
            self.platform.merge_entries(&entries, &existing)?
        };

        let protection = if inherit {
            DaclProtection::Unprotected
        } else {
            DaclProtection::Protected
        };

        debug!(
            path = %path.display(),
            mode = format_args!("{mode:04o}"),
            replace,
            inherit,
            "writing dacl"
        );
        self.platform
            .set_security_info(path, &SecurityUpdate::replace_dacl(dacl, protection))
    }

    /// Set the permission bits of `mode` on a path.
    ///
    /// Grants go to the Creator Owner and Creator Group placeholders, which
    /// the platform resolves to the object's actual owner and group, so the
    /// entries stay correct across ownership changes. The DACL is wholly
    /// replaced and protected from parent inheritance.
    ///
    /// Changing permissions on a path that is currently open elsewhere is a
    /// separate operation with no ordering guarantee relative to the open.
    pub fn chmod(&self, path: &Path, mode: u32) -> AclResult<()> {
        self.encode_mode(
            path,
            mode,
            &Principal::creator_owner(),
            &Principal::creator_group(),
            true,
            false,
        )
    }

    /// Reconstruct mode bits from the explicit grant entries alone.
    ///
    /// Each grant entry's trustee is matched by canonical string against the
    /// path's owner, group and the Everyone identity; matching entries OR
    /// their classified rights into the corresponding 3-bit field. Deny
    /// entries and entries for unrelated trustees are ignored. An empty DACL
    /// yields mode 0, not an error.
    pub fn declared_mode(&self, path: &Path) -> AclResult<u32> {
        let sd = self
            .platform
            .security_info(path, FIELD_OWNER | FIELD_GROUP | FIELD_DACL)?;

        let mut mode = 0;
        for ace in sd.dacl.as_deref().unwrap_or_default() {
            if ace.mode != AccessMode::Grant || ace.inherited {
                continue;
            }
            let class = ace.rights.classify();
            if sd.owner.as_ref() == Some(&ace.trustee) {
                mode |= class << 6;
            } else if sd.group.as_ref() == Some(&ace.trustee) {
                mode |= class << 3;
            } else if ace.trustee.is_everyone() {
                mode |= class;
            }
        }
        Ok(mode)
    }

    /// Reconstruct mode bits from the platform's effective-rights evaluation
    /// of the full DACL for owner, group and Everyone.
    ///
    /// This answers "what can this identity actually do": inherited entries
    /// broaden the result and deny entries narrow it, either of which makes
    /// it legitimately differ from [`AclFs::declared_mode`]. This is the
    /// variant behind stat-style reporting.
    pub fn effective_mode(&self, path: &Path) -> AclResult<u32> {
        let sd = self
            .platform
            .security_info(path, FIELD_OWNER | FIELD_GROUP | FIELD_DACL)?;
        let dacl = sd.dacl.unwrap_or_default();

        let mut mode = 0;
        if let Some(owner) = &sd.owner {
            mode |= self.platform.effective_rights(&dacl, owner)?.classify() << 6;
        }
        if let Some(group) = &sd.group {
            mode |= self.platform.effective_rights(&dacl, group)?.classify() << 3;
        }
        mode |= self
            .platform
            .effective_rights(&dacl, &Principal::everyone())?
            .classify();
        Ok(mode)
    }
}
