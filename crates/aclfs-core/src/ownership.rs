// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Owner and group management
//!
//! Assigning an arbitrary owner requires an elevated privilege; ordinary
//! processes cannot hand resources to principals they do not act as. The
//! restore privilege is used rather than the take-ownership one: with the
//! latter, well-known groups could be assigned but individual users could
//! not.

use std::io;
use std::path::Path;

use tracing::debug;

use crate::error::{AclError, AclResult};
use crate::fs::AclFs;
use crate::platform::{SecurityPlatform, SecurityUpdate, FIELD_GROUP, FIELD_OWNER};
use crate::types::Principal;

/// Privilege enabling ownership assignment to arbitrary principals.
pub const SE_RESTORE_PRIVILEGE: &str = "SeRestorePrivilege";

impl<P: SecurityPlatform> AclFs<P> {
    /// Read the owner and group principals of a path, resolving symlinks
    /// first when `follow` is set.
    pub fn ownership(&self, path: &Path, follow: bool) -> AclResult<(Principal, Principal)> {
        let path = if follow {
            self.platform.resolve_link(path)?
        } else {
            path.to_path_buf()
        };
        let sd = self
            .platform
            .security_info(&path, FIELD_OWNER | FIELD_GROUP)?;
        match (sd.owner, sd.group) {
            (Some(owner), Some(group)) => Ok((owner, group)),
            _ => Err(AclError::Platform {
                op: "security_info",
                path,
                source: io::Error::other("descriptor missing owner or group"),
            }),
        }
    }

    /// Write the owner and group principals of a path, resolving symlinks
    /// first when `follow` is set.
    ///
    /// The descriptor write runs inside a [`AclFs::with_privilege`] scope for
    /// the restore privilege. If elevation fails, no write is attempted and
    /// ownership is untouched. On success, a failed privilege revocation is
    /// returned as the secondary diagnostic; the applied change stands.
    pub fn set_ownership(
        &self,
        path: &Path,
        owner: &Principal,
        group: &Principal,
        follow: bool,
    ) -> AclResult<Option<AclError>> {
        let path = if follow {
            self.platform.resolve_link(path)?
        } else {
            path.to_path_buf()
        };
        debug!(path = %path.display(), %owner, %group, "setting ownership");

        let update = SecurityUpdate::ownership(owner.clone(), group.clone());
        let outcome = self.with_privilege(SE_RESTORE_PRIVILEGE, || {
            self.platform.set_security_info(&path, &update)
        })?;
        Ok(outcome.revoke_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemPlatform;

    fn bridge_with_file(path: &str) -> AclFs<MemPlatform> {
        let platform = MemPlatform::new();
        platform.add_file(path.as_ref());
        AclFs::new(platform)
    }

    #[test]
    fn test_ownership_round_trip() {
        let fs = bridge_with_file("/owned.txt");
        let owner = Principal::new("S-1-5-21-7-7-7-1001");
        let group = Principal::new("S-1-5-21-7-7-7-513");

        let diag = fs
            .set_ownership("/owned.txt".as_ref(), &owner, &group, false)
            .expect("set_ownership should succeed");
        assert!(diag.is_none());

        let (got_owner, got_group) =
            fs.ownership("/owned.txt".as_ref(), false).expect("ownership should succeed");
        assert_eq!(got_owner, owner);
        assert_eq!(got_group, group);
    }

    #[test]
    fn test_set_ownership_without_privilege_changes_nothing() {
        let fs = bridge_with_file("/owned.txt");
        let before = fs.platform().ownership_of("/owned.txt".as_ref());
        fs.platform().drop_privilege(SE_RESTORE_PRIVILEGE);

        let err = fs
            .set_ownership(
                "/owned.txt".as_ref(),
                &Principal::new("S-1-5-21-7-7-7-1001"),
                &Principal::new("S-1-5-21-7-7-7-513"),
                false,
            )
            .unwrap_err();
        assert!(matches!(err, AclError::PrivilegeElevation { .. }));
        assert_eq!(fs.platform().ownership_of("/owned.txt".as_ref()), before);
    }

    #[test]
    fn test_set_ownership_follows_symlink() {
        let fs = bridge_with_file("/target.txt");
        fs.platform().add_symlink("/link".as_ref(), "/target.txt".as_ref());

        let owner = Principal::new("S-1-5-21-7-7-7-1001");
        let group = Principal::new("S-1-5-21-7-7-7-513");
        fs.set_ownership("/link".as_ref(), &owner, &group, true)
            .expect("set_ownership through link should succeed");

        assert_eq!(
            fs.platform().ownership_of("/target.txt".as_ref()),
            (owner.clone(), group.clone())
        );
        // The follow variant of the read sees the target's principals too.
        assert_eq!(fs.ownership("/link".as_ref(), true).unwrap(), (owner, group));
    }

    #[test]
    fn test_ownership_of_missing_path_is_not_found() {
        let fs = AclFs::new(MemPlatform::new());
        let err = fs.ownership("/absent".as_ref(), false).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_privilege_disabled_after_set_ownership() {
        let fs = bridge_with_file("/owned.txt");
        fs.set_ownership(
            "/owned.txt".as_ref(),
            &Principal::new("S-1-5-21-7-7-7-1001"),
            &Principal::new("S-1-5-21-7-7-7-513"),
            false,
        )
        .expect("set_ownership should succeed");
        assert!(!fs.platform().privilege_enabled(SE_RESTORE_PRIVILEGE));
    }
}
