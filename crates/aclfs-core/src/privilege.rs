// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Scoped process-token privilege elevation
//!
//! Privilege state lives on the process token, not on the call, so two
//! overlapping elevations of the same privilege would race on enable/disable.
//! Every scope therefore runs under the single lock owned by [`AclFs`];
//! callers never touch token state directly.

use tracing::warn;

use crate::error::{AclError, AclResult};
use crate::fs::AclFs;
use crate::platform::SecurityPlatform;

/// Result of a privileged scope: the body's value plus an optional
/// best-effort-cleanup diagnostic. A failed revocation after a successful
/// body never rolls the body's change back.
#[derive(Debug)]
pub struct ScopeOutcome<T> {
    pub value: T,
    pub revoke_error: Option<AclError>,
}

impl<P: SecurityPlatform> AclFs<P> {
    /// Enable `privilege` on the process token, run `body`, and disable the
    /// privilege again on every exit path, including unwinding.
    ///
    /// Elevation failure aborts before `body` runs and maps to
    /// [`AclError::PrivilegeElevation`]. A revocation failure is joined with
    /// the body's error, or surfaced as the outcome's secondary diagnostic
    /// when the body succeeded.
    pub fn with_privilege<T>(
        &self,
        privilege: &str,
        body: impl FnOnce() -> AclResult<T>,
    ) -> AclResult<ScopeOutcome<T>> {
        // The lock protects no data, only ordering, so a poisoned lock left
        // by a panicking body is safe to reclaim; the unwind guard has
        // already revoked that scope's privilege.
        let _serialized = self
            .privilege_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        self.platform
            .adjust_privilege(privilege, true)
            .map_err(|source| AclError::PrivilegeElevation {
                privilege: privilege.to_string(),
                source: Box::new(source),
            })?;

        // Revokes if body unwinds; the normal path disarms this and revokes
        // explicitly so the revocation error stays observable.
        let unwind_guard = scopeguard::guard(&self.platform, |platform| {
            let _ = platform.adjust_privilege(privilege, false);
        });
        let result = body();
        let platform = scopeguard::ScopeGuard::into_inner(unwind_guard);

        let revoke_error = platform.adjust_privilege(privilege, false).err();
        match (result, revoke_error) {
            (Ok(value), revoke_error) => {
                if let Some(err) = &revoke_error {
                    warn!(privilege, error = %err, "privilege revocation failed after success");
                }
                Ok(ScopeOutcome {
                    value,
                    revoke_error,
                })
            }
            (Err(primary), None) => Err(primary),
            (Err(primary), Some(revocation)) => Err(AclError::Joined {
                primary: Box::new(primary),
                revocation: Box::new(revocation),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ownership::SE_RESTORE_PRIVILEGE;
    use crate::testing::MemPlatform;

    #[test]
    fn test_privilege_disabled_after_successful_body() {
        let fs = AclFs::new(MemPlatform::new());
        let outcome = fs
            .with_privilege(SE_RESTORE_PRIVILEGE, || {
                assert!(fs.platform().privilege_enabled(SE_RESTORE_PRIVILEGE));
                Ok(42)
            })
            .expect("scope should succeed");
        assert_eq!(outcome.value, 42);
        assert!(outcome.revoke_error.is_none());
        assert!(!fs.platform().privilege_enabled(SE_RESTORE_PRIVILEGE));
    }

    #[test]
    fn test_privilege_disabled_after_failing_body() {
        let fs = AclFs::new(MemPlatform::new());
        let err = fs
            .with_privilege(SE_RESTORE_PRIVILEGE, || {
                Err::<(), _>(AclError::PermissionDenied("/x".into()))
            })
            .unwrap_err();
        assert!(matches!(err, AclError::PermissionDenied(_)));
        assert!(!fs.platform().privilege_enabled(SE_RESTORE_PRIVILEGE));

        // Exactly one enable followed by one disable.
        let calls = fs.platform().adjust_calls();
        assert_eq!(
            calls,
            vec![
                (SE_RESTORE_PRIVILEGE.to_string(), true),
                (SE_RESTORE_PRIVILEGE.to_string(), false),
            ]
        );
    }

    #[test]
    fn test_elevation_failure_skips_body() {
        let fs = AclFs::new(MemPlatform::new());
        fs.platform().drop_privilege(SE_RESTORE_PRIVILEGE);

        let mut body_ran = false;
        let err = fs
            .with_privilege(SE_RESTORE_PRIVILEGE, || {
                body_ran = true;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, AclError::PrivilegeElevation { .. }));
        assert!(!body_ran, "body must not run when elevation fails");
    }

    #[test]
    fn test_privilege_revoked_on_unwind() {
        let fs = std::sync::Arc::new(AclFs::new(MemPlatform::new()));
        let fs_clone = fs.clone();
        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _ = fs_clone.with_privilege(SE_RESTORE_PRIVILEGE, || -> AclResult<()> {
                panic!("body panicked");
            });
        }));
        assert!(panicked.is_err());
        assert!(!fs.platform().privilege_enabled(SE_RESTORE_PRIVILEGE));
    }

    #[test]
    fn test_scope_stays_usable_after_body_panic() {
        let fs = std::sync::Arc::new(AclFs::new(MemPlatform::new()));
        let fs_clone = fs.clone();
        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _ = fs_clone.with_privilege(SE_RESTORE_PRIVILEGE, || -> AclResult<()> {
                panic!("body panicked");
            });
        }));
        assert!(panicked.is_err());

        // One panicking caller must not take the privilege path down with it.
        let outcome = fs
            .with_privilege(SE_RESTORE_PRIVILEGE, || Ok(7))
            .expect("scope should work after an earlier panic");
        assert_eq!(outcome.value, 7);
        assert!(outcome.revoke_error.is_none());
        assert!(!fs.platform().privilege_enabled(SE_RESTORE_PRIVILEGE));
    }
}
