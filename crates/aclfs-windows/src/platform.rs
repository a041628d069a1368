// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `SecurityPlatform` over the Win32 security API

use std::io;
use std::path::{Path, PathBuf};
use std::ptr;

use tracing::debug;

use aclfs_core::{
    AccessMode, Ace, AceInheritance, AclError, AclResult, NativeMetadata, Principal, RightsMask,
    SecurityDescriptor, SecurityPlatform, SecurityUpdate, DaclProtection, FIELD_DACL, FIELD_GROUP,
    FIELD_OWNER, MODE_DIR, MODE_FILE, MODE_SYMLINK,
};
use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_NOT_ALL_ASSIGNED, ERROR_SUCCESS, HANDLE, LUID, PSID,
};
use windows_sys::Win32::Security::Authorization::{
    GetEffectiveRightsFromAclW, GetExplicitEntriesFromAclW, GetNamedSecurityInfoW,
    SetEntriesInAclW, SetNamedSecurityInfoW, DENY_ACCESS, EXPLICIT_ACCESS_W, GRANT_ACCESS,
    NO_MULTIPLE_TRUSTEE, SET_ACCESS, SE_FILE_OBJECT, TRUSTEE_IS_SID, TRUSTEE_IS_UNKNOWN,
    TRUSTEE_W,
};
use windows_sys::Win32::Security::{
    AdjustTokenPrivileges, LookupPrivilegeValueW, ACL, DACL_SECURITY_INFORMATION,
    GROUP_SECURITY_INFORMATION, LUID_AND_ATTRIBUTES, NO_INHERITANCE,
    OWNER_SECURITY_INFORMATION, PROTECTED_DACL_SECURITY_INFORMATION, SE_PRIVILEGE_ENABLED,
    SUB_CONTAINERS_AND_OBJECTS_INHERIT, TOKEN_ADJUST_PRIVILEGES, TOKEN_PRIVILEGES, TOKEN_QUERY,
    UNPROTECTED_DACL_SECURITY_INFORMATION,
};
use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

use crate::sid::{path_to_wide, to_wide, ExplicitEntries, LocalBox, Sid};

/// Win32-backed security platform. Stateless; every operation maps onto one
/// or two native calls and marshals the results into owned value objects,
/// releasing all platform-allocated memory before returning.
#[derive(Default)]
pub struct WindowsPlatform;

impl WindowsPlatform {
    pub fn new() -> Self {
        Self
    }
}

fn win32_err(op: &'static str, path: &Path, code: u32) -> AclError {
    AclError::platform(op, path, io::Error::from_raw_os_error(code as i32))
}

fn trustee_for_sid(psid: PSID) -> TRUSTEE_W {
    TRUSTEE_W {
        pMultipleTrustee: ptr::null_mut(),
        MultipleTrusteeOperation: NO_MULTIPLE_TRUSTEE,
        TrusteeForm: TRUSTEE_IS_SID,
        TrusteeType: TRUSTEE_IS_UNKNOWN,
        ptstrName: psid as *mut u16,
    }
}

/// Marshal entries into `EXPLICIT_ACCESS_W` records. The returned SIDs own
/// the memory the trustee pointers reference and must outlive any use of the
/// records.
fn explicit_entries(aces: &[Ace]) -> AclResult<(Vec<Sid>, Vec<EXPLICIT_ACCESS_W>)> {
    let sids = aces
        .iter()
        .map(|ace| Sid::from_principal(&ace.trustee))
        .collect::<AclResult<Vec<_>>>()?;
    let entries = aces
        .iter()
        .zip(&sids)
        .map(|(ace, sid)| EXPLICIT_ACCESS_W {
            grfAccessPermissions: ace.rights.0,
            grfAccessMode: match ace.mode {
                AccessMode::Grant => GRANT_ACCESS,
                AccessMode::Deny => DENY_ACCESS,
            },
            grfInheritance: match ace.inheritance {
                AceInheritance::None => NO_INHERITANCE,
                AceInheritance::SubContainersAndObjects => SUB_CONTAINERS_AND_OBJECTS_INHERIT,
            },
            Trustee: trustee_for_sid(sid.as_psid()),
        })
        .collect();
    Ok((sids, entries))
}

/// Build a native ACL from explicit entries, merging into `old` when given.
fn build_acl(
    path: &Path,
    entries: &[EXPLICIT_ACCESS_W],
    old: *const ACL,
) -> AclResult<LocalBox<ACL>> {
    let mut acl: *mut ACL = ptr::null_mut();
    // SAFETY: `entries` holds initialized records whose trustee SIDs are kept
    // alive by the caller; the output ACL is LocalAlloc backed.
    let code = unsafe { SetEntriesInAclW(entries.len() as u32, entries.as_ptr(), old, &mut acl) };
    if code != ERROR_SUCCESS {
        return Err(win32_err("SetEntriesInAclW", path, code));
    }
    // SAFETY: the call succeeded and handed us ownership.
    Ok(unsafe { LocalBox::from_raw(acl) })
}

/// Marshal one explicit-entry record back into an [`Ace`]. Trustee forms
/// other than a SID (names, object pairs) are not produced by this bridge
/// and are skipped, matching the decoder contract.
fn ace_from_entry(entry: &EXPLICIT_ACCESS_W) -> AclResult<Option<Ace>> {
    if entry.Trustee.TrusteeForm != TRUSTEE_IS_SID {
        return Ok(None);
    }
    let mode = if entry.grfAccessMode == GRANT_ACCESS || entry.grfAccessMode == SET_ACCESS {
        AccessMode::Grant
    } else if entry.grfAccessMode == DENY_ACCESS {
        AccessMode::Deny
    } else {
        return Ok(None);
    };
    // SAFETY: for TRUSTEE_IS_SID the name pointer is a SID, valid while the
    // entry buffer is alive.
    let sid = unsafe { Sid::copy_from(entry.Trustee.ptstrName as PSID)? };
    Ok(Some(Ace {
        trustee: sid.to_principal()?,
        mode,
        rights: RightsMask(entry.grfAccessPermissions),
        inheritance: if entry.grfInheritance & SUB_CONTAINERS_AND_OBJECTS_INHERIT != 0 {
            AceInheritance::SubContainersAndObjects
        } else {
            AceInheritance::None
        },
        inherited: false,
    }))
}

/// Pull the explicit entries out of a native ACL.
fn entries_from_acl(path: &Path, acl: *mut ACL) -> AclResult<Vec<Ace>> {
    if acl.is_null() {
        // A null DACL grants everything to everyone; there are no explicit
        // entries to report.
        return Ok(Vec::new());
    }
    let mut count = 0u32;
    let mut list: *mut EXPLICIT_ACCESS_W = ptr::null_mut();
    // SAFETY: `acl` is a valid ACL; the output array is LocalAlloc backed and
    // owned by the view below.
    let code = unsafe { GetExplicitEntriesFromAclW(acl, &mut count, &mut list) };
    if code != ERROR_SUCCESS {
        return Err(win32_err("GetExplicitEntriesFromAclW", path, code));
    }
    // SAFETY: the call reported `count` records at `list`.
    let view = unsafe { ExplicitEntries::from_raw(list, count) };
    let mut aces = Vec::with_capacity(count as usize);
    for entry in view.iter() {
        if let Some(ace) = ace_from_entry(entry)? {
            aces.push(ace);
        }
    }
    Ok(aces)
}

struct TokenHandle(HANDLE);

impl Drop for TokenHandle {
    fn drop(&mut self) {
        // SAFETY: the handle came from a successful OpenProcessToken.
        unsafe {
            CloseHandle(self.0);
        }
    }
}

impl SecurityPlatform for WindowsPlatform {
    fn security_info(&self, path: &Path, fields: u32) -> AclResult<SecurityDescriptor> {
        let wide = path_to_wide(path);
        let mut flags = 0;
        if fields & FIELD_OWNER != 0 {
            flags |= OWNER_SECURITY_INFORMATION;
        }
        if fields & FIELD_GROUP != 0 {
            flags |= GROUP_SECURITY_INFORMATION;
        }
        if fields & FIELD_DACL != 0 {
            flags |= DACL_SECURITY_INFORMATION;
        }

        let mut owner: PSID = ptr::null_mut();
        let mut group: PSID = ptr::null_mut();
        let mut dacl: *mut ACL = ptr::null_mut();
        let mut descriptor: *mut std::ffi::c_void = ptr::null_mut();
        // SAFETY: out pointers are valid; the descriptor owns the returned
        // owner/group/DACL memory and is freed by the guard below after they
        // are marshaled into owned values.
        let code = unsafe {
            GetNamedSecurityInfoW(
                wide.as_ptr(),
                SE_FILE_OBJECT,
                flags,
                if fields & FIELD_OWNER != 0 { &mut owner } else { ptr::null_mut() },
                if fields & FIELD_GROUP != 0 { &mut group } else { ptr::null_mut() },
                if fields & FIELD_DACL != 0 { &mut dacl } else { ptr::null_mut() },
                ptr::null_mut(),
                &mut descriptor,
            )
        };
        if code != ERROR_SUCCESS {
            return Err(win32_err("GetNamedSecurityInfoW", path, code));
        }
        // SAFETY: the call succeeded; the descriptor is LocalAlloc backed.
        let _descriptor = unsafe { LocalBox::from_raw(descriptor) };

        let owner = if fields & FIELD_OWNER != 0 && !owner.is_null() {
            // SAFETY: points into the live descriptor.
            Some(unsafe { Sid::copy_from(owner)? }.to_principal()?)
        } else {
            None
        };
        let group = if fields & FIELD_GROUP != 0 && !group.is_null() {
            // SAFETY: points into the live descriptor.
            Some(unsafe { Sid::copy_from(group)? }.to_principal()?)
        } else {
            None
        };
        let dacl = if fields & FIELD_DACL != 0 {
            Some(entries_from_acl(path, dacl)?)
        } else {
            None
        };
        Ok(SecurityDescriptor { owner, group, dacl })
    }

    fn set_security_info(&self, path: &Path, update: &SecurityUpdate) -> AclResult<()> {
        let mut wide = path_to_wide(path);
        let mut flags = 0;

        let owner_sid = match &update.owner {
            Some(owner) => {
                flags |= OWNER_SECURITY_INFORMATION;
                Some(Sid::from_principal(owner)?)
            }
            None => None,
        };
        let group_sid = match &update.group {
            Some(group) => {
                flags |= GROUP_SECURITY_INFORMATION;
                Some(Sid::from_principal(group)?)
            }
            None => None,
        };

        // The marshaled entry records borrow these SIDs; both bindings must
        // stay alive until the native call returns.
        let marshaled = match &update.dacl {
            Some(dacl) => {
                flags |= DACL_SECURITY_INFORMATION;
                flags |= match update.protection {
                    DaclProtection::Protected => PROTECTED_DACL_SECURITY_INFORMATION,
                    DaclProtection::Unprotected => UNPROTECTED_DACL_SECURITY_INFORMATION,
                };
                let (sids, entries) = explicit_entries(dacl)?;
                let acl = build_acl(path, &entries, ptr::null())?;
                Some((sids, entries, acl))
            }
            None => None,
        };

        // SAFETY: SID and ACL buffers are owned locally and outlive the call.
        let code = unsafe {
            SetNamedSecurityInfoW(
                wide.as_mut_ptr(),
                SE_FILE_OBJECT,
                flags,
                owner_sid.as_ref().map_or(ptr::null_mut(), |s| s.as_psid()),
                group_sid.as_ref().map_or(ptr::null_mut(), |s| s.as_psid()),
                marshaled
                    .as_ref()
                    .map_or(ptr::null(), |(_, _, acl)| acl.as_ptr() as *const ACL),
                ptr::null(),
            )
        };
        if code != ERROR_SUCCESS {
            return Err(win32_err("SetNamedSecurityInfoW", path, code));
        }
        debug!(path = %path.display(), flags, "updated security info");
        Ok(())
    }

    fn merge_entries(&self, new: &[Ace], existing: &[Ace]) -> AclResult<Vec<Ace>> {
        let path = Path::new("");
        let (_old_sids, old_entries) = explicit_entries(existing)?;
        let old_acl = build_acl(path, &old_entries, ptr::null())?;
        let (_new_sids, new_entries) = explicit_entries(new)?;
        let merged = build_acl(path, &new_entries, old_acl.as_ptr())?;
        entries_from_acl(path, merged.as_ptr())
    }

    fn effective_rights(&self, dacl: &[Ace], trustee: &Principal) -> AclResult<RightsMask> {
        let path = Path::new("");
        let (_sids, entries) = explicit_entries(dacl)?;
        let acl = build_acl(path, &entries, ptr::null())?;

        let sid = Sid::from_principal(trustee)?;
        let mut native_trustee = trustee_for_sid(sid.as_psid());
        let mut rights = 0u32;
        // SAFETY: the ACL and trustee SID are owned locally and valid.
        let code =
            unsafe { GetEffectiveRightsFromAclW(acl.as_ptr(), &mut native_trustee, &mut rights) };
        if code != ERROR_SUCCESS {
            return Err(win32_err("GetEffectiveRightsFromAclW", path, code));
        }
        Ok(RightsMask(rights))
    }

    fn adjust_privilege(&self, privilege: &str, enable: bool) -> AclResult<()> {
        let token_err = |op: &'static str| AclError::Token {
            op,
            privilege: privilege.to_string(),
            source: io::Error::last_os_error(),
        };

        let mut raw: HANDLE = 0;
        // SAFETY: querying our own process token.
        let ok = unsafe {
            OpenProcessToken(
                GetCurrentProcess(),
                TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY,
                &mut raw,
            )
        };
        if ok == 0 {
            return Err(token_err("OpenProcessToken"));
        }
        let _token = TokenHandle(raw);

        let name = to_wide(privilege);
        let mut luid = LUID {
            LowPart: 0,
            HighPart: 0,
        };
        // SAFETY: `name` is nul terminated.
        if unsafe { LookupPrivilegeValueW(ptr::null(), name.as_ptr(), &mut luid) } == 0 {
            return Err(token_err("LookupPrivilegeValueW"));
        }

        let state = TOKEN_PRIVILEGES {
            PrivilegeCount: 1,
            Privileges: [LUID_AND_ATTRIBUTES {
                Luid: luid,
                Attributes: if enable { SE_PRIVILEGE_ENABLED } else { 0 },
            }],
        };
        // SAFETY: `state` describes exactly one privilege; no previous state
        // is requested back.
        let ok = unsafe {
            AdjustTokenPrivileges(raw, 0, &state, 0, ptr::null_mut(), ptr::null_mut())
        };
        if ok == 0 {
            return Err(token_err("AdjustTokenPrivileges"));
        }
        // AdjustTokenPrivileges reports partial application through the last
        // error, not the return value.
        // SAFETY: trivially safe call.
        if unsafe { GetLastError() } == ERROR_NOT_ALL_ASSIGNED {
            return Err(AclError::Token {
                op: "AdjustTokenPrivileges",
                privilege: privilege.to_string(),
                source: io::Error::from_raw_os_error(ERROR_NOT_ALL_ASSIGNED as i32),
            });
        }
        debug!(privilege, enable, "adjusted token privilege");
        Ok(())
    }

    fn metadata(&self, path: &Path, follow: bool) -> AclResult<NativeMetadata> {
        let meta = if follow {
            std::fs::metadata(path)
        } else {
            std::fs::symlink_metadata(path)
        }
        .map_err(|err| AclError::platform("GetFileAttributesExW", path, err))?;

        let type_bits = if meta.file_type().is_symlink() {
            MODE_SYMLINK
        } else if meta.is_dir() {
            MODE_DIR
        } else {
            MODE_FILE
        };
        let modified = meta
            .modified()
            .map_err(|err| AclError::platform("GetFileTime", path, err))?;
        Ok(NativeMetadata {
            len: meta.len(),
            modified,
            type_bits,
        })
    }

    fn mkdir(&self, path: &Path) -> AclResult<()> {
        std::fs::create_dir(path).map_err(|err| AclError::platform("CreateDirectoryW", path, err))
    }

    fn resolve_link(&self, path: &Path) -> AclResult<PathBuf> {
        std::fs::canonicalize(path).map_err(|err| AclError::platform("GetFinalPathNameByHandleW", path, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aclfs_core::AclFs;

    #[test]
    fn test_chmod_declared_round_trip_on_real_file() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let file = dir.path().join("perm.txt");
        std::fs::write(&file, b"x").expect("file should be written");

        let fs = AclFs::new(WindowsPlatform::new());
        for mode in [0o600, 0o640, 0o755, 0o444] {
            fs.chmod(&file, mode).expect("chmod should succeed");
            assert_eq!(fs.declared_mode(&file).expect("decode should succeed"), mode);
        }
    }

    #[test]
    fn test_ownership_read_returns_sid_principals() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let fs = AclFs::new(WindowsPlatform::new());
        let (owner, group) = fs
            .ownership(dir.path(), false)
            .expect("ownership should succeed");
        assert!(owner.as_str().starts_with("S-1-"));
        assert!(group.as_str().starts_with("S-1-"));
    }

    #[test]
    fn test_mkdir_all_on_real_tree() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let fs = AclFs::new(WindowsPlatform::new());
        let leaf = dir.path().join("a").join("b").join("c");
        fs.mkdir_all(&leaf, 0o750).expect("mkdir_all should succeed");
        assert!(fs.stat(&leaf).expect("stat should succeed").is_dir());
    }
}
