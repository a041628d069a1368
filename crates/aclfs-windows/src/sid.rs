// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! SID marshaling and platform-memory guards

use std::io;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::ptr;
use std::slice;

use aclfs_core::{AclError, AclResult, Principal};
use windows_sys::Win32::Foundation::{LocalFree, HLOCAL, PSID};
use windows_sys::Win32::Security::Authorization::{
    ConvertSidToStringSidW, ConvertStringSidToSidW, EXPLICIT_ACCESS_W,
};
use windows_sys::Win32::Security::{CopySid, GetLengthSid, IsValidSid};

/// Owner of one `LocalAlloc`-backed allocation returned by a security API.
/// Freeing on drop covers every exit path, error paths included.
pub(crate) struct LocalBox<T> {
    ptr: *mut T,
}

impl<T> LocalBox<T> {
    /// Takes ownership of `ptr`. The pointer must have been allocated with
    /// `LocalAlloc` (directly or by a Win32 API documented to do so).
    pub(crate) unsafe fn from_raw(ptr: *mut T) -> Self {
        Self { ptr }
    }

    pub(crate) fn as_ptr(&self) -> *mut T {
        self.ptr
    }

    pub(crate) fn is_null(&self) -> bool {
        self.ptr.is_null()
    }
}

impl<T> Drop for LocalBox<T> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: `from_raw` requires a LocalAlloc-backed pointer and we
            // only free it once.
            unsafe {
                LocalFree(self.ptr as HLOCAL);
            }
        }
    }
}

/// Convert a UTF-8 string to a nul-terminated UTF-16 buffer.
pub(crate) fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Convert a path to a nul-terminated UTF-16 buffer.
pub(crate) fn path_to_wide(path: &Path) -> Vec<u16> {
    path.as_os_str().encode_wide().chain(std::iter::once(0)).collect()
}

/// An owned copy of a security identifier, independent of any
/// platform-allocated buffer it was marshaled from.
pub(crate) struct Sid {
    buf: Vec<u8>,
}

impl Sid {
    /// Parse a canonical SID string (e.g. `S-1-1-0`).
    pub(crate) fn from_principal(principal: &Principal) -> AclResult<Sid> {
        let wide = to_wide(principal.as_str());
        let mut raw: PSID = ptr::null_mut();
        // SAFETY: `wide` is nul terminated; the output SID is LocalAlloc
        // backed per the API contract and owned by the guard below.
        let ok = unsafe { ConvertStringSidToSidW(wide.as_ptr(), &mut raw) };
        if ok == 0 {
            return Err(AclError::InvalidPrincipal(principal.to_string()));
        }
        let guard = unsafe { LocalBox::from_raw(raw) };
        // SAFETY: conversion succeeded, so the pointer is a valid SID.
        unsafe { Sid::copy_from(guard.as_ptr()) }
    }

    /// Copy a SID out of platform-owned memory.
    ///
    /// # Safety
    /// `raw` must point to a valid SID for the duration of the call.
    pub(crate) unsafe fn copy_from(raw: PSID) -> AclResult<Sid> {
        if raw.is_null() || IsValidSid(raw) == 0 {
            return Err(AclError::InvalidPrincipal("<invalid sid>".to_string()));
        }
        let len = GetLengthSid(raw);
        let mut buf = vec![0u8; len as usize];
        if CopySid(len, buf.as_mut_ptr() as PSID, raw) == 0 {
            return Err(AclError::Token {
                op: "CopySid",
                privilege: String::new(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(Sid { buf })
    }

    pub(crate) fn as_psid(&self) -> PSID {
        self.buf.as_ptr() as PSID
    }

    /// Canonical string form, via the platform so the rendering matches what
    /// the descriptor APIs hand back.
    pub(crate) fn to_principal(&self) -> AclResult<Principal> {
        let mut raw: *mut u16 = ptr::null_mut();
        // SAFETY: `self.buf` holds a valid SID; the returned string is
        // LocalAlloc backed and owned by the guard below.
        let ok = unsafe { ConvertSidToStringSidW(self.as_psid(), &mut raw) };
        if ok == 0 {
            return Err(AclError::InvalidPrincipal("<unprintable sid>".to_string()));
        }
        let guard = unsafe { LocalBox::from_raw(raw) };
        let mut len = 0;
        // SAFETY: the converted string is nul terminated.
        unsafe {
            while *guard.as_ptr().add(len) != 0 {
                len += 1;
            }
        }
        // SAFETY: `len` was measured against the same buffer.
        let units = unsafe { slice::from_raw_parts(guard.as_ptr(), len) };
        Ok(Principal::new(String::from_utf16_lossy(units)))
    }
}

/// Bounds-checked view over the `(base pointer, count)` array returned by
/// `GetExplicitEntriesFromAclW`. Constructed once from the raw pair; callers
/// iterate copies instead of doing offset arithmetic.
pub(crate) struct ExplicitEntries {
    buf: LocalBox<EXPLICIT_ACCESS_W>,
    count: usize,
}

impl ExplicitEntries {
    /// # Safety
    /// `base` must point to `count` contiguous valid `EXPLICIT_ACCESS_W`
    /// records allocated with `LocalAlloc`.
    pub(crate) unsafe fn from_raw(base: *mut EXPLICIT_ACCESS_W, count: u32) -> Self {
        Self {
            buf: LocalBox::from_raw(base),
            count: count as usize,
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &EXPLICIT_ACCESS_W> {
        let slice: &[EXPLICIT_ACCESS_W] = if self.buf.is_null() || self.count == 0 {
            &[]
        } else {
            // SAFETY: the constructor contract guarantees `count` valid
            // records behind the pointer, alive as long as the guard.
            unsafe { slice::from_raw_parts(self.buf.as_ptr(), self.count) }
        };
        slice.iter()
    }
}
