// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory security platform
//!
//! Models the slice of native behavior the bridge depends on: per-path
//! descriptors with ordered DACLs, creator-placeholder resolution on DACL
//! writes, deny-aware effective-rights evaluation, and a simulated process
//! token, so every bridge algorithm is testable on any host.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use crate::error::{AclError, AclResult};
use crate::platform::{
    NativeMetadata, SecurityPlatform, SecurityUpdate, FIELD_DACL, FIELD_GROUP, FIELD_OWNER,
};
use crate::rights::RightsMask;
use crate::types::{
    AccessMode, Ace, Principal, SecurityDescriptor, MODE_DIR, MODE_FILE, MODE_SYMLINK,
    SID_CREATOR_GROUP, SID_CREATOR_OWNER,
};

/// Default owner assigned to newly created nodes.
pub const DEFAULT_OWNER: &str = "S-1-5-21-0-0-0-1000";
/// Default primary group assigned to newly created nodes.
pub const DEFAULT_GROUP: &str = "S-1-5-21-0-0-0-513";

const SYMLINK_HOP_LIMIT: usize = 40;

#[derive(Clone, Debug)]
enum NodeKind {
    Directory,
    File,
    Symlink(PathBuf),
}

#[derive(Clone, Debug)]
struct Node {
    kind: NodeKind,
    owner: Principal,
    group: Principal,
    dacl: Vec<Ace>,
    protected: bool,
    len: u64,
    modified: SystemTime,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            owner: Principal::new(DEFAULT_OWNER),
            group: Principal::new(DEFAULT_GROUP),
            dacl: Vec::new(),
            protected: false,
            len: 0,
            modified: SystemTime::now(),
        }
    }

    fn type_bits(&self) -> u32 {
        match self.kind {
            NodeKind::Directory => MODE_DIR,
            NodeKind::File => MODE_FILE,
            NodeKind::Symlink(_) => MODE_SYMLINK,
        }
    }
}

#[derive(Default)]
struct TokenState {
    available: HashSet<String>,
    enabled: HashSet<String>,
    adjust_log: Vec<(String, bool)>,
}

/// In-memory [`SecurityPlatform`]. Paths are stored in component-normalized
/// form; the root directory always exists.
pub struct MemPlatform {
    nodes: Mutex<HashMap<PathBuf, Node>>,
    token: Mutex<TokenState>,
    fail_mkdir: Mutex<HashSet<PathBuf>>,
}

impl MemPlatform {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(PathBuf::from("/"), Node::new(NodeKind::Directory));
        let mut available = HashSet::new();
        available.insert(crate::ownership::SE_RESTORE_PRIVILEGE.to_string());
        Self {
            nodes: Mutex::new(nodes),
            token: Mutex::new(TokenState {
                available,
                ..TokenState::default()
            }),
            fail_mkdir: Mutex::new(HashSet::new()),
        }
    }

    fn normalize(path: &Path) -> PathBuf {
        let normalized: PathBuf = path.components().collect();
        if normalized.as_os_str().is_empty() {
            PathBuf::from("/")
        } else {
            normalized
        }
    }

    // --- test setup helpers ---

    pub fn add_file(&self, path: &Path) {
        self.nodes
            .lock()
            .unwrap()
            .insert(Self::normalize(path), Node::new(NodeKind::File));
    }

    pub fn add_dir(&self, path: &Path) {
        self.nodes
            .lock()
            .unwrap()
            .insert(Self::normalize(path), Node::new(NodeKind::Directory));
    }

    pub fn add_symlink(&self, path: &Path, target: &Path) {
        self.nodes.lock().unwrap().insert(
            Self::normalize(path),
            Node::new(NodeKind::Symlink(target.to_path_buf())),
        );
    }

    /// Install a DACL verbatim, bypassing placeholder resolution.
    pub fn set_dacl(&self, path: &Path, dacl: Vec<Ace>) {
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes.get_mut(&Self::normalize(path)).expect("node should exist");
        node.dacl = dacl;
    }

    pub fn dacl(&self, path: &Path) -> Vec<Ace> {
        let nodes = self.nodes.lock().unwrap();
        nodes
            .get(&Self::normalize(path))
            .expect("node should exist")
            .dacl
            .clone()
    }

    pub fn ownership_of(&self, path: &Path) -> (Principal, Principal) {
        let nodes = self.nodes.lock().unwrap();
        let node = nodes.get(&Self::normalize(path)).expect("node should exist");
        (node.owner.clone(), node.group.clone())
    }

    /// Make a later `mkdir` of this exact path fail, for partial-failure
    /// tests.
    pub fn fail_mkdir_at(&self, path: &Path) {
        self.fail_mkdir.lock().unwrap().insert(Self::normalize(path));
    }

    /// Remove a privilege from the token entirely, so enabling it fails.
    pub fn drop_privilege(&self, privilege: &str) {
        self.token.lock().unwrap().available.remove(privilege);
    }

    pub fn privilege_enabled(&self, privilege: &str) -> bool {
        self.token.lock().unwrap().enabled.contains(privilege)
    }

    /// Every (privilege, enable) pair passed to `adjust_privilege`, in order.
    pub fn adjust_calls(&self) -> Vec<(String, bool)> {
        self.token.lock().unwrap().adjust_log.clone()
    }

    // --- internals ---

    fn resolve(&self, path: &Path) -> AclResult<PathBuf> {
        let nodes = self.nodes.lock().unwrap();
        let mut current = Self::normalize(path);
        for _ in 0..SYMLINK_HOP_LIMIT {
            match nodes.get(&current) {
                Some(node) => match &node.kind {
                    NodeKind::Symlink(target) => {
                        current = if target.is_absolute() {
                            Self::normalize(target)
                        } else {
                            let parent = current.parent().unwrap_or(Path::new("/"));
                            Self::normalize(&parent.join(target))
                        };
                    }
                    _ => return Ok(current),
                },
                None => return Err(AclError::NotFound(current)),
            }
        }
        Err(AclError::Platform {
            op: "resolve_link",
            path: path.to_path_buf(),
            source: io::Error::other("too many levels of symbolic links"),
        })
    }

    /// Replace the creator placeholders with the node's actual owner and
    /// group, the way the platform resolves them when a DACL is installed.
    fn resolve_placeholders(owner: &Principal, group: &Principal, dacl: &[Ace]) -> Vec<Ace> {
        dacl.iter()
            .cloned()
            .map(|mut ace| {
                if ace.trustee.as_str() == SID_CREATOR_OWNER {
                    ace.trustee = owner.clone();
                } else if ace.trustee.as_str() == SID_CREATOR_GROUP {
                    ace.trustee = group.clone();
                }
                ace
            })
            .collect()
    }

    fn ace_applies(ace: &Ace, trustee: &Principal) -> bool {
        ace.trustee == *trustee || ace.trustee.is_everyone()
    }
}

impl Default for MemPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityPlatform for MemPlatform {
    fn security_info(&self, path: &Path, fields: u32) -> AclResult<SecurityDescriptor> {
        let nodes = self.nodes.lock().unwrap();
        let node = nodes
            .get(&Self::normalize(path))
            .ok_or_else(|| AclError::NotFound(path.to_path_buf()))?;
        Ok(SecurityDescriptor {
            owner: (fields & FIELD_OWNER != 0).then(|| node.owner.clone()),
            group: (fields & FIELD_GROUP != 0).then(|| node.group.clone()),
            dacl: (fields & FIELD_DACL != 0).then(|| node.dacl.clone()),
        })
    }

    fn set_security_info(&self, path: &Path, update: &SecurityUpdate) -> AclResult<()> {
        // Ownership writes require the restore privilege to be enabled on
        // the token, mirroring the native access check.
        if update.owner.is_some() || update.group.is_some() {
            let token = self.token.lock().unwrap();
            if !token.enabled.contains(crate::ownership::SE_RESTORE_PRIVILEGE) {
                return Err(AclError::PermissionDenied(path.to_path_buf()));
            }
        }

        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes
            .get_mut(&Self::normalize(path))
            .ok_or_else(|| AclError::NotFound(path.to_path_buf()))?;

        if let Some(owner) = &update.owner {
            node.owner = owner.clone();
        }
        if let Some(group) = &update.group {
            node.group = group.clone();
        }
        if let Some(dacl) = &update.dacl {
            node.dacl = Self::resolve_placeholders(&node.owner, &node.group, dacl);
            node.protected = update.protection == crate::platform::DaclProtection::Protected;
        }
        Ok(())
    }

    fn merge_entries(&self, new: &[Ace], existing: &[Ace]) -> AclResult<Vec<Ace>> {
        // New explicit entries lead and replace retained explicit entries
        // for the same trustee and access mode; inherited entries and
        // unrelated trustees keep their relative order.
        let mut merged: Vec<Ace> = new.to_vec();
        for ace in existing {
            let superseded = !ace.inherited
                && new
                    .iter()
                    .any(|n| n.trustee == ace.trustee && n.mode == ace.mode);
            if !superseded {
                merged.push(ace.clone());
            }
        }
        Ok(merged)
    }

    fn effective_rights(&self, dacl: &[Ace], trustee: &Principal) -> AclResult<RightsMask> {
        // Entries are evaluated in DACL order, first match winning per bit: a
        // bit already denied cannot be granted later, and vice versa. A deny
        // for one permission union therefore also pins the standard bits it
        // shares with the others (SYNCHRONIZE, READ_CONTROL), so a later
        // grant cannot complete any union overlapping the denied mask.
        let mut granted = RightsMask::EMPTY;
        let mut denied = RightsMask::EMPTY;
        for ace in dacl {
            if !Self::ace_applies(ace, trustee) {
                continue;
            }
            match ace.mode {
                AccessMode::Grant => granted.0 |= ace.rights.0 & !denied.0,
                AccessMode::Deny => denied.0 |= ace.rights.0 & !granted.0,
            }
        }
        Ok(granted)
    }

    fn adjust_privilege(&self, privilege: &str, enable: bool) -> AclResult<()> {
        let mut token = self.token.lock().unwrap();
        token.adjust_log.push((privilege.to_string(), enable));
        if enable {
            if !token.available.contains(privilege) {
                return Err(AclError::Token {
                    op: "AdjustTokenPrivileges",
                    privilege: privilege.to_string(),
                    source: io::Error::other("privilege not held"),
                });
            }
            token.enabled.insert(privilege.to_string());
        } else {
            token.enabled.remove(privilege);
        }
        Ok(())
    }

    fn metadata(&self, path: &Path, follow: bool) -> AclResult<NativeMetadata> {
        let resolved = if follow {
            self.resolve(path)?
        } else {
            Self::normalize(path)
        };
        let nodes = self.nodes.lock().unwrap();
        let node = nodes
            .get(&resolved)
            .ok_or_else(|| AclError::NotFound(path.to_path_buf()))?;
        Ok(NativeMetadata {
            len: node.len,
            modified: node.modified,
            type_bits: node.type_bits(),
        })
    }

    fn mkdir(&self, path: &Path) -> AclResult<()> {
        let normalized = Self::normalize(path);
        if self.fail_mkdir.lock().unwrap().contains(&normalized) {
            return Err(AclError::Platform {
                op: "CreateDirectoryW",
                path: normalized,
                source: io::Error::other("injected mkdir failure"),
            });
        }

        let mut nodes = self.nodes.lock().unwrap();
        if nodes.contains_key(&normalized) {
            return Err(AclError::Platform {
                op: "CreateDirectoryW",
                path: normalized,
                source: io::Error::from(io::ErrorKind::AlreadyExists),
            });
        }
        if let Some(parent) = normalized.parent() {
            if !parent.as_os_str().is_empty() {
                match nodes.get(parent) {
                    Some(node) if matches!(node.kind, NodeKind::Directory) => {}
                    Some(_) => return Err(AclError::NotADirectory(parent.to_path_buf())),
                    None => return Err(AclError::NotFound(parent.to_path_buf())),
                }
            }
        }
        nodes.insert(normalized, Node::new(NodeKind::Directory));
        Ok(())
    }

    fn resolve_link(&self, path: &Path) -> AclResult<PathBuf> {
        self.resolve(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rights::{FILE_READ_DATA, FILE_READ_EA, FILE_WRITE_DATA, PERM_READ, PERM_WRITE};

    #[test]
    fn test_effective_rights_deny_first_wins() {
        let platform = MemPlatform::new();
        let dacl = vec![
            Ace::deny(Principal::everyone(), PERM_READ),
            Ace::grant(Principal::everyone(), PERM_READ | PERM_WRITE),
        ];
        let rights = platform
            .effective_rights(&dacl, &Principal::everyone())
            .unwrap();
        assert!(!rights.contains(PERM_READ));
        // The denied read union shares SYNCHRONIZE and READ_CONTROL with the
        // write union, so the later grant cannot complete write either; only
        // the write-specific bits come through.
        assert!(!rights.contains(PERM_WRITE));
        assert!(rights.contains(FILE_WRITE_DATA));
    }

    #[test]
    fn test_effective_rights_disjoint_deny_leaves_other_class_intact() {
        let platform = MemPlatform::new();
        let dacl = vec![
            Ace::deny(Principal::everyone(), FILE_READ_DATA | FILE_READ_EA),
            Ace::grant(Principal::everyone(), PERM_READ | PERM_WRITE),
        ];
        let rights = platform
            .effective_rights(&dacl, &Principal::everyone())
            .unwrap();
        assert!(!rights.contains(PERM_READ));
        assert!(rights.contains(PERM_WRITE));
    }

    #[test]
    fn test_effective_rights_grant_first_survives_later_deny() {
        let platform = MemPlatform::new();
        let dacl = vec![
            Ace::grant(Principal::everyone(), PERM_READ),
            Ace::deny(Principal::everyone(), PERM_READ),
        ];
        let rights = platform
            .effective_rights(&dacl, &Principal::everyone())
            .unwrap();
        assert!(rights.contains(PERM_READ));
    }

    #[test]
    fn test_everyone_entries_apply_to_any_trustee() {
        let platform = MemPlatform::new();
        let dacl = vec![Ace::grant(Principal::everyone(), PERM_READ)];
        let rights = platform
            .effective_rights(&dacl, &Principal::new(DEFAULT_OWNER))
            .unwrap();
        assert!(rights.contains(PERM_READ));
    }

    #[test]
    fn test_creator_placeholders_resolve_on_write() {
        let platform = MemPlatform::new();
        platform.add_file("/f".as_ref());
        let update = SecurityUpdate::replace_dacl(
            vec![Ace::grant(Principal::creator_owner(), PERM_READ)],
            crate::platform::DaclProtection::Protected,
        );
        platform.set_security_info("/f".as_ref(), &update).unwrap();

        let dacl = platform.dacl("/f".as_ref());
        assert_eq!(dacl[0].trustee, Principal::new(DEFAULT_OWNER));
    }

    #[test]
    fn test_mkdir_requires_existing_parent() {
        let platform = MemPlatform::new();
        let err = platform.mkdir("/no/parent".as_ref()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_symlink_chain_resolution() {
        let platform = MemPlatform::new();
        platform.add_file("/real".as_ref());
        platform.add_symlink("/a".as_ref(), "/b".as_ref());
        platform.add_symlink("/b".as_ref(), "/real".as_ref());
        assert_eq!(
            platform.resolve_link("/a".as_ref()).unwrap(),
            PathBuf::from("/real")
        );
    }

    #[test]
    fn test_symlink_cycle_fails() {
        let platform = MemPlatform::new();
        platform.add_symlink("/x".as_ref(), "/y".as_ref());
        platform.add_symlink("/y".as_ref(), "/x".as_ref());
        assert!(platform.resolve_link("/x".as_ref()).is_err());
    }
}
