// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The bridge facade

use std::sync::Mutex;

use crate::platform::SecurityPlatform;

/// POSIX-mode operations over an injected [`SecurityPlatform`].
///
/// Stateless apart from the privilege lock: descriptors are read fresh on
/// every call and never cached. Operations on different paths may run
/// concurrently; privilege elevation is process-wide state and is serialized
/// through the lock owned here (see [`AclFs::with_privilege`]).
pub struct AclFs<P> {
    pub(crate) platform: P,
    pub(crate) privilege_lock: Mutex<()>,
}

impl<P: SecurityPlatform> AclFs<P> {
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            privilege_lock: Mutex::new(()),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn into_platform(self) -> P {
        self.platform
    }
}
