// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Test support: an in-memory [`crate::SecurityPlatform`] implementation.

pub mod mem_platform;

pub use mem_platform::MemPlatform;
