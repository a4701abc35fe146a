// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Automation-server tags: the static catalog and the session-scoped registry.

mod catalog;
mod registry;

pub use catalog::{Monitoring, TagKey, TagSpec, CATALOG};
pub use registry::{AddressSpace, PendingWrite, TagHandle, TagRegistry, TagWrite};
