// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The tag registry.
//!
//! The registry owns every handle of the current automation session. Handles
//! carry the generation of the session that bound them, so closing the
//! session invalidates all of them at once without touching the holders.
//!
//! Writes are fire-and-forget: [`TagRegistry::write`] hands back a
//! [`TagWrite`] for the driver and records it as pending. The ack is matched
//! back to its tag with [`TagRegistry::complete_write`].

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::{BindError, TagError};
use crate::tag::catalog::{TagKey, CATALOG};
use crate::types::{Generation, NodeAddress, TagValue, WriteId};

// =============================================================================
// AddressSpace
// =============================================================================

/// The set of addresses the connected server exposes.
pub trait AddressSpace {
    /// Returns `true` if the server knows `address`.
    fn contains(&self, address: &NodeAddress) -> bool;
}

impl AddressSpace for HashSet<NodeAddress> {
    fn contains(&self, address: &NodeAddress) -> bool {
        HashSet::contains(self, address)
    }
}

// =============================================================================
// Handles
// =============================================================================

/// A typed handle to a bound tag.
///
/// Usable only while the session that bound it is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagHandle {
    key: TagKey,
    generation: Generation,
}

impl TagHandle {
    /// The tag this handle refers to.
    #[inline]
    pub fn key(&self) -> TagKey {
        self.key
    }

    /// The generation of the session that bound this handle.
    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

/// A write request ready for the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagWrite {
    /// Write identifier used to match the ack.
    pub id: WriteId,
    /// Written tag.
    pub key: TagKey,
    /// Remote address.
    pub address: NodeAddress,
    /// Value, already coerced to the declared type.
    pub value: TagValue,
}

/// A write awaiting its ack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    /// Written tag.
    pub key: TagKey,
    /// Written value.
    pub value: TagValue,
}

#[derive(Debug)]
struct Binding {
    address: NodeAddress,
    last_value: Option<TagValue>,
}

// =============================================================================
// TagRegistry
// =============================================================================

/// Owner of all tag handles and pending writes.
#[derive(Debug, Default)]
pub struct TagRegistry {
    generation: Option<Generation>,
    bindings: HashMap<TagKey, Binding>,
    by_address: HashMap<NodeAddress, TagKey>,
    pending: HashMap<WriteId, PendingWrite>,
    next_write: u64,
}

impl TagRegistry {
    /// Creates an empty registry with no open session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session. Any previous session is closed first.
    pub fn open_session(&mut self, generation: Generation) {
        if self.generation.is_some() {
            self.close_session();
        }
        self.generation = Some(generation);
    }

    /// Closes the session, invalidating every handle and pending write.
    ///
    /// Returns the number of handles invalidated.
    pub fn close_session(&mut self) -> usize {
        let invalidated = self.bindings.len();
        let dropped_writes = self.pending.len();
        self.generation = None;
        self.bindings.clear();
        self.by_address.clear();
        self.pending.clear();
        if invalidated > 0 || dropped_writes > 0 {
            debug!(invalidated, dropped_writes, "Tag session closed");
        }
        invalidated
    }

    /// The generation of the open session, if any.
    #[inline]
    pub fn generation(&self) -> Option<Generation> {
        self.generation
    }

    /// Returns `true` if a session is open.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.generation.is_some()
    }

    /// Number of bound tags.
    pub fn bound_count(&self) -> usize {
        self.bindings.len()
    }

    /// Number of writes awaiting an ack.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Binds `key` to `address`.
    ///
    /// Fails if no session is open or `space` does not contain the address.
    pub fn bind(
        &mut self,
        key: TagKey,
        address: NodeAddress,
        space: &dyn AddressSpace,
    ) -> Result<TagHandle, BindError> {
        let generation = self.generation.ok_or(BindError::NotConnected { tag: key })?;
        if !space.contains(&address) {
            return Err(BindError::UnknownAddress { tag: key, address });
        }

        if let Some(previous) = self.bindings.remove(&key) {
            self.by_address.remove(&previous.address);
        }
        self.by_address.insert(address.clone(), key);
        self.bindings.insert(
            key,
            Binding {
                address,
                last_value: None,
            },
        );
        Ok(TagHandle { key, generation })
    }

    /// Binds every catalog tag under `prefix`.
    ///
    /// Returns the tags that failed to bind. They stay unbound for the session.
    pub fn bind_catalog(&mut self, prefix: &str, space: &dyn AddressSpace) -> Vec<BindError> {
        CATALOG
            .iter()
            .filter_map(|spec| self.bind(spec.key, spec.address(prefix), space).err())
            .collect()
    }

    /// Returns the handle of a bound tag.
    pub fn handle(&self, key: TagKey) -> Option<TagHandle> {
        let generation = self.generation?;
        self.bindings
            .contains_key(&key)
            .then_some(TagHandle { key, generation })
    }

    /// Returns the address of a bound tag.
    pub fn address(&self, key: TagKey) -> Option<&NodeAddress> {
        self.bindings.get(&key).map(|b| &b.address)
    }

    /// Maps an address back to its tag.
    pub fn resolve(&self, address: &NodeAddress) -> Option<TagKey> {
        self.by_address.get(address).copied()
    }

    fn binding_mut(&mut self, handle: TagHandle) -> Result<&mut Binding, TagError> {
        if self.generation != Some(handle.generation) {
            return Err(TagError::StaleHandle { tag: handle.key });
        }
        self.bindings
            .get_mut(&handle.key)
            .ok_or(TagError::NotBound { tag: handle.key })
    }

    /// Records a value observed on `address` (read path).
    ///
    /// The value is coerced to the declared type and cached.
    pub fn observe(
        &mut self,
        address: &NodeAddress,
        value: TagValue,
    ) -> Result<(TagKey, TagValue), TagError> {
        let key = self.resolve(address).ok_or_else(|| TagError::UnknownAddress {
            address: address.clone(),
        })?;
        if !key.direction().can_read() {
            return Err(TagError::DirectionMismatch {
                tag: key,
                direction: key.direction(),
                operation: "read",
            });
        }
        let coerced = value.coerce(key.value_type()).ok_or(TagError::TypeMismatch {
            tag: key,
            expected: key.value_type(),
            actual: value.value_type(),
        })?;
        if let Some(binding) = self.bindings.get_mut(&key) {
            binding.last_value = Some(coerced.clone());
        }
        Ok((key, coerced))
    }

    /// Returns the last value observed on the tag.
    pub fn read(&mut self, handle: TagHandle) -> Result<Option<TagValue>, TagError> {
        let key = handle.key;
        if !key.direction().can_read() {
            return Err(TagError::DirectionMismatch {
                tag: key,
                direction: key.direction(),
                operation: "read",
            });
        }
        Ok(self.binding_mut(handle)?.last_value.clone())
    }

    /// Prepares a write and records it as pending.
    pub fn write(&mut self, handle: TagHandle, value: TagValue) -> Result<TagWrite, TagError> {
        let key = handle.key;
        if !key.direction().can_write() {
            return Err(TagError::DirectionMismatch {
                tag: key,
                direction: key.direction(),
                operation: "write",
            });
        }
        let coerced = value.coerce(key.value_type()).ok_or(TagError::TypeMismatch {
            tag: key,
            expected: key.value_type(),
            actual: value.value_type(),
        })?;
        let address = self.binding_mut(handle)?.address.clone();

        self.next_write += 1;
        let id = WriteId(self.next_write);
        self.pending.insert(
            id,
            PendingWrite {
                key,
                value: coerced.clone(),
            },
        );
        Ok(TagWrite {
            id,
            key,
            address,
            value: coerced,
        })
    }

    /// Matches a write ack to its pending write.
    ///
    /// Returns `None` for acks of an older session or unknown ids.
    pub fn complete_write(&mut self, id: WriteId, generation: Generation) -> Option<PendingWrite> {
        if self.generation != Some(generation) {
            return None;
        }
        self.pending.remove(&id)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueType;

    const PREFIX: &str = "ns=2;s=M";

    fn full_space() -> HashSet<NodeAddress> {
        CATALOG.iter().map(|s| s.address(PREFIX)).collect()
    }

    fn open_registry(generation: u64) -> TagRegistry {
        let mut registry = TagRegistry::new();
        registry.open_session(Generation::new(generation));
        assert!(registry.bind_catalog(PREFIX, &full_space()).is_empty());
        registry
    }

    #[test]
    fn test_bind_requires_session() {
        let mut registry = TagRegistry::new();
        let err = registry
            .bind(TagKey::JobApprove, NodeAddress::new("x"), &full_space())
            .unwrap_err();
        assert_eq!(err, BindError::NotConnected { tag: TagKey::JobApprove });
    }

    #[test]
    fn test_bind_unknown_address() {
        let mut registry = TagRegistry::new();
        registry.open_session(Generation::new(1));
        let mut space = full_space();
        space.remove(&TagKey::JobColor.spec().address(PREFIX));

        let errors = registry.bind_catalog(PREFIX, &space);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], BindError::UnknownAddress { tag: TagKey::JobColor, .. }));
        assert!(registry.handle(TagKey::JobColor).is_none());
        assert!(registry.handle(TagKey::JobModel).is_some());
    }

    #[test]
    fn test_write_and_complete() {
        let mut registry = open_registry(1);
        let handle = registry.handle(TagKey::AuthApprove).unwrap();

        let write = registry.write(handle, TagValue::Int32(8)).unwrap();
        assert_eq!(write.value, TagValue::Int16(8));
        assert_eq!(write.address.as_str(), "ns=2;s=M.autho_approve");
        assert_eq!(registry.pending_count(), 1);

        let pending = registry.complete_write(write.id, Generation::new(1)).unwrap();
        assert_eq!(pending.key, TagKey::AuthApprove);
        assert!(registry.complete_write(write.id, Generation::new(1)).is_none());
    }

    #[test]
    fn test_write_direction_and_type() {
        let mut registry = open_registry(1);
        let username = registry.handle(TagKey::Username).unwrap();
        assert!(matches!(
            registry.write(username, "bob".into()),
            Err(TagError::DirectionMismatch { operation: "write", .. })
        ));

        let name = registry.handle(TagKey::AuthName).unwrap();
        assert!(matches!(
            registry.write(name, TagValue::Int16(1)),
            Err(TagError::TypeMismatch { expected: ValueType::String, .. })
        ));
        assert!(matches!(
            registry.read(name),
            Err(TagError::DirectionMismatch { operation: "read", .. })
        ));
    }

    #[test]
    fn test_close_invalidates_handles() {
        let mut registry = open_registry(1);
        let handle = registry.handle(TagKey::JobApprove).unwrap();
        let write = registry.write(handle, TagValue::Int16(8)).unwrap();

        assert_eq!(registry.close_session(), CATALOG.len());
        assert!(!registry.is_open());
        assert_eq!(
            registry.write(handle, TagValue::Int16(8)),
            Err(TagError::StaleHandle { tag: TagKey::JobApprove })
        );
        assert!(registry.complete_write(write.id, Generation::new(1)).is_none());

        // A new session does not revive old handles.
        registry.open_session(Generation::new(2));
        registry.bind_catalog(PREFIX, &full_space());
        assert!(registry.write(handle, TagValue::Int16(8)).unwrap_err().is_stale());
    }

    #[test]
    fn test_observe_and_read() {
        let mut registry = open_registry(3);
        let address = TagKey::PowerStatus.spec().address(PREFIX);

        let (key, value) = registry.observe(&address, TagValue::Int16(1)).unwrap();
        assert_eq!(key, TagKey::PowerStatus);
        assert_eq!(value, TagValue::UInt16(1));

        let handle = registry.handle(TagKey::PowerStatus).unwrap();
        assert_eq!(registry.read(handle).unwrap(), Some(TagValue::UInt16(1)));

        let unknown = NodeAddress::new("ns=2;s=elsewhere");
        assert!(matches!(
            registry.observe(&unknown, TagValue::Int16(1)),
            Err(TagError::UnknownAddress { .. })
        ));
    }
}
