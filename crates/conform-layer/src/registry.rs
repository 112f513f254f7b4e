// SPDX-License-Identifier: CEPL-1.0
use conform_api::{ObjectHandle, ObjectType};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::debug;

use crate::session::SessionState;
use crate::swapchain::SwapchainState;

/// Registry key: a raw handle value scoped by its object type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleKey {
    pub raw: u64,
    pub object_type: ObjectType,
}

impl HandleKey {
    pub fn new(raw: u64, object_type: ObjectType) -> Self {
        Self { raw, object_type }
    }

    pub fn of<H: ObjectHandle>(handle: H) -> Self {
        Self::new(handle.as_raw(), H::OBJECT_TYPE)
    }
}

impl fmt::Display for HandleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} 0x{:x}", self.object_type, self.raw)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{0} is already registered")]
    DuplicateHandle(HandleKey),
    #[error("{0} is not registered")]
    UnknownHandle(HandleKey),
    #[error("{0} already has custom state attached")]
    AlreadyAttached(HandleKey),
}

/// Type specific state hung off a handle record.
#[derive(Debug)]
pub enum CustomState {
    Session(SessionState),
    Swapchain(SwapchainState),
}

impl CustomState {
    pub fn as_session(&self) -> Option<&SessionState> {
        match self {
            CustomState::Session(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_swapchain(&self) -> Option<&SwapchainState> {
        match self {
            CustomState::Swapchain(state) => Some(state),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct HandleRecord {
    key: HandleKey,
    parent: Option<HandleKey>,
    children: Mutex<Vec<HandleKey>>,
    custom: OnceLock<CustomState>,
}

impl HandleRecord {
    fn new(key: HandleKey, parent: Option<HandleKey>) -> Self {
        Self {
            key,
            parent,
            children: Mutex::new(Vec::new()),
            custom: OnceLock::new(),
        }
    }

    pub fn key(&self) -> HandleKey {
        self.key
    }

    pub fn parent(&self) -> Option<HandleKey> {
        self.parent
    }

    pub fn children(&self) -> Vec<HandleKey> {
        self.children.lock().clone()
    }

    /// Sets the custom state. Only the first call succeeds.
    pub fn attach(&self, state: CustomState) -> Result<(), RegistryError> {
        self.custom
            .set(state)
            .map_err(|_| RegistryError::AlreadyAttached(self.key))
    }

    pub fn custom_state(&self) -> Option<&CustomState> {
        self.custom.get()
    }

    pub fn session_state(&self) -> Option<&SessionState> {
        self.custom_state().and_then(CustomState::as_session)
    }

    pub fn swapchain_state(&self) -> Option<&SwapchainState> {
        self.custom_state().and_then(CustomState::as_swapchain)
    }
}

/// Maps live handles to their records.
///
/// The map lock is only held for the duration of a single operation and
/// never while a swapchain tracker is locked. When a child is linked to its
/// parent the map lock is taken first, then the parent's child list.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    records: RwLock<HashMap<HandleKey, Arc<HandleRecord>>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        key: HandleKey,
        parent: Option<HandleKey>,
    ) -> Result<Arc<HandleRecord>, RegistryError> {
        let mut records = self.records.write();
        if records.contains_key(&key) {
            return Err(RegistryError::DuplicateHandle(key));
        }
        if let Some(parent_key) = parent {
            let parent_record = records
                .get(&parent_key)
                .ok_or(RegistryError::UnknownHandle(parent_key))?;
            parent_record.children.lock().push(key);
        }

        let record = Arc::new(HandleRecord::new(key, parent));
        records.insert(key, Arc::clone(&record));
        debug!(handle = %key, "registered");
        Ok(record)
    }

    pub fn lookup(&self, key: HandleKey) -> Result<Arc<HandleRecord>, RegistryError> {
        self.records
            .read()
            .get(&key)
            .cloned()
            .ok_or(RegistryError::UnknownHandle(key))
    }

    pub fn contains(&self, key: HandleKey) -> bool {
        self.records.read().contains_key(&key)
    }

    /// Removes `key` and every descendant, returning the removed keys in
    /// parent-first order. Custom state is dropped with the last reference to
    /// each record.
    pub fn unregister(&self, key: HandleKey) -> Result<Vec<HandleKey>, RegistryError> {
        let mut records = self.records.write();
        let record = records
            .remove(&key)
            .ok_or(RegistryError::UnknownHandle(key))?;

        if let Some(parent) = record.parent.and_then(|p| records.get(&p)) {
            parent.children.lock().retain(|child| *child != key);
        }

        let mut removed = vec![key];
        let mut pending = record.children();
        while let Some(child) = pending.pop() {
            if let Some(child_record) = records.remove(&child) {
                pending.extend(child_record.children());
                removed.push(child);
            }
        }

        debug!(handle = %key, cascaded = removed.len() - 1, "unregistered");
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
