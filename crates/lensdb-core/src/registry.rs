//! Singleton registry for in-dataset documents.
//!
//! An explicit process-wide cache keyed by (document kind, record id),
//! holding weak references to shared document state. At most one live
//! instance exists per key; lookups return the existing instance, saves
//! from views refresh it, and stale entries are pruned lazily on lookup.

use crate::{document::DocumentState, error::StoreError, types::RecordId};
use std::{
    cell::RefCell,
    collections::HashMap,
    rc::{Rc, Weak},
};
use tracing::debug;

pub(crate) type SharedState = Rc<RefCell<DocumentState>>;

type RegistryKey = (&'static str, RecordId);

thread_local! {
    static REGISTRY: RefCell<HashMap<RegistryKey, Weak<RefCell<DocumentState>>>> =
        RefCell::new(HashMap::new());
}

/// Register (or replace) the canonical instance for a record.
pub(crate) fn register(kind: &'static str, id: RecordId, state: &SharedState) {
    REGISTRY.with(|cell| {
        cell.borrow_mut().insert((kind, id), Rc::downgrade(state));
    });
    debug!(kind, %id, "registered singleton instance");
}

/// Look up the canonical instance for a record, pruning dead entries.
pub(crate) fn lookup(kind: &'static str, id: RecordId) -> Option<SharedState> {
    REGISTRY.with(|cell| {
        let mut registry = cell.borrow_mut();
        match registry.get(&(kind, id)).and_then(Weak::upgrade) {
            Some(state) => Some(state),
            None => {
                registry.remove(&(kind, id));
                None
            }
        }
    })
}

/// Drop the registry entry for a record, if any.
pub(crate) fn invalidate(kind: &'static str, id: RecordId) {
    REGISTRY.with(|cell| {
        if cell.borrow_mut().remove(&(kind, id)).is_some() {
            debug!(kind, %id, "invalidated singleton instance");
        }
    });
}

/// Reload the canonical instance's record from storage, so readers of the
/// singleton observe an update written through another handle.
///
/// Returns true if a live instance was refreshed.
pub(crate) fn refresh(kind: &'static str, id: RecordId) -> Result<bool, StoreError> {
    match lookup(kind, id) {
        Some(state) => {
            state.borrow_mut().record.reload_hard()?;
            debug!(kind, %id, "refreshed singleton instance");
            Ok(true)
        }
        None => Ok(false),
    }
}
