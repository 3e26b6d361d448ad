// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Storage port for the persisted identifier map.
//!
//! The engine serializes the map itself (see [`crate::IdMap`]); a `MapStore`
//! only moves opaque bytes. The filesystem adapter lives in the
//! `ferry-idmap-fs` crate; [`MemoryStore`] ships here for tests and
//! embedders that do not want durability.

use std::cell::{Cell, RefCell};

use crate::error::StoreError;

/// Storage port for the raw identifier-map blob.
///
/// # Atomicity Contract
///
/// [`write_atomic`](MapStore::write_atomic) must be all-or-nothing: after a
/// crash at any point during the call, a subsequent [`read`](MapStore::read)
/// returns either the previous blob or the new one, never a mixture. This is
/// the property the engine's persist-after-every-batch rule leans on.
///
/// # Pending Marker
///
/// The marker brackets the window between a batch being accepted by the
/// server and its results being durably persisted. Stores that cannot
/// express a marker may keep the no-op defaults; [`pending`](MapStore::pending)
/// then never reports an interrupted run.
pub trait MapStore {
    /// Load the persisted blob. Returns [`StoreError::NotFound`] when no
    /// blob has ever been written.
    fn read(&self) -> Result<Vec<u8>, StoreError>;

    /// Persist a blob atomically (see the trait-level contract).
    fn write_atomic(&self, bytes: &[u8]) -> Result<(), StoreError>;

    /// Raise the pending marker. Called immediately before a batch upload.
    fn mark_pending(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Clear the pending marker. Called after a successful persist.
    fn clear_pending(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Returns `true` if a pending marker survives from an earlier run —
    /// i.e. that run crashed between server acceptance and persist.
    fn pending(&self) -> bool {
        false
    }
}

/// In-memory [`MapStore`].
///
/// Interior mutability keeps the trait surface `&self` (the filesystem
/// adapter needs nothing more); the engine is single-threaded, so `RefCell`
/// is sufficient.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blob: RefCell<Option<Vec<u8>>>,
    pending: Cell<bool>,
}

impl MemoryStore {
    /// An empty store: `read` reports `NotFound` until the first write.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-seeded with a blob, as if a previous run had persisted it.
    #[must_use]
    pub fn with_blob(bytes: Vec<u8>) -> Self {
        Self {
            blob: RefCell::new(Some(bytes)),
            pending: Cell::new(false),
        }
    }

    /// The current blob, if any. Clones, so the store stays usable.
    #[must_use]
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.blob.borrow().clone()
    }

    /// Force the pending flag, simulating a crash between acceptance and
    /// persist.
    pub fn set_pending(&self, value: bool) {
        self.pending.set(value);
    }
}

impl MapStore for MemoryStore {
    fn read(&self) -> Result<Vec<u8>, StoreError> {
        self.blob.borrow().clone().ok_or(StoreError::NotFound)
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<(), StoreError> {
        *self.blob.borrow_mut() = Some(bytes.to_vec());
        Ok(())
    }

    fn mark_pending(&self) -> Result<(), StoreError> {
        self.pending.set(true);
        Ok(())
    }

    fn clear_pending(&self) -> Result<(), StoreError> {
        self.pending.set(false);
        Ok(())
    }

    fn pending(&self) -> bool {
        self.pending.get()
    }
}
