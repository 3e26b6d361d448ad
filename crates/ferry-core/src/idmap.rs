// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Durable mapping from source identifiers to server-assigned permanent
//! identifiers.
//!
//! The map is loaded once at start, mutated only when the server confirms a
//! batch, and persisted after every successfully uploaded batch — bounding
//! the crash-risk window to exactly one in-flight batch. A source identifier
//! that is present in the map is permanently skip-eligible: re-running the
//! same input against a populated map produces no duplicate edits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::element::{ElementId, ElementKind};
use crate::error::{ConflictError, StoreError};
use crate::store::MapStore;

/// Persisted form: a flat entry list, deterministic by `(kind, source)`.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedMap {
    entries: Vec<PersistedEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    kind: ElementKind,
    source: i64,
    permanent: i64,
}

/// Identifier map over a [`MapStore`] backend.
///
/// Generic over the store the way config services are generic over their
/// storage port; swap in [`crate::MemoryStore`] for tests or
/// `ferry_idmap_fs::FsMapStore` for the sidecar file.
#[derive(Debug)]
pub struct IdMap<S> {
    store: S,
    table: BTreeMap<ElementKind, BTreeMap<ElementId, ElementId>>,
    interrupted: bool,
}

impl<S: MapStore> IdMap<S> {
    /// Best-effort restore from `store`.
    ///
    /// A missing blob means "empty map" — the normal first-run state. An
    /// unreadable or undecodable blob is also treated as empty, with a
    /// warning: refusing to start would strand a run over a damaged sidecar,
    /// and the worst outcome of an empty map is re-uploading (the same
    /// at-least-once window the engine already accepts). A surviving pending
    /// marker means the previous run crashed between server acceptance and
    /// persist; that is warned about and reported via
    /// [`interrupted`](IdMap::interrupted).
    pub fn load(store: S) -> Self {
        let mut table: BTreeMap<ElementKind, BTreeMap<ElementId, ElementId>> = BTreeMap::new();
        for kind in ElementKind::ALL {
            table.insert(kind, BTreeMap::new());
        }
        match store.read() {
            Ok(bytes) => match serde_json::from_slice::<PersistedMap>(&bytes) {
                Ok(persisted) => {
                    for entry in persisted.entries {
                        if let Some(per_kind) = table.get_mut(&entry.kind) {
                            per_kind.insert(
                                ElementId::from_raw(entry.source),
                                ElementId::from_raw(entry.permanent),
                            );
                        }
                    }
                }
                Err(err) => {
                    warn!(%err, "identifier map undecodable; starting from an empty map");
                }
            },
            Err(StoreError::NotFound) => {}
            Err(err) => {
                warn!(%err, "identifier map unreadable; starting from an empty map");
            }
        }
        let interrupted = store.pending();
        if interrupted {
            warn!(
                "previous run was interrupted after a batch was accepted but before its \
                 identifiers were recorded; already-accepted edits may be uploaded again"
            );
        }
        Self {
            store,
            table,
            interrupted,
        }
    }

    /// Looks up the permanent identifier recorded for `(kind, id)`.
    #[must_use]
    pub fn lookup(&self, kind: ElementKind, id: ElementId) -> Option<ElementId> {
        self.table.get(&kind).and_then(|m| m.get(&id)).copied()
    }

    /// Returns `true` if `(kind, id)` has been resolved — mapped or
    /// deletion-confirmed.
    #[must_use]
    pub fn contains(&self, kind: ElementKind, id: ElementId) -> bool {
        self.lookup(kind, id).is_some()
    }

    /// Records a confirmed mapping.
    ///
    /// Re-recording the same value is an accepted no-op. Recording a
    /// different value for an existing key is refused: once assigned, a
    /// permanent identifier is never overwritten.
    ///
    /// # Errors
    /// Returns [`ConflictError`] when a different permanent identifier was
    /// already recorded for this key.
    pub fn record(
        &mut self,
        kind: ElementKind,
        id: ElementId,
        permanent: ElementId,
    ) -> Result<(), ConflictError> {
        let per_kind = self.table.entry(kind).or_default();
        if let Some(existing) = per_kind.get(&id).copied() {
            if existing != permanent {
                return Err(ConflictError {
                    kind,
                    source: id,
                    existing,
                    rejected: permanent,
                });
            }
            return Ok(());
        }
        per_kind.insert(id, permanent);
        Ok(())
    }

    /// Records a confirmed deletion: the identifier maps to itself, so every
    /// later lookup treats it as already processed.
    pub fn record_deleted(&mut self, kind: ElementKind, id: ElementId) {
        self.table.entry(kind).or_default().entry(id).or_insert(id);
    }

    /// Serializes the full table and hands it to the store's atomic write,
    /// then clears the pending marker.
    ///
    /// # Errors
    /// Returns [`StoreError`] when serialization or the store write fails.
    pub fn persist(&self) -> Result<(), StoreError> {
        let entries: Vec<PersistedEntry> = self
            .table
            .iter()
            .flat_map(|(kind, per_kind)| {
                per_kind.iter().map(|(source, permanent)| PersistedEntry {
                    kind: *kind,
                    source: source.value(),
                    permanent: permanent.value(),
                })
            })
            .collect();
        let bytes = serde_json::to_vec(&PersistedMap { entries })?;
        self.store.write_atomic(&bytes)?;
        self.store.clear_pending()
    }

    /// Raises the store's pending marker. Called immediately before a batch
    /// upload so a crash inside the acceptance-to-persist window is visible
    /// on the next load.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the store cannot raise the marker.
    pub fn mark_pending(&self) -> Result<(), StoreError> {
        self.store.mark_pending()
    }

    /// `true` when load found a pending marker from a crashed run.
    #[must_use]
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    /// Number of resolved identifiers across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.values().map(BTreeMap::len).sum()
    }

    /// Returns `true` if no identifier has been resolved yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the map and returns the underlying store.
    pub fn into_store(self) -> S {
        self.store
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn node(raw: i64) -> ElementId {
        ElementId::from_raw(raw)
    }

    #[test]
    fn empty_store_loads_empty_map() {
        let map = IdMap::load(MemoryStore::new());
        assert!(map.is_empty());
        assert!(!map.interrupted());
    }

    #[test]
    fn record_then_lookup() {
        let mut map = IdMap::load(MemoryStore::new());
        map.record(ElementKind::Node, node(-1), node(101)).unwrap();
        assert_eq!(map.lookup(ElementKind::Node, node(-1)), Some(node(101)));
        // Kinds are independent namespaces.
        assert_eq!(map.lookup(ElementKind::Way, node(-1)), None);
    }

    #[test]
    fn re_record_same_value_is_ok() {
        let mut map = IdMap::load(MemoryStore::new());
        map.record(ElementKind::Node, node(-1), node(101)).unwrap();
        map.record(ElementKind::Node, node(-1), node(101)).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn conflicting_record_is_refused() {
        let mut map = IdMap::load(MemoryStore::new());
        map.record(ElementKind::Node, node(-1), node(101)).unwrap();
        let err = map
            .record(ElementKind::Node, node(-1), node(102))
            .unwrap_err();
        assert_eq!(err.existing, node(101));
        assert_eq!(err.rejected, node(102));
        // The original mapping survives.
        assert_eq!(map.lookup(ElementKind::Node, node(-1)), Some(node(101)));
    }

    #[test]
    fn record_deleted_self_maps() {
        let mut map = IdMap::load(MemoryStore::new());
        map.record_deleted(ElementKind::Way, node(42));
        assert!(map.contains(ElementKind::Way, node(42)));
        assert_eq!(map.lookup(ElementKind::Way, node(42)), Some(node(42)));
    }

    #[test]
    fn persist_load_round_trip() {
        let mut map = IdMap::load(MemoryStore::new());
        map.record(ElementKind::Node, node(-1), node(101)).unwrap();
        map.record(ElementKind::Relation, node(-9), node(77)).unwrap();
        map.record_deleted(ElementKind::Way, node(5));
        map.persist().unwrap();

        let blob = map.into_store().contents().unwrap();
        let restored = IdMap::load(MemoryStore::with_blob(blob));
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.lookup(ElementKind::Node, node(-1)), Some(node(101)));
        assert_eq!(restored.lookup(ElementKind::Relation, node(-9)), Some(node(77)));
        assert_eq!(restored.lookup(ElementKind::Way, node(5)), Some(node(5)));
    }

    #[test]
    fn corrupt_blob_loads_empty() {
        let restored = IdMap::load(MemoryStore::with_blob(b"not json".to_vec()));
        assert!(restored.is_empty());
    }

    #[test]
    fn surviving_pending_marker_reports_interrupted() {
        let store = MemoryStore::new();
        store.set_pending(true);
        let map = IdMap::load(store);
        assert!(map.interrupted());
    }

    #[test]
    fn persist_clears_pending_marker() {
        let mut map = IdMap::load(MemoryStore::new());
        map.mark_pending().unwrap();
        map.record(ElementKind::Node, node(-1), node(1)).unwrap();
        map.persist().unwrap();
        assert!(!map.into_store().pending());
    }
}
