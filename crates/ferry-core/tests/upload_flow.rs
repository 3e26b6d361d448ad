// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::panic)]
//! End-to-end engine tests against a recording transport double.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use ferry_core::{
    Action, BatchPayload, ChangesetId, Document, Element, ElementId, ElementKind,
    ElementResult, IdMap, Limits, MemoryStore, Reference, Transport, TransportError,
    UploadError, Uploader,
};

/// One recorded `upload_batch` call.
#[derive(Debug, Clone)]
struct UploadRecord {
    changeset: u64,
    /// Source ids in payload order: creates, then modifies, then deletes.
    order: Vec<(ElementKind, i64)>,
    /// Full elements, same order, for reference-rewrite assertions.
    elements: Vec<Element>,
}

/// Recording transport: assigns sequential changeset and permanent ids.
#[derive(Debug, Default)]
struct RecordingTransport {
    next_changeset: Cell<u64>,
    next_permanent: Cell<i64>,
    fail_close: bool,
    fail_upload: bool,
    created: RefCell<Vec<BTreeMap<String, String>>>,
    uploads: RefCell<Vec<UploadRecord>>,
    closed: RefCell<Vec<u64>>,
}

impl RecordingTransport {
    fn new() -> Self {
        Self {
            next_changeset: Cell::new(0),
            next_permanent: Cell::new(1000),
            ..Self::default()
        }
    }

    fn upload_count(&self) -> usize {
        self.uploads.borrow().len()
    }

    fn batch_sizes(&self) -> Vec<usize> {
        self.uploads.borrow().iter().map(|u| u.order.len()).collect()
    }

    fn network_calls(&self) -> usize {
        self.created.borrow().len() + self.upload_count() + self.closed.borrow().len()
    }
}

impl Transport for RecordingTransport {
    fn create_changeset(
        &self,
        tags: &BTreeMap<String, String>,
    ) -> Result<ChangesetId, TransportError> {
        self.created.borrow_mut().push(tags.clone());
        let id = self.next_changeset.get() + 1;
        self.next_changeset.set(id);
        Ok(ChangesetId::from_raw(id))
    }

    fn upload_batch(
        &self,
        payload: &BatchPayload<'_>,
    ) -> Result<Vec<ElementResult>, TransportError> {
        if self.fail_upload {
            return Err(TransportError::Status {
                action: "upload_batch",
                status: 500,
                body: "boom".into(),
            });
        }
        let mut order = Vec::new();
        let mut elements = Vec::new();
        let mut results = Vec::new();
        for element in payload.creates.iter().chain(payload.modifies) {
            let permanent = self.next_permanent.get() + 1;
            self.next_permanent.set(permanent);
            order.push((element.kind, element.id.value()));
            elements.push(element.clone());
            results.push(ElementResult {
                kind: element.kind,
                source_id: element.id,
                permanent_id: Some(ElementId::from_raw(permanent)),
            });
        }
        for element in payload.deletes {
            order.push((element.kind, element.id.value()));
            elements.push(element.clone());
            results.push(ElementResult {
                kind: element.kind,
                source_id: element.id,
                permanent_id: None,
            });
        }
        self.uploads.borrow_mut().push(UploadRecord {
            changeset: payload.changeset.value(),
            order,
            elements,
        });
        Ok(results)
    }

    fn close_changeset(&self, id: ChangesetId) -> Result<(), TransportError> {
        if self.fail_close {
            return Err(TransportError::Status {
                action: "close_changeset",
                status: 409,
                body: "already closed".into(),
            });
        }
        self.closed.borrow_mut().push(id.value());
        Ok(())
    }
}

fn node(raw: i64) -> Element {
    Element::new(ElementKind::Node, ElementId::from_raw(raw))
}

fn way(raw: i64, node_refs: &[i64]) -> Element {
    let mut e = Element::new(ElementKind::Way, ElementId::from_raw(raw));
    for target in node_refs {
        e.refs.push(Reference::new(
            ElementKind::Node,
            ElementId::from_raw(*target),
        ));
    }
    e
}

fn relation(raw: i64, member_refs: &[(ElementKind, i64)]) -> Element {
    let mut e = Element::new(ElementKind::Relation, ElementId::from_raw(raw));
    for (kind, target) in member_refs {
        e.refs
            .push(Reference::new(*kind, ElementId::from_raw(*target)));
    }
    e
}

fn document(elements: Vec<Element>) -> Document {
    Document {
        elements,
        incremental: false,
    }
}

fn tags() -> BTreeMap<String, String> {
    BTreeMap::from([("comment".to_string(), "test run".to_string())])
}

fn uploader(
    transport: &RecordingTransport,
    limits: Limits,
) -> Uploader<&RecordingTransport, MemoryStore> {
    Uploader::new(transport, IdMap::load(MemoryStore::new()), tags(), limits)
}

// ── Batch boundary ──────────────────────────────────────────────────

#[test]
fn batch_boundary_splits_2500_creates_into_1000_1000_500() {
    let transport = RecordingTransport::new();
    let elements: Vec<Element> = (1..=2500).map(|i| node(-i)).collect();
    let mut up = uploader(&transport, Limits::default());

    let summary = up.run(&document(elements)).unwrap();

    assert_eq!(transport.batch_sizes(), vec![1000, 1000, 500]);
    assert_eq!(summary.batches_uploaded, 3);
    assert_eq!(summary.changesets_used, 1);
    assert_eq!(summary.elements_uploaded, 2500);

    // Insertion order survives chunking.
    let uploads = transport.uploads.borrow();
    assert_eq!(uploads[0].order.first(), Some(&(ElementKind::Node, -1)));
    assert_eq!(uploads[0].order.last(), Some(&(ElementKind::Node, -1000)));
    assert_eq!(uploads[1].order.first(), Some(&(ElementKind::Node, -1001)));
    assert_eq!(uploads[2].order.last(), Some(&(ElementKind::Node, -2500)));
}

// ── Changeset rollover ──────────────────────────────────────────────

#[test]
fn changeset_rollover_puts_boundary_edit_in_second_changeset() {
    let transport = RecordingTransport::new();
    let limits = Limits {
        batch: 4,
        changeset: 10,
    };
    let elements: Vec<Element> = (1..=11).map(|i| node(-i)).collect();
    let mut up = uploader(&transport, limits);

    let summary = up.run(&document(elements)).unwrap();

    assert_eq!(summary.changesets_used, 2);
    assert_eq!(transport.created.borrow().len(), 2);
    assert_eq!(transport.closed.borrow().len(), 2);
    // First changeset takes exactly its limit (batches 4+4+2), the boundary
    // edit lands in the second.
    assert_eq!(transport.batch_sizes(), vec![4, 4, 2, 1]);
    let uploads = transport.uploads.borrow();
    assert_eq!(uploads[2].changeset, 1);
    assert_eq!(uploads[3].changeset, 2);
    assert_eq!(uploads[3].order, vec![(ElementKind::Node, -11)]);
    assert_eq!(summary.elements_uploaded, 11);
}

#[test]
fn run_exactly_at_changeset_limit_uses_one_changeset() {
    let transport = RecordingTransport::new();
    let limits = Limits {
        batch: 4,
        changeset: 10,
    };
    let elements: Vec<Element> = (1..=10).map(|i| node(-i)).collect();
    let summary = uploader(&transport, limits).run(&document(elements)).unwrap();

    assert_eq!(summary.changesets_used, 1);
    assert_eq!(transport.created.borrow().len(), 1);
    assert_eq!(transport.batch_sizes(), vec![4, 4, 2]);
}

// ── Idempotent resume ───────────────────────────────────────────────

#[test]
fn second_run_against_populated_map_uploads_nothing() {
    let transport = RecordingTransport::new();
    let elements: Vec<Element> = (1..=5).map(|i| node(-i)).collect();
    let doc = document(elements);

    let mut first = uploader(&transport, Limits::default());
    let summary = first.run(&doc).unwrap();
    assert_eq!(summary.elements_uploaded, 5);
    let blob = first.into_idmap().into_store().contents().unwrap();

    let resumed_calls_before = transport.network_calls();
    let mut second = Uploader::new(
        &transport,
        IdMap::load(MemoryStore::with_blob(blob)),
        tags(),
        Limits::default(),
    );
    let summary = second.run(&doc).unwrap();

    assert_eq!(summary.elements_uploaded, 0);
    assert_eq!(summary.elements_skipped, 5);
    assert_eq!(summary.batches_uploaded, 0);
    assert_eq!(summary.changesets_used, 0);
    // The zero-edit resume never talks to the server at all.
    assert_eq!(transport.network_calls(), resumed_calls_before);
}

// ── Reference rewrite ───────────────────────────────────────────────

#[test]
fn mapped_reference_is_rewritten_and_unmapped_left_alone() {
    let transport = RecordingTransport::new();
    let mut idmap = IdMap::load(MemoryStore::new());
    // Node -1 was mapped by an earlier run.
    idmap
        .record(
            ElementKind::Node,
            ElementId::from_raw(-1),
            ElementId::from_raw(501),
        )
        .unwrap();
    let doc = document(vec![way(-10, &[-1, -7])]);
    let mut up = Uploader::new(&transport, idmap, tags(), Limits::default());
    up.run(&doc).unwrap();

    let uploads = transport.uploads.borrow();
    let uploaded_way = &uploads[0].elements[0];
    let ref_ids: Vec<i64> = uploaded_way.refs.iter().map(|r| r.id.value()).collect();
    assert_eq!(ref_ids, vec![501, -7]);
}

#[test]
fn way_sees_node_ids_mapped_by_an_earlier_batch_of_the_same_run() {
    let transport = RecordingTransport::new();
    let limits = Limits {
        batch: 1,
        changeset: 50_000,
    };
    let doc = document(vec![node(-1), way(-10, &[-1])]);
    let mut up = uploader(&transport, limits);
    up.run(&doc).unwrap();

    let uploads = transport.uploads.borrow();
    assert_eq!(uploads.len(), 2);
    // The node's permanent id from batch 1 is substituted into the way.
    assert_eq!(uploads[0].elements[0].id.value(), -1);
    let uploaded_way = &uploads[1].elements[0];
    assert_eq!(uploaded_way.refs[0].id.value(), 1001);
}

// ── Dependency ordering ─────────────────────────────────────────────

#[test]
fn relation_chain_uploads_referenced_before_referencer() {
    let transport = RecordingTransport::new();
    let doc = document(vec![
        relation(-1, &[(ElementKind::Relation, -2)]),
        relation(-2, &[(ElementKind::Relation, -3)]),
        relation(-3, &[]),
    ]);
    uploader(&transport, Limits::default()).run(&doc).unwrap();

    let uploads = transport.uploads.borrow();
    let order: Vec<i64> = uploads[0].order.iter().map(|(_, id)| *id).collect();
    assert_eq!(order, vec![-3, -2, -1]);
}

#[test]
fn relations_without_sibling_references_keep_document_order() {
    let transport = RecordingTransport::new();
    let doc = document(vec![
        relation(-5, &[(ElementKind::Node, -1)]),
        relation(-2, &[]),
        relation(-9, &[]),
    ]);
    uploader(&transport, Limits::default()).run(&doc).unwrap();

    let uploads = transport.uploads.borrow();
    let order: Vec<i64> = uploads[0].order.iter().map(|(_, id)| *id).collect();
    assert_eq!(order, vec![-5, -2, -9]);
}

#[test]
fn relation_cycle_aborts_the_run() {
    let transport = RecordingTransport::new();
    let doc = document(vec![
        relation(-1, &[(ElementKind::Relation, -2)]),
        relation(-2, &[(ElementKind::Relation, -1)]),
    ]);
    let err = uploader(&transport, Limits::default())
        .run(&doc)
        .unwrap_err();
    assert!(matches!(err, UploadError::Cycle(_)));
    // Nothing was uploaded for the cyclic set.
    assert_eq!(transport.upload_count(), 0);
}

// ── Rejection before any network call ───────────────────────────────

#[test]
fn incremental_document_is_rejected_before_any_network_call() {
    let transport = RecordingTransport::new();
    let doc = Document {
        elements: vec![node(-1)],
        incremental: true,
    };
    let err = uploader(&transport, Limits::default())
        .run(&doc)
        .unwrap_err();
    assert!(matches!(
        err,
        UploadError::Document(ferry_core::DocumentError::IncrementalChange)
    ));
    assert_eq!(transport.network_calls(), 0);
}

#[test]
fn oversized_way_is_rejected_before_any_network_call() {
    let transport = RecordingTransport::new();
    let refs: Vec<i64> = (1..=2001).map(|i| -i).collect();
    let doc = document(vec![node(-5000), way(-1, &refs)]);
    let err = uploader(&transport, Limits::default())
        .run(&doc)
        .unwrap_err();
    assert!(matches!(
        err,
        UploadError::Document(ferry_core::DocumentError::OversizedElement { .. })
    ));
    // Even the valid node before it was never uploaded.
    assert_eq!(transport.network_calls(), 0);
}

// ── Changeset lifecycle ─────────────────────────────────────────────

#[test]
fn zero_edit_run_never_opens_a_changeset() {
    let transport = RecordingTransport::new();
    let summary = uploader(&transport, Limits::default())
        .run(&document(Vec::new()))
        .unwrap();
    assert_eq!(summary, ferry_core::Summary::default());
    assert_eq!(transport.network_calls(), 0);
}

#[test]
fn elements_are_stamped_with_their_changeset_id() {
    let transport = RecordingTransport::new();
    let doc = document(vec![node(-1)]);
    uploader(&transport, Limits::default()).run(&doc).unwrap();

    let uploads = transport.uploads.borrow();
    assert_eq!(
        uploads[0].elements[0].changeset,
        Some(ChangesetId::from_raw(1))
    );
}

#[test]
fn failed_close_is_tolerated_and_the_run_completes() {
    let transport = RecordingTransport {
        fail_close: true,
        ..RecordingTransport::new()
    };
    let doc = document(vec![node(-1), node(-2)]);
    let summary = uploader(&transport, Limits::default()).run(&doc).unwrap();

    assert_eq!(summary.elements_uploaded, 2);
    assert_eq!(summary.batches_uploaded, 1);
    assert_eq!(summary.changesets_used, 1);
    assert!(transport.closed.borrow().is_empty());
}

// ── Deletions ───────────────────────────────────────────────────────

#[test]
fn confirmed_deletions_are_skip_eligible_on_resume() {
    let transport = RecordingTransport::new();
    let mut doomed = node(-1);
    doomed.action = Action::Delete;
    let doc = document(vec![doomed]);

    let mut first = uploader(&transport, Limits::default());
    first.run(&doc).unwrap();
    let blob = first.into_idmap().into_store().contents().unwrap();

    let mut second = Uploader::new(
        &transport,
        IdMap::load(MemoryStore::with_blob(blob)),
        tags(),
        Limits::default(),
    );
    let summary = second.run(&doc).unwrap();
    assert_eq!(summary.elements_skipped, 1);
    assert_eq!(summary.elements_uploaded, 0);
}

#[test]
fn actions_route_to_their_payload_lists() {
    let transport = RecordingTransport::new();
    let mut modified = node(-2);
    modified.action = Action::Modify;
    let mut deleted = node(-3);
    deleted.action = Action::Delete;
    let doc = document(vec![node(-1), modified, deleted]);
    uploader(&transport, Limits::default()).run(&doc).unwrap();

    // Payload order is creates, then modifies, then deletes.
    let uploads = transport.uploads.borrow();
    let order: Vec<i64> = uploads[0].order.iter().map(|(_, id)| *id).collect();
    assert_eq!(order, vec![-1, -2, -3]);
}

// ── Pending marker ──────────────────────────────────────────────────

#[test]
fn successful_run_leaves_no_pending_marker() {
    let transport = RecordingTransport::new();
    let doc = document(vec![node(-1)]);
    let mut up = uploader(&transport, Limits::default());
    up.run(&doc).unwrap();
    let store = up.into_idmap().into_store();
    assert!(!ferry_core::MapStore::pending(&store));
}

#[test]
fn failed_upload_aborts_and_leaves_the_pending_marker_raised() {
    let transport = RecordingTransport {
        fail_upload: true,
        ..RecordingTransport::new()
    };
    let doc = document(vec![node(-1)]);
    let mut up = uploader(&transport, Limits::default());
    let err = up.run(&doc).unwrap_err();
    assert!(matches!(err, UploadError::Transport(_)));
    // The marker was raised before the transport call and nothing cleared
    // it: a later load will warn about the interrupted window.
    let store = up.into_idmap().into_store();
    assert!(ferry_core::MapStore::pending(&store));
}
