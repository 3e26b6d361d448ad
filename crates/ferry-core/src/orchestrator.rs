// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Upload orchestrator: walks a document in dependency-safe order and feeds
//! it through the changeset/diffset machinery.
//!
//! Processing order is nodes, then ways, then relations. Elements whose
//! source identifier is already mapped are skipped — this is what makes a
//! re-run against a populated identifier map idempotent. References whose
//! target is already mapped are rewritten in place; unmapped references are
//! left untouched, pointing at elements uploaded earlier in the same run
//! (the server resolves same-batch forward references).

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::batch::AddOutcome;
use crate::changeset::Changeset;
use crate::element::{Document, Element, ElementId, ElementKind};
use crate::error::{DocumentError, UploadError};
use crate::idmap::IdMap;
use crate::resolver;
use crate::store::MapStore;
use crate::transport::Transport;

/// Hard bound on child references per composite element. The server enforces
/// a comparable bound; rejecting up front beats failing mid-upload.
pub const MAX_CHILD_REFS: usize = 2000;

/// Container bounds for the two-level chunking.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Edits per diffset (server-side atomic batch). Minimum 1.
    pub batch: usize,
    /// Edits per changeset (server-imposed transaction ceiling). Minimum 1.
    pub changeset: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            batch: 1000,
            changeset: 50_000,
        }
    }
}

/// What a completed run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Batches accepted by the server.
    pub batches_uploaded: usize,
    /// Server-side changesets opened (and closed) by the run.
    pub changesets_used: usize,
    /// Elements skipped because their source identifier was already mapped.
    pub elements_skipped: usize,
    /// Elements submitted to the server.
    pub elements_uploaded: usize,
}

/// The upload engine: owns the transport, the identifier map, and the run
/// configuration.
#[derive(Debug)]
pub struct Uploader<T, S> {
    transport: T,
    idmap: IdMap<S>,
    tags: BTreeMap<String, String>,
    limits: Limits,
}

impl<T: Transport, S: MapStore> Uploader<T, S> {
    /// Builds an uploader. `tags` describe the run (comment, created_by …)
    /// and are attached to every changeset it opens.
    pub fn new(
        transport: T,
        idmap: IdMap<S>,
        tags: BTreeMap<String, String>,
        limits: Limits,
    ) -> Self {
        Self {
            transport,
            idmap,
            tags,
            limits,
        }
    }

    /// Read access to the identifier map (e.g. for reporting).
    pub fn idmap(&self) -> &IdMap<S> {
        &self.idmap
    }

    /// Consumes the uploader and returns the identifier map.
    pub fn into_idmap(self) -> IdMap<S> {
        self.idmap
    }

    /// Uploads `document`, returning a run summary.
    ///
    /// Validation failures abort before any network call. Transport failures
    /// on create/upload abort immediately; a failed changeset close is
    /// logged and tolerated. After all elements are processed the current
    /// changeset is force-closed, flushing any partial final diffset.
    ///
    /// # Errors
    /// Returns [`UploadError`] per the taxonomy in [`crate::error`].
    pub fn run(&mut self, document: &Document) -> Result<Summary, UploadError> {
        validate(document)?;

        let mut changeset = Changeset::new(self.tags.clone(), &self.limits);
        let mut summary = Summary::default();

        for kind in [ElementKind::Node, ElementKind::Way] {
            for element in document.iter_kind(kind) {
                if self.idmap.contains(kind, element.id) {
                    debug!(%kind, id = %element.id, "already mapped; skipping");
                    summary.elements_skipped += 1;
                    continue;
                }
                let element = self.rewrite_refs(element.clone());
                self.submit(&mut changeset, element, &mut summary)?;
            }
        }

        self.run_relations(document, &mut changeset, &mut summary)?;

        changeset.close(&self.transport, &mut self.idmap)?;
        retire(&changeset, &mut summary);
        info!(
            batches = summary.batches_uploaded,
            changesets = summary.changesets_used,
            uploaded = summary.elements_uploaded,
            skipped = summary.elements_skipped,
            "run complete"
        );
        Ok(summary)
    }

    /// Relations either go through in document order (no relation references
    /// a relation — the cheap path) or in resolver order.
    fn run_relations(
        &mut self,
        document: &Document,
        changeset: &mut Changeset,
        summary: &mut Summary,
    ) -> Result<(), UploadError> {
        let relations: Vec<&Element> = document.iter_kind(ElementKind::Relation).collect();
        if relations.is_empty() {
            return Ok(());
        }

        if !resolver::any_relation_reference(&relations) {
            for element in relations {
                if self.idmap.contains(ElementKind::Relation, element.id) {
                    summary.elements_skipped += 1;
                    continue;
                }
                let element = self.rewrite_refs(element.clone());
                self.submit(changeset, element, summary)?;
            }
            return Ok(());
        }

        let pending: Vec<&Element> = relations
            .iter()
            .filter(|r| !self.idmap.contains(ElementKind::Relation, r.id))
            .copied()
            .collect();
        summary.elements_skipped += relations.len() - pending.len();

        let order = resolver::upload_order(&pending)?;
        let by_id: BTreeMap<ElementId, &Element> =
            pending.iter().map(|r| (r.id, *r)).collect();
        for id in order {
            let Some(element) = by_id.get(&id) else {
                return Err(UploadError::Internal("resolver emitted an unknown id"));
            };
            let element = self.rewrite_refs((*element).clone());
            self.submit(changeset, element, summary)?;
        }
        Ok(())
    }

    /// Rewrites every reference whose target is already mapped; unmapped
    /// references stay as-is for same-run forward resolution.
    fn rewrite_refs(&self, mut element: Element) -> Element {
        for r in &mut element.refs {
            if let Some(mapped) = self.idmap.lookup(r.kind, r.id) {
                r.id = mapped;
            }
        }
        element
    }

    /// Submits one element, rotating to a successor changeset when the
    /// current one has closed (the single rotate-and-retry site).
    fn submit(
        &mut self,
        changeset: &mut Changeset,
        element: Element,
        summary: &mut Summary,
    ) -> Result<(), UploadError> {
        let action = element.action;
        match changeset.add(action, element, &self.transport, &mut self.idmap)? {
            AddOutcome::Added { .. } => {}
            AddOutcome::Closed(element) => {
                retire(changeset, summary);
                *changeset = Changeset::new(self.tags.clone(), &self.limits);
                match changeset.add(action, element, &self.transport, &mut self.idmap)? {
                    AddOutcome::Added { .. } => {}
                    AddOutcome::Closed(_) => {
                        return Err(UploadError::Internal(
                            "fresh changeset rejected an add",
                        ));
                    }
                }
            }
        }
        summary.elements_uploaded += 1;
        Ok(())
    }
}

/// Folds a finished changeset's counters into the run summary.
fn retire(changeset: &Changeset, summary: &mut Summary) {
    summary.batches_uploaded += changeset.batches_uploaded();
    if changeset.was_opened() {
        summary.changesets_used += 1;
    }
}

/// Rejects documents this pipeline must not touch. Runs before any network
/// call.
fn validate(document: &Document) -> Result<(), DocumentError> {
    if document.incremental {
        return Err(DocumentError::IncrementalChange);
    }
    for element in &document.elements {
        if element.refs.len() > MAX_CHILD_REFS {
            return Err(DocumentError::OversizedElement {
                kind: element.kind,
                id: element.id,
                count: element.refs.len(),
                limit: MAX_CHILD_REFS,
            });
        }
    }
    Ok(())
}
