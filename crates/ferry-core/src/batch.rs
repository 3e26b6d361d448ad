// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Diffset: the smallest atomically-uploaded group of edits.
//!
//! A diffset accumulates creates/modifies/deletes until `batch_limit`, then
//! uploads itself and closes. Closure is terminal; the owner reacts to a
//! rejected add by rotating to a fresh diffset and retrying once. That
//! rejection travels as a crate-private [`AddOutcome`] variant carrying the
//! element back to the caller — it is control flow, not an error, and never
//! reaches the public taxonomy.

use tracing::info;

use crate::element::{Action, ChangesetId, Element};
use crate::error::UploadError;
use crate::idmap::IdMap;
use crate::store::MapStore;
use crate::transport::{BatchPayload, Transport};

/// Outcome of an `add` against a diffset or changeset.
#[derive(Debug)]
pub(crate) enum AddOutcome {
    /// The element was accepted. `uploaded` is `true` when accepting it
    /// filled the container and triggered an upload.
    Added {
        /// Whether this add triggered a batch upload.
        uploaded: bool,
    },
    /// The container is closed. The element is handed back so the owner can
    /// rotate to a successor and retry the same add exactly once.
    Closed(Element),
}

/// One bounded, atomically-uploaded batch of edits.
#[derive(Debug)]
pub(crate) struct DiffSet {
    creates: Vec<Element>,
    modifies: Vec<Element>,
    deletes: Vec<Element>,
    count: usize,
    closed: bool,
    limit: usize,
}

impl DiffSet {
    /// An empty, open diffset bounded by `limit` edits (minimum 1).
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            creates: Vec::new(),
            modifies: Vec::new(),
            deletes: Vec::new(),
            count: 0,
            closed: false,
            limit: limit.max(1),
        }
    }

    /// Appends `element` to the list selected by `action`.
    ///
    /// Reaching the limit triggers an immediate upload, after which the
    /// diffset is closed and the next add is rejected with
    /// [`AddOutcome::Closed`].
    pub(crate) fn add<T: Transport, S: MapStore>(
        &mut self,
        action: Action,
        element: Element,
        changeset: ChangesetId,
        transport: &T,
        idmap: &mut IdMap<S>,
    ) -> Result<AddOutcome, UploadError> {
        if self.closed {
            return Ok(AddOutcome::Closed(element));
        }
        match action {
            Action::Create => self.creates.push(element),
            Action::Modify => self.modifies.push(element),
            Action::Delete => self.deletes.push(element),
        }
        self.count += 1;
        let mut uploaded = false;
        if self.count >= self.limit {
            uploaded = self.upload(changeset, transport, idmap)?;
        }
        Ok(AddOutcome::Added { uploaded })
    }

    /// Uploads the accumulated edits as one atomic payload.
    ///
    /// A no-op on an empty or already-closed diffset, so force-flushing at
    /// close time is always safe. On success every per-element result is fed
    /// into the identifier map, the map is persisted exactly once, and the
    /// diffset closes. The store's pending marker brackets the window
    /// between server acceptance and persist.
    ///
    /// Returns `true` when a batch was actually sent.
    pub(crate) fn upload<T: Transport, S: MapStore>(
        &mut self,
        changeset: ChangesetId,
        transport: &T,
        idmap: &mut IdMap<S>,
    ) -> Result<bool, UploadError> {
        if self.count == 0 || self.closed {
            return Ok(false);
        }
        let payload = BatchPayload {
            changeset,
            creates: &self.creates,
            modifies: &self.modifies,
            deletes: &self.deletes,
        };
        info!(%changeset, edits = self.count, "uploading diffset");
        idmap.mark_pending()?;
        let results = transport.upload_batch(&payload)?;
        for result in results {
            match result.permanent_id {
                Some(permanent) => idmap.record(result.kind, result.source_id, permanent)?,
                None => idmap.record_deleted(result.kind, result.source_id),
            }
        }
        idmap.persist()?;
        self.closed = true;
        Ok(true)
    }
}
