// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Changeset: the server-side transaction grouping one or more diffsets.
//!
//! A changeset opens lazily on its first add — a run contributing zero edits
//! never opens a server-side changeset. It owns exactly one live diffset at
//! a time, rotating transparently when the diffset fills, and closes itself
//! once its own edit count reaches `changeset_limit`. Closure is terminal:
//! the orchestrator reacts to a rejected add by building a successor
//! changeset and retrying once.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::batch::{AddOutcome, DiffSet};
use crate::element::{Action, ChangesetId, Element};
use crate::error::UploadError;
use crate::idmap::IdMap;
use crate::orchestrator::Limits;
use crate::store::MapStore;
use crate::transport::Transport;

/// One server-side changeset and its current diffset.
#[derive(Debug)]
pub(crate) struct Changeset {
    id: Option<ChangesetId>,
    tags: BTreeMap<String, String>,
    current: DiffSet,
    count: usize,
    closed: bool,
    batch_limit: usize,
    limit: usize,
    batches_uploaded: usize,
}

impl Changeset {
    /// An unopened changeset described by `tags` and bounded by `limits`.
    pub(crate) fn new(tags: BTreeMap<String, String>, limits: &Limits) -> Self {
        Self {
            id: None,
            tags,
            current: DiffSet::new(limits.batch),
            count: 0,
            closed: false,
            batch_limit: limits.batch,
            limit: limits.changeset.max(1),
            batches_uploaded: 0,
        }
    }

    /// Returns `true` once this changeset ever opened on the server.
    pub(crate) fn was_opened(&self) -> bool {
        self.id.is_some()
    }

    /// Number of batches this changeset has successfully uploaded.
    pub(crate) fn batches_uploaded(&self) -> usize {
        self.batches_uploaded
    }

    fn open<T: Transport>(&mut self, transport: &T) -> Result<ChangesetId, UploadError> {
        let id = transport.create_changeset(&self.tags)?;
        info!(%id, "opened changeset");
        self.id = Some(id);
        Ok(id)
    }

    /// Stamps `element` with this changeset's identifier and forwards it to
    /// the current diffset, rotating a closed diffset exactly once.
    ///
    /// Reaching `changeset_limit` force-uploads the current diffset and
    /// closes the changeset; the add that reached the limit still succeeds.
    pub(crate) fn add<T: Transport, S: MapStore>(
        &mut self,
        action: Action,
        mut element: Element,
        transport: &T,
        idmap: &mut IdMap<S>,
    ) -> Result<AddOutcome, UploadError> {
        if self.closed {
            return Ok(AddOutcome::Closed(element));
        }
        let id = match self.id {
            Some(id) => id,
            None => self.open(transport)?,
        };
        element.changeset = Some(id);

        let outcome = self.current.add(action, element, id, transport, idmap)?;
        let uploaded = match outcome {
            AddOutcome::Added { uploaded } => uploaded,
            AddOutcome::Closed(element) => {
                self.current = DiffSet::new(self.batch_limit);
                match self.current.add(action, element, id, transport, idmap)? {
                    AddOutcome::Added { uploaded } => uploaded,
                    AddOutcome::Closed(_) => {
                        return Err(UploadError::Internal(
                            "fresh diffset rejected an add",
                        ));
                    }
                }
            }
        };
        if uploaded {
            self.batches_uploaded += 1;
        }

        self.count += 1;
        if self.count >= self.limit {
            self.close(transport, idmap)?;
        }
        Ok(AddOutcome::Added { uploaded })
    }

    /// Flushes any partial diffset and closes the server-side changeset.
    ///
    /// A no-op when the changeset never opened. A refused or unreachable
    /// close request is logged and swallowed: the changeset's edits are
    /// already durably accepted, so the run still completes. The changeset
    /// is marked closed regardless.
    pub(crate) fn close<T: Transport, S: MapStore>(
        &mut self,
        transport: &T,
        idmap: &mut IdMap<S>,
    ) -> Result<(), UploadError> {
        if self.closed {
            return Ok(());
        }
        let Some(id) = self.id else {
            return Ok(());
        };
        if self.current.upload(id, transport, idmap)? {
            self.batches_uploaded += 1;
        }
        match transport.close_changeset(id) {
            Ok(()) => info!(%id, "closed changeset"),
            Err(err) => warn!(%id, %err, "failed to close changeset"),
        }
        self.closed = true;
        Ok(())
    }
}
