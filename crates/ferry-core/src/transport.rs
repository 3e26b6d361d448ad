// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Transport port: the three server operations the engine needs.
//!
//! The trait is intentionally synchronous and object-safe — uploads are
//! strictly sequential (out-of-order batch acceptance would break
//! identifier-remapping causality), so there is nothing for an async runtime
//! to overlap. The HTTP implementation lives in the `ferry-http` crate; tests
//! use recording doubles.

use std::collections::BTreeMap;

use crate::element::{ChangesetId, Element, ElementId, ElementKind};
use crate::error::TransportError;

/// One batch of edits, borrowed from the diffset that accumulated them.
///
/// The three lists preserve insertion order; the server receives them as a
/// single atomic payload.
#[derive(Debug, Clone, Copy)]
pub struct BatchPayload<'a> {
    /// Changeset the batch belongs to.
    pub changeset: ChangesetId,
    /// Elements to create, in insertion order.
    pub creates: &'a [Element],
    /// Elements to modify, in insertion order.
    pub modifies: &'a [Element],
    /// Elements to delete, in insertion order.
    pub deletes: &'a [Element],
}

impl BatchPayload<'_> {
    /// Total edits across all three lists.
    #[must_use]
    pub fn len(&self) -> usize {
        self.creates.len() + self.modifies.len() + self.deletes.len()
    }

    /// Returns `true` if the payload carries no edits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-element result parsed from a successful batch upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementResult {
    /// Kind of the element the result refers to.
    pub kind: ElementKind,
    /// The source identifier the element was uploaded under.
    pub source_id: ElementId,
    /// The server-assigned permanent identifier. `None` signals a deletion
    /// confirmation — absence is the signal, not an error.
    pub permanent_id: Option<ElementId>,
}

/// Server operations required by the upload engine.
///
/// Implementations must not retry on their own: the engine favors stopping
/// early over silently duplicating edits, and a retried upload could apply a
/// batch twice.
pub trait Transport {
    /// Opens a server-side changeset described by `tags` and returns its
    /// identifier.
    ///
    /// # Errors
    /// Returns [`TransportError`] when the server refuses or cannot be
    /// reached. Fatal for the run.
    fn create_changeset(&self, tags: &BTreeMap<String, String>)
        -> Result<ChangesetId, TransportError>;

    /// Uploads one batch atomically and returns the per-element results.
    ///
    /// # Errors
    /// Returns [`TransportError`] on a non-success response, a network
    /// failure, or an uninterpretable response. Fatal for the run.
    fn upload_batch(
        &self,
        payload: &BatchPayload<'_>,
    ) -> Result<Vec<ElementResult>, TransportError>;

    /// Closes a server-side changeset.
    ///
    /// # Errors
    /// Returns [`TransportError`] when the close is refused or unreachable.
    /// The engine logs this and completes the run — the changeset's edits
    /// are already durably accepted.
    fn close_changeset(&self, id: ChangesetId) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn create_changeset(
        &self,
        tags: &BTreeMap<String, String>,
    ) -> Result<ChangesetId, TransportError> {
        (**self).create_changeset(tags)
    }

    fn upload_batch(
        &self,
        payload: &BatchPayload<'_>,
    ) -> Result<Vec<ElementResult>, TransportError> {
        (**self).upload_batch(payload)
    }

    fn close_changeset(&self, id: ChangesetId) -> Result<(), TransportError> {
        (**self).close_changeset(id)
    }
}
