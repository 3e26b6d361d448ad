// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error taxonomy for the upload engine.
//!
//! Closed-container signaling is deliberately absent here: a closed diffset
//! or changeset is handled internally by rotating to a successor (see
//! [`crate::batch`] and [`crate::orchestrator`]) and never reaches callers.

use thiserror::Error;

use crate::element::{ElementId, ElementKind};

/// Input-document rejection, raised before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// The document is an incremental-change (osmChange-style) document, not
    /// a full snapshot. Uploading one through this pipeline corrupts the
    /// remote state, so it is rejected outright rather than processed.
    #[error("incremental-change document rejected: this pipeline uploads full snapshots only")]
    IncrementalChange,
    /// A composite element carries more child references than the server
    /// accepts. Failing here beats failing mid-upload on the server bound.
    #[error("{kind} {id} has {count} child references (limit {limit})")]
    OversizedElement {
        /// Kind of the offending element.
        kind: ElementKind,
        /// Source identifier of the offending element.
        id: ElementId,
        /// Number of child references found.
        count: usize,
        /// Maximum accepted child references.
        limit: usize,
    },
}

/// Failure reported by a [`crate::Transport`] implementation.
///
/// Fatal for changeset creation and batch upload (state on the server may
/// already be inconsistent); tolerated with a warning for changeset close
/// (the edits are already durably accepted).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("{action} rejected with status {status}: {body}")]
    Status {
        /// Which transport operation failed.
        action: &'static str,
        /// HTTP-style status code.
        status: u16,
        /// Response body text, for diagnosis.
        body: String,
    },
    /// The request never produced a definitive server answer.
    #[error("network failure during {action}: {message}")]
    Network {
        /// Which transport operation failed.
        action: &'static str,
        /// Underlying failure description.
        message: String,
    },
    /// The server answered successfully but the response could not be
    /// interpreted.
    #[error("malformed server response to {action}: {message}")]
    Malformed {
        /// Which transport operation produced the response.
        action: &'static str,
        /// What was wrong with it.
        message: String,
    },
}

/// Two different permanent identifiers were claimed for one source
/// identifier. Normal operation never triggers this — it indicates a logic
/// bug, so the run aborts rather than guessing which mapping to trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictError {
    /// Kind of the doubly-mapped element.
    pub kind: ElementKind,
    /// The source identifier in question.
    pub source: ElementId,
    /// The mapping already recorded.
    pub existing: ElementId,
    /// The mapping that attempted to overwrite it.
    pub rejected: ElementId,
}

impl std::fmt::Display for ConflictError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "conflicting permanent ids for {} {}: kept {}, rejected {}",
            self.kind, self.source, self.existing, self.rejected
        )
    }
}

impl std::error::Error for ConflictError {}

/// Error type for identifier-map store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No persisted map exists yet. Treated as "empty" at load time.
    #[error("not found")]
    NotFound,
    /// I/O error while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization/deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Catch-all error variant.
    #[error("other: {0}")]
    Other(String),
}

/// A genuine reference cycle among relations: no upload order exists.
///
/// Cycles are reported, never broken — inventing an order would upload a
/// relation before a relation it references.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct CycleError {
    /// Source identifiers on (or trapped behind) the cycle.
    pub ids: Vec<ElementId>,
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "reference cycle among relations:")?;
        for id in &self.ids {
            write!(f, " {id}")?;
        }
        Ok(())
    }
}

/// Run-level error returned by [`crate::Uploader::run`].
#[derive(Debug, Error)]
pub enum UploadError {
    /// The input document failed validation; raised before any network call.
    #[error(transparent)]
    Document(#[from] DocumentError),
    /// A changeset-create or batch-upload call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The identifier map refused a contradictory mapping.
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    /// The identifier map could not be persisted.
    #[error("identifier map persist failed: {0}")]
    Store(#[from] StoreError),
    /// The dependency resolver found a reference cycle.
    #[error(transparent)]
    Cycle(#[from] CycleError),
    /// Internal invariant violated (engine state corruption).
    #[error("internal invariant violated: {0}")]
    Internal(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_lists_members() {
        let err = CycleError {
            ids: vec![ElementId::from_raw(-1), ElementId::from_raw(-2)],
        };
        assert_eq!(err.to_string(), "reference cycle among relations: -1 -2");
    }

    #[test]
    fn conflict_error_names_both_ids() {
        let err = ConflictError {
            kind: ElementKind::Node,
            source: ElementId::from_raw(-7),
            existing: ElementId::from_raw(100),
            rejected: ElementId::from_raw(101),
        };
        let msg = err.to_string();
        assert!(msg.contains("node -7"));
        assert!(msg.contains("kept 100"));
        assert!(msg.contains("rejected 101"));
    }
}
