// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! ferry-core: bulk-upload orchestration for changeset-based edit APIs.
//!
//! The engine takes a parsed edit document (creates/modifies/deletes of
//! typed, referentially-linked elements), splits it into transaction-legal
//! chunks — bounded diffsets inside bounded changesets — and uploads it
//! strictly sequentially, remapping temporary source identifiers to the
//! permanent identifiers the server assigns as batches are accepted. The
//! identifier map is persisted after every accepted batch, so an interrupted
//! run resumes where it stopped instead of duplicating edits.
//!
//! # Ports
//!
//! The engine owns no I/O. It talks to the server through the [`Transport`]
//! trait (`ferry-http` provides the HTTP implementation) and persists the
//! identifier map through the [`MapStore`] trait (`ferry-idmap-fs` provides
//! the sidecar-file implementation; [`MemoryStore`] ships here for tests and
//! embedders). Input documents come from `ferry-osm`.
//!
//! # Ordering Invariant
//!
//! Uploads are single-threaded and blocking: a batch may contain references
//! resolved by an earlier batch's results, so out-of-order acceptance would
//! break identifier-remapping causality.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod batch;
mod changeset;
mod element;
mod error;
mod idmap;
/// Dependency ordering for relations that reference other relations.
pub mod resolver;
mod store;
mod transport;

mod orchestrator;

// Re-exports for stable public API
/// Element model: kinds, identifiers, actions, references, documents.
pub use element::{
    Action, ChangesetId, Document, Element, ElementId, ElementKind, Reference,
};
/// Error taxonomy for the upload engine.
pub use error::{
    ConflictError, CycleError, DocumentError, StoreError, TransportError, UploadError,
};
/// Identifier map over a pluggable store.
pub use idmap::IdMap;
/// Upload orchestration entry point and run configuration.
pub use orchestrator::{Limits, Summary, Uploader, MAX_CHILD_REFS};
/// Storage port for the persisted identifier map.
pub use store::{MapStore, MemoryStore};
/// Transport port and its payload/result types.
pub use transport::{BatchPayload, ElementResult, Transport};
