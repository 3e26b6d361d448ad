// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! OSM XML format support for ferry.
//!
//! Three concerns, all scoped to what the upload pipeline needs — this is
//! not a general-purpose OSM toolkit:
//!
//! * [`read_document`] — parse a JOSM-style `.osm` file into the core
//!   element model, flagging osmChange-style documents for rejection.
//! * [`changeset_payload`] / [`osm_change_payload`] — serialize the
//!   changeset-creation and batch-upload request bodies.
//! * [`parse_diff_result`] — parse the server's `<diffResult>` into
//!   per-element results (`old_id` → `new_id`, or a deletion confirmation
//!   when `new_id` is absent).
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
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions
)]

mod read;
mod write;

pub use read::{read_document, read_document_from_path};
pub use write::{changeset_payload, osm_change_payload, parse_diff_result};

use thiserror::Error;

/// Errors raised while reading or writing OSM XML.
#[derive(Debug, Error)]
pub enum OsmError {
    /// I/O error while reading an input file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed XML.
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    /// Malformed XML attribute.
    #[error("malformed attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    /// The document root is not the expected element.
    #[error("root element must be <{expected}>, found <{found}>")]
    UnexpectedRoot {
        /// The root element this parser requires.
        expected: &'static str,
        /// The root element actually found.
        found: String,
    },
    /// A required attribute is absent.
    #[error("<{element}> is missing required attribute `{attribute}`")]
    MissingAttribute {
        /// Element carrying the problem.
        element: String,
        /// The absent attribute.
        attribute: &'static str,
    },
    /// An attribute value could not be interpreted.
    #[error("invalid {what}: `{value}`")]
    InvalidValue {
        /// What was being parsed (an id, an action, a member type …).
        what: &'static str,
        /// The offending raw value.
        value: String,
    },
}
