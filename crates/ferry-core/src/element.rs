// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Element model: the typed, referentially-linked edit units ferry uploads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Kind of map element carried by a document.
///
/// Kinds are ordered (`Node < Way < Relation`) so per-kind tables iterate
/// deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// A point element. Carries no references.
    Node,
    /// An ordered sequence of node references.
    Way,
    /// A composite element whose members may reference any kind, including
    /// other relations — the only kind requiring dependency ordering.
    Relation,
}

impl ElementKind {
    /// All kinds, in upload-phase order.
    pub const ALL: [Self; 3] = [Self::Node, Self::Way, Self::Relation];

    /// Lowercase wire name (`node`, `way`, `relation`).
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }

    /// Parses a lowercase wire name back into a kind.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "node" => Some(Self::Node),
            "way" => Some(Self::Way),
            "relation" => Some(Self::Relation),
            _ => None,
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Thin wrapper around an element identifier.
///
/// Before server acceptance this is the source identifier from the input
/// document (placeholder ids are negative by convention); after acceptance the
/// same type carries the server-assigned permanent identifier. The identifier
/// map is the only component that knows which is which.
#[repr(transparent)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ElementId(i64);

impl ElementId {
    /// Constructs an `ElementId` from a raw `i64` value.
    #[must_use]
    pub const fn from_raw(value: i64) -> Self {
        Self(value)
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thin wrapper around a server-assigned changeset identifier.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChangesetId(u64);

impl ChangesetId {
    /// Constructs a `ChangesetId` from a raw `u64` value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ChangesetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Edit action an element requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    /// Create a new element (the default when the input carries no action).
    #[default]
    Create,
    /// Modify an existing element.
    Modify,
    /// Delete an existing element.
    Delete,
}

impl Action {
    /// Lowercase wire name (`create`, `modify`, `delete`).
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
        }
    }

    /// Parses a lowercase wire name back into an action.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "create" => Some(Self::Create),
            "modify" => Some(Self::Modify),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A reference from one element to another, by kind and source identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Kind of the referenced element.
    pub kind: ElementKind,
    /// Identifier of the referenced element. Rewritten in place once the
    /// target is known to be mapped; otherwise left for same-run forward
    /// resolution by the server.
    pub id: ElementId,
    /// Member role, for relation members. `None` for way node references.
    pub role: Option<String>,
}

impl Reference {
    /// A role-less reference (a way's node reference).
    #[must_use]
    pub fn new(kind: ElementKind, id: ElementId) -> Self {
        Self {
            kind,
            id,
            role: None,
        }
    }
}

/// One typed edit unit from the input document.
///
/// `tags` and `attrs` are carried opaquely: ferry never interprets them, it
/// only round-trips them into upload payloads. `refs` preserve child order
/// from the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Element kind.
    pub kind: ElementKind,
    /// Source identifier as it appears in the input.
    pub id: ElementId,
    /// Requested edit action.
    pub action: Action,
    /// Key/value tags (`<tag k v>` children).
    pub tags: BTreeMap<String, String>,
    /// Opaque attributes other than `id`/`action` (version, lat, lon, ...).
    pub attrs: BTreeMap<String, String>,
    /// Ordered references to other elements.
    pub refs: Vec<Reference>,
    /// Changeset this element has been stamped into, once submitted.
    pub changeset: Option<ChangesetId>,
}

impl Element {
    /// A bare element with default action and empty payload.
    #[must_use]
    pub fn new(kind: ElementKind, id: ElementId) -> Self {
        Self {
            kind,
            id,
            action: Action::default(),
            tags: BTreeMap::new(),
            attrs: BTreeMap::new(),
            refs: Vec::new(),
            changeset: None,
        }
    }
}

/// A parsed input document: an ordered element sequence plus the flag that
/// drives the incremental-change reject check.
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// Elements in document order.
    pub elements: Vec<Element>,
    /// `true` when the input is an incremental-change (osmChange-style)
    /// document. Such documents are rejected outright: feeding one through
    /// the full-snapshot pipeline corrupts the remote state.
    pub incremental: bool,
}

impl Document {
    /// Elements of one kind, in document order.
    pub fn iter_kind(&self, kind: ElementKind) -> impl Iterator<Item = &Element> {
        self.elements.iter().filter(move |e| e.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in ElementKind::ALL {
            assert_eq!(ElementKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ElementKind::from_name("changeset"), None);
    }

    #[test]
    fn action_defaults_to_create() {
        assert_eq!(Action::default(), Action::Create);
        assert_eq!(Action::from_name("modify"), Some(Action::Modify));
        assert_eq!(Action::from_name("replace"), None);
    }

    #[test]
    fn iter_kind_preserves_document_order() {
        let mut doc = Document::default();
        for raw in [-1i64, -2, -3] {
            doc.elements
                .push(Element::new(ElementKind::Node, ElementId::from_raw(raw)));
        }
        doc.elements
            .push(Element::new(ElementKind::Way, ElementId::from_raw(-10)));
        let nodes: Vec<i64> = doc
            .iter_kind(ElementKind::Node)
            .map(|e| e.id.value())
            .collect();
        assert_eq!(nodes, vec![-1, -2, -3]);
        assert_eq!(doc.iter_kind(ElementKind::Way).count(), 1);
    }
}
