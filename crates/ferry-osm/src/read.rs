// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! JOSM-style `.osm` document reading.
//!
//! Handles the subset the upload pipeline consumes: `<node>`, `<way>`,
//! `<relation>` with their `<tag>`, `<nd>`, `<member>` children. Unknown
//! elements (`<bounds>` and friends) are skipped. osmChange marker elements
//! (`<add>`, `<modify>`, `<delete>`) anywhere in the tree set the
//! document's `incremental` flag — the orchestrator rejects such documents
//! outright rather than corrupting remote state with them.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use ferry_core::{Action, Document, Element, ElementId, ElementKind, Reference};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::OsmError;

/// Element names that mark an osmChange-style incremental document.
const CHANGE_MARKERS: [&str; 3] = ["add", "modify", "delete"];

/// Reads a document from a file path.
///
/// # Errors
/// Returns [`OsmError`] on I/O failure or any condition of
/// [`read_document`].
pub fn read_document_from_path(path: impl AsRef<Path>) -> Result<Document, OsmError> {
    let text = fs::read_to_string(path)?;
    read_document(&text)
}

/// Parses a JOSM-style `.osm` document.
///
/// # Errors
/// Returns [`OsmError::UnexpectedRoot`] when the root is not `<osm>`, and
/// attribute errors for elements missing an `id` or carrying values that do
/// not parse. A missing `ref` on `<nd>`/`<member>` children is tolerated
/// (the child is dropped), matching the tolerance of the wider OSM
/// toolchain.
pub fn read_document(text: &str) -> Result<Document, OsmError> {
    let mut reader = Reader::from_str(text);
    let mut document = Document::default();
    let mut root_seen = false;
    let mut current: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let name = element_name(&start);
                if !root_seen {
                    require_osm_root(&name)?;
                    root_seen = true;
                    continue;
                }
                if CHANGE_MARKERS.contains(&name.as_str()) {
                    document.incremental = true;
                    continue;
                }
                match &mut current {
                    None => {
                        if let Some(kind) = ElementKind::from_name(&name) {
                            current = Some(begin_element(kind, &start)?);
                        }
                    }
                    Some(element) => append_child(element, &name, &start)?,
                }
            }
            Event::Empty(start) => {
                let name = element_name(&start);
                if !root_seen {
                    require_osm_root(&name)?;
                    root_seen = true;
                    continue;
                }
                if CHANGE_MARKERS.contains(&name.as_str()) {
                    document.incremental = true;
                    continue;
                }
                match &mut current {
                    None => {
                        if let Some(kind) = ElementKind::from_name(&name) {
                            document.elements.push(begin_element(kind, &start)?);
                        }
                    }
                    Some(element) => append_child(element, &name, &start)?,
                }
            }
            Event::End(end) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                let closes_current = current
                    .as_ref()
                    .is_some_and(|element| element.kind.name() == name);
                if closes_current {
                    document.elements.extend(current.take());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(document)
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn require_osm_root(name: &str) -> Result<(), OsmError> {
    if name == "osm" {
        Ok(())
    } else {
        Err(OsmError::UnexpectedRoot {
            expected: "osm",
            found: name.to_string(),
        })
    }
}

/// Builds an element from its start tag: `id` required, `action` optional,
/// all other attributes carried opaquely.
fn begin_element(kind: ElementKind, start: &BytesStart<'_>) -> Result<Element, OsmError> {
    let mut attrs = collect_attrs(start)?;
    let raw_id = attrs
        .remove("id")
        .ok_or_else(|| OsmError::MissingAttribute {
            element: kind.name().to_string(),
            attribute: "id",
        })?;
    let id = parse_id("element id", &raw_id)?;
    let action = match attrs.remove("action") {
        None => Action::default(),
        Some(raw) => Action::from_name(&raw).ok_or(OsmError::InvalidValue {
            what: "action",
            value: raw,
        })?,
    };
    // A stray changeset attribute from an earlier export must not collide
    // with the one ferry stamps at upload time.
    attrs.remove("changeset");

    let mut element = Element::new(kind, id);
    element.action = action;
    element.attrs = attrs;
    Ok(element)
}

/// Applies a `<tag>`, `<nd>`, or `<member>` child; unknown children are
/// skipped.
fn append_child(
    element: &mut Element,
    name: &str,
    start: &BytesStart<'_>,
) -> Result<(), OsmError> {
    match name {
        "tag" => {
            let mut attrs = collect_attrs(start)?;
            let key = attrs.remove("k").ok_or_else(|| OsmError::MissingAttribute {
                element: "tag".to_string(),
                attribute: "k",
            })?;
            let value = attrs.remove("v").ok_or_else(|| OsmError::MissingAttribute {
                element: "tag".to_string(),
                attribute: "v",
            })?;
            element.tags.insert(key, value);
        }
        "nd" => {
            let attrs = collect_attrs(start)?;
            if let Some(raw) = attrs.get("ref") {
                let id = parse_id("nd ref", raw)?;
                element.refs.push(Reference::new(ElementKind::Node, id));
            }
        }
        "member" => {
            let attrs = collect_attrs(start)?;
            let Some(raw_ref) = attrs.get("ref") else {
                return Ok(());
            };
            let raw_kind = attrs
                .get("type")
                .ok_or_else(|| OsmError::MissingAttribute {
                    element: "member".to_string(),
                    attribute: "type",
                })?;
            let kind = ElementKind::from_name(raw_kind).ok_or_else(|| OsmError::InvalidValue {
                what: "member type",
                value: raw_kind.clone(),
            })?;
            let id = parse_id("member ref", raw_ref)?;
            let role = attrs
                .get("role")
                .filter(|role| !role.is_empty())
                .cloned();
            element.refs.push(Reference { kind, id, role });
        }
        _ => {}
    }
    Ok(())
}

fn collect_attrs(start: &BytesStart<'_>) -> Result<BTreeMap<String, String>, OsmError> {
    let mut out = BTreeMap::new();
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        out.insert(key, value);
    }
    Ok(out)
}

fn parse_id(what: &'static str, raw: &str) -> Result<ElementId, OsmError> {
    raw.parse::<i64>()
        .map(ElementId::from_raw)
        .map_err(|_| OsmError::InvalidValue {
            what,
            value: raw.to_string(),
        })
}
