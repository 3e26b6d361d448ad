// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Upload payload serialization and `diffResult` parsing.
//!
//! Payload layout mirrors the 0.6 API:
//!
//! * changeset creation: `<osm version="0.6"><changeset><tag k v/>…`
//! * batch upload: `<osmChange version="0.6"><create/><modify/><delete/>`
//!   — all three containers are always present, empty or not, with each
//!   element stamped with its changeset id.
//! * response: `<diffResult>` children map `old_id` to `new_id`; an absent
//!   `new_id` confirms a deletion.

use std::collections::BTreeMap;

use ferry_core::{BatchPayload, Element, ElementId, ElementKind, ElementResult};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::OsmError;

/// Wire protocol version stamped on every request body.
pub const API_VERSION: &str = "0.6";

/// Serializes the changeset-creation request body.
///
/// # Errors
/// Returns [`OsmError::Xml`] if the writer fails (out-of-memory territory).
pub fn changeset_payload(tags: &BTreeMap<String, String>) -> Result<Vec<u8>, OsmError> {
    let mut writer = Writer::new(Vec::new());
    let mut osm = BytesStart::new("osm");
    osm.push_attribute(("version", API_VERSION));
    writer.write_event(Event::Start(osm))?;
    writer.write_event(Event::Start(BytesStart::new("changeset")))?;
    for (key, value) in tags {
        let mut tag = BytesStart::new("tag");
        tag.push_attribute(("k", key.as_str()));
        tag.push_attribute(("v", value.as_str()));
        writer.write_event(Event::Empty(tag))?;
    }
    writer.write_event(Event::End(BytesEnd::new("changeset")))?;
    writer.write_event(Event::End(BytesEnd::new("osm")))?;
    Ok(writer.into_inner())
}

/// Serializes one batch as an `osmChange` request body.
///
/// List order inside each container is the diffset's insertion order — the
/// engine's causal ordering must survive serialization.
///
/// # Errors
/// Returns [`OsmError::Xml`] if the writer fails.
pub fn osm_change_payload(batch: &BatchPayload<'_>) -> Result<Vec<u8>, OsmError> {
    let mut writer = Writer::new(Vec::new());
    let mut root = BytesStart::new("osmChange");
    root.push_attribute(("version", API_VERSION));
    writer.write_event(Event::Start(root))?;
    for (container, elements) in [
        ("create", batch.creates),
        ("modify", batch.modifies),
        ("delete", batch.deletes),
    ] {
        writer.write_event(Event::Start(BytesStart::new(container)))?;
        for element in elements {
            write_element(&mut writer, element)?;
        }
        writer.write_event(Event::End(BytesEnd::new(container)))?;
    }
    writer.write_event(Event::End(BytesEnd::new("osmChange")))?;
    Ok(writer.into_inner())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<(), OsmError> {
    let name = element.kind.name();
    let mut start = BytesStart::new(name);
    let id = element.id.value().to_string();
    start.push_attribute(("id", id.as_str()));
    if let Some(changeset) = element.changeset {
        let changeset = changeset.value().to_string();
        start.push_attribute(("changeset", changeset.as_str()));
    }
    for (key, value) in &element.attrs {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.refs.is_empty() && element.tags.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    for reference in &element.refs {
        let target = reference.id.value().to_string();
        match element.kind {
            ElementKind::Way => {
                let mut nd = BytesStart::new("nd");
                nd.push_attribute(("ref", target.as_str()));
                writer.write_event(Event::Empty(nd))?;
            }
            ElementKind::Relation => {
                let mut member = BytesStart::new("member");
                member.push_attribute(("type", reference.kind.name()));
                member.push_attribute(("ref", target.as_str()));
                member.push_attribute(("role", reference.role.as_deref().unwrap_or("")));
                writer.write_event(Event::Empty(member))?;
            }
            ElementKind::Node => {}
        }
    }
    for (key, value) in &element.tags {
        let mut tag = BytesStart::new("tag");
        tag.push_attribute(("k", key.as_str()));
        tag.push_attribute(("v", value.as_str()));
        writer.write_event(Event::Empty(tag))?;
    }
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Parses the server's `<diffResult>` response to a batch upload.
///
/// # Errors
/// Returns [`OsmError::UnexpectedRoot`] when the root is not `diffResult`,
/// and attribute errors for children missing `old_id`.
pub fn parse_diff_result(text: &str) -> Result<Vec<ElementResult>, OsmError> {
    let mut reader = Reader::from_str(text);
    let mut results = Vec::new();
    let mut root_seen = false;
    loop {
        match reader.read_event()? {
            Event::Start(start) | Event::Empty(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                if !root_seen {
                    if name != "diffResult" {
                        return Err(OsmError::UnexpectedRoot {
                            expected: "diffResult",
                            found: name,
                        });
                    }
                    root_seen = true;
                    continue;
                }
                let Some(kind) = ElementKind::from_name(&name) else {
                    continue;
                };
                results.push(parse_result_entry(kind, &start, &name)?);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(results)
}

fn parse_result_entry(
    kind: ElementKind,
    start: &BytesStart<'_>,
    name: &str,
) -> Result<ElementResult, OsmError> {
    let mut old_id = None;
    let mut new_id = None;
    for attr in start.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?;
        match attr.key.as_ref() {
            b"old_id" => old_id = Some(parse_id("old_id", &value)?),
            b"new_id" => new_id = Some(parse_id("new_id", &value)?),
            _ => {}
        }
    }
    let source_id = old_id.ok_or_else(|| OsmError::MissingAttribute {
        element: name.to_string(),
        attribute: "old_id",
    })?;
    Ok(ElementResult {
        kind,
        source_id,
        permanent_id: new_id,
    })
}

fn parse_id(what: &'static str, raw: &str) -> Result<ElementId, OsmError> {
    raw.parse::<i64>()
        .map(ElementId::from_raw)
        .map_err(|_| OsmError::InvalidValue {
            what,
            value: raw.to_string(),
        })
}
