// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
//! CLI surface tests. Nothing here touches the network: the zero-edit and
//! rejection paths complete (or fail) before the first transport call.

use assert_cmd::Command;
use predicates::prelude::*;

fn ferry() -> Command {
    Command::cargo_bin("ferry").unwrap()
}

/// An API host nothing listens on; reaching it would fail loudly.
const DEAD_API: &str = "http://127.0.0.1:9";

#[test]
fn help_lists_the_argument_surface() {
    ferry()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--input"))
        .stdout(predicate::str::contains("--user"))
        .stdout(predicate::str::contains("--password"))
        .stdout(predicate::str::contains("--comment"))
        .stdout(predicate::str::contains("--idmap"))
        .stdout(predicate::str::contains("--batch-limit"))
        .stdout(predicate::str::contains("--changeset-limit"));
}

#[test]
fn missing_required_arguments_fail() {
    ferry()
        .args(["-i", "whatever.osm"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--user"));
}

#[test]
fn unreadable_input_reports_the_path() {
    ferry()
        .args([
            "-i",
            "/nonexistent/input.osm",
            "-u",
            "user",
            "-p",
            "secret",
            "-c",
            "test",
            "--api",
            DEAD_API,
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/input.osm"));
}

#[test]
fn incremental_document_is_rejected_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("change.osm");
    std::fs::write(
        &input,
        r#"<osm><modify><node id="1" lat="0" lon="0"/></modify></osm>"#,
    )
    .unwrap();
    ferry()
        .args([
            "-i",
            input.to_str().unwrap(),
            "-u",
            "user",
            "-p",
            "secret",
            "-c",
            "test",
            "--api",
            DEAD_API,
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("incremental-change"));
}

#[test]
fn zero_edit_run_succeeds_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("empty.osm");
    std::fs::write(&input, r#"<osm version="0.6"></osm>"#).unwrap();
    ferry()
        .args([
            "-i",
            input.to_str().unwrap(),
            "-u",
            "user",
            "-p",
            "secret",
            "-c",
            "test",
            "--api",
            DEAD_API,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "uploaded 0 elements in 0 batches across 0 changesets",
        ));
}

#[test]
fn already_mapped_input_skips_everything_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("mapped.osm");
    std::fs::write(
        &input,
        r#"<osm version="0.6"><node id="-1" lat="0" lon="0"/></osm>"#,
    )
    .unwrap();
    // Sidecar claims node -1 was mapped by an earlier run.
    let sidecar = dir.path().join("mapped.osm.db");
    std::fs::write(
        &sidecar,
        r#"{"entries":[{"kind":"node","source":-1,"permanent":101}]}"#,
    )
    .unwrap();
    ferry()
        .args([
            "-i",
            input.to_str().unwrap(),
            "-u",
            "user",
            "-p",
            "secret",
            "-c",
            "test",
            "--api",
            DEAD_API,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 already mapped"));
}
