// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! ferry CLI
//!
//! Reads a JOSM-style `.osm` edit file and bulk-uploads it through
//! size-bounded changesets, remapping temporary ids as the server assigns
//! permanent ones. Identifier mappings are saved to a sidecar file after
//! every accepted batch, so an interrupted run resumes instead of
//! duplicating edits. Re-point `--idmap` (or delete the sidecar) when the
//! input file changes under the same name.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use ferry_core::{IdMap, Limits, Uploader};
use ferry_http::HttpTransport;
use ferry_idmap_fs::FsMapStore;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Read data from this .osm file (JOSM-style full snapshot)
    #[arg(short, long)]
    input: PathBuf,

    /// API username
    #[arg(short, long)]
    user: String,

    /// API password
    #[arg(short, long)]
    password: String,

    /// Changeset comment
    #[arg(short, long)]
    comment: String,

    /// API host
    #[arg(long, default_value = "https://api.openstreetmap.org")]
    api: String,

    /// Identifier-map sidecar file (defaults to <input>.db)
    #[arg(long)]
    idmap: Option<PathBuf>,

    /// Edits per uploaded batch
    #[arg(long, default_value_t = 1000)]
    batch_limit: usize,

    /// Edits per changeset
    #[arg(long, default_value_t = 50_000)]
    changeset_limit: usize,
}

fn sidecar_path(input: &Path) -> PathBuf {
    let mut name = OsString::from(input.as_os_str());
    name.push(".db");
    PathBuf::from(name)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let document = ferry_osm::read_document_from_path(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    info!(
        elements = document.elements.len(),
        input = %args.input.display(),
        "parsed input document"
    );

    let idmap_path = args
        .idmap
        .clone()
        .unwrap_or_else(|| sidecar_path(&args.input));
    let idmap = IdMap::load(FsMapStore::new(&idmap_path));
    info!(mapped = idmap.len(), idmap = %idmap_path.display(), "loaded identifier map");

    let tags = BTreeMap::from([
        ("created_by".to_string(), ferry_http::USER_AGENT.to_string()),
        ("comment".to_string(), args.comment.clone()),
    ]);
    let transport = HttpTransport::new(&args.api, &args.user, &args.password)?;
    let limits = Limits {
        batch: args.batch_limit,
        changeset: args.changeset_limit,
    };

    let mut uploader = Uploader::new(transport, idmap, tags, limits);
    let summary = uploader.run(&document)?;
    println!(
        "uploaded {} elements in {} batches across {} changesets ({} already mapped, skipped)",
        summary.elements_uploaded,
        summary.batches_uploaded,
        summary.changesets_used,
        summary.elements_skipped
    );
    Ok(())
}
