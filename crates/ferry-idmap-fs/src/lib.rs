// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Filesystem-backed `MapStore` for the ferry identifier map.
//!
//! The map lives in a sidecar file next to the input (conventionally
//! `<input>.db`). Persists are atomic: the blob is written to `<path>.tmp`
//! and renamed over the target, so a crash mid-write leaves the previous
//! file intact. The pending marker is a zero-byte `<path>.pending` file —
//! its survival across a crash is exactly the signal that a batch was
//! accepted by the server but never recorded.
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

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use ferry_core::{MapStore, StoreError};

/// Sidecar-file [`MapStore`].
#[derive(Debug, Clone)]
pub struct FsMapStore {
    path: PathBuf,
}

impl FsMapStore {
    /// A store over the sidecar file at `path`. Nothing is touched on disk
    /// until the first read or write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the sidecar file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    }

    fn tmp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    fn pending_path(&self) -> PathBuf {
        self.sibling(".pending")
    }
}

impl MapStore for FsMapStore {
    fn read(&self) -> Result<Vec<u8>, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let tmp = self.tmp_path();
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn mark_pending(&self) -> Result<(), StoreError> {
        fs::write(self.pending_path(), b"")?;
        Ok(())
    }

    fn clear_pending(&self) -> Result<(), StoreError> {
        match fs::remove_file(self.pending_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    fn pending(&self) -> bool {
        self.pending_path().exists()
    }
}
