// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Blocking HTTP implementation of the ferry `Transport` port.
//!
//! Talks to a 0.6-style changeset API:
//!
//! * `PUT  {base}/api/0.6/changeset/create`       — body: changeset payload
//! * `POST {base}/api/0.6/changeset/{id}/upload`  — body: osmChange payload
//! * `PUT  {base}/api/0.6/changeset/{id}/close`
//!
//! All calls are blocking and unretried — the engine's ordering and
//! no-duplicate guarantees depend on both. Authentication is HTTP basic.
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
    clippy::module_name_repetitions,
    clippy::multiple_crate_versions
)]

use std::collections::BTreeMap;

use ferry_core::{
    BatchPayload, ChangesetId, ElementResult, Transport, TransportError,
};
use tracing::debug;

/// User-Agent sent with every request.
pub const USER_AGENT: &str = concat!("ferry/", env!("CARGO_PKG_VERSION"));

/// Blocking HTTP transport with basic auth.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base: String,
    user: String,
    password: String,
}

impl HttpTransport {
    /// Builds a transport against `base` (e.g. `https://api.openstreetmap.org`).
    ///
    /// # Errors
    /// Returns [`TransportError::Network`] if the underlying client cannot
    /// be constructed.
    pub fn new(
        base: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| TransportError::Network {
                action: "client setup",
                message: err.to_string(),
            })?;
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        Ok(Self {
            client,
            base,
            user: user.into(),
            password: password.into(),
        })
    }

    /// The API base this transport talks to.
    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/0.6/{path}", self.base)
    }

    /// Sends one request and returns the body of a successful response.
    fn send(
        &self,
        action: &'static str,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<String, TransportError> {
        let response = request
            .basic_auth(&self.user, Some(&self.password))
            .header("Content-Type", "text/xml; charset=utf-8")
            .send()
            .map_err(|err| TransportError::Network {
                action,
                message: err.to_string(),
            })?;
        let status = response.status();
        let body = response.text().map_err(|err| TransportError::Network {
            action,
            message: err.to_string(),
        })?;
        if !status.is_success() {
            return Err(TransportError::Status {
                action,
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

impl Transport for HttpTransport {
    fn create_changeset(
        &self,
        tags: &BTreeMap<String, String>,
    ) -> Result<ChangesetId, TransportError> {
        let payload =
            ferry_osm::changeset_payload(tags).map_err(|err| TransportError::Malformed {
                action: "create_changeset",
                message: err.to_string(),
            })?;
        let url = self.url("changeset/create");
        debug!(%url, "creating changeset");
        let body = self.send("create_changeset", self.client.put(url).body(payload))?;
        let id = body
            .trim()
            .parse::<u64>()
            .map_err(|_| TransportError::Malformed {
                action: "create_changeset",
                message: format!("expected a numeric changeset id, got `{}`", body.trim()),
            })?;
        Ok(ChangesetId::from_raw(id))
    }

    fn upload_batch(
        &self,
        payload: &BatchPayload<'_>,
    ) -> Result<Vec<ElementResult>, TransportError> {
        let body = ferry_osm::osm_change_payload(payload).map_err(|err| {
            TransportError::Malformed {
                action: "upload_batch",
                message: err.to_string(),
            }
        })?;
        let url = self.url(&format!("changeset/{}/upload", payload.changeset));
        debug!(%url, edits = payload.len(), "uploading batch");
        let response = self.send("upload_batch", self.client.post(url).body(body))?;
        ferry_osm::parse_diff_result(&response).map_err(|err| TransportError::Malformed {
            action: "upload_batch",
            message: err.to_string(),
        })
    }

    fn close_changeset(&self, id: ChangesetId) -> Result<(), TransportError> {
        let url = self.url(&format!("changeset/{id}/close"));
        debug!(%url, "closing changeset");
        self.send("close_changeset", self.client.put(url))?;
        Ok(())
    }
}
