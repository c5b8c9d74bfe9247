//! Snapshot of a captured HTTP request.

use super::types::{Headers, SearchField};
use hyper::{HeaderMap, Method, Uri};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// A captured request. Never modified after capture.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct RequestData {
    /// Arrival time, Unix milliseconds.
    pub date: i64,
    pub headers: Headers,
    pub content_length: usize,
    pub body: String,
    pub method: String,
    pub path: String,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
}

impl RequestData {
    /// Builds a snapshot from the parts of an inbound request.
    pub fn capture(
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: &[u8],
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        let mut captured = Headers::new();
        for (name, value) in headers {
            captured
                .entry(canonical_header_name(name.as_str()))
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }

        Self {
            date: chrono::Utc::now().timestamp_millis(),
            headers: captured,
            content_length: body.len(),
            body: String::from_utf8_lossy(body).into_owned(),
            method: method.as_str().to_string(),
            path: uri.path().to_string(),
            query: uri.query().unwrap_or_default().to_string(),
            remote_addr: remote_addr.map(|addr| addr.to_string()),
        }
    }

    /// Case-sensitive substring match against the selected field.
    pub fn matches(&self, query: &str, field: SearchField) -> bool {
        match field {
            SearchField::Body => self.body.contains(query),
            SearchField::Query => self.query.contains(query),
            SearchField::Headers => self.headers_match(query),
            SearchField::Any => {
                self.body.contains(query) || self.query.contains(query) || self.headers_match(query)
            }
        }
    }

    fn headers_match(&self, query: &str) -> bool {
        self.headers.iter().any(|(name, values)| {
            values
                .iter()
                .any(|value| format!("{name}: {value}").contains(query))
        })
    }
}

/// `content-type` -> `Content-Type`.
pub fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => std::iter::once(first.to_ascii_uppercase())
                    .chain(chars.map(|c| c.to_ascii_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
