//! Configuration and page types exchanged with storage backends and the API.

use super::request::RequestData;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Header multimap: canonical name to ordered values.
pub type Headers = BTreeMap<String, Vec<String>>;

/// Per-basket settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BasketConfig {
    /// Target for forwarding captured requests; empty disables forwarding.
    #[serde(default)]
    pub forward_url: String,

    /// Reply to the caller with the forward target's response instead of the basket's.
    #[serde(default)]
    pub proxy_response: bool,

    /// Skip certificate verification when forwarding over HTTPS.
    #[serde(default)]
    pub insecure_tls: bool,

    /// Append the sub-path after `/{basket}` to the forward URL.
    #[serde(default)]
    pub expand_path: bool,

    /// Maximum number of stored requests.
    pub capacity: usize,
}

impl BasketConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            forward_url: String::new(),
            proxy_response: false,
            insecure_tls: false,
            expand_path: false,
            capacity,
        }
    }

    pub fn forwards(&self) -> bool {
        !self.forward_url.is_empty()
    }
}

/// Partial basket config accepted by updates; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BasketConfigPatch {
    pub forward_url: Option<String>,
    pub proxy_response: Option<bool>,
    pub insecure_tls: Option<bool>,
    pub expand_path: Option<bool>,
    pub capacity: Option<usize>,
}

impl BasketConfigPatch {
    pub fn apply(self, base: &BasketConfig) -> BasketConfig {
        BasketConfig {
            forward_url: self.forward_url.unwrap_or_else(|| base.forward_url.clone()),
            proxy_response: self.proxy_response.unwrap_or(base.proxy_response),
            insecure_tls: self.insecure_tls.unwrap_or(base.insecure_tls),
            expand_path: self.expand_path.unwrap_or(base.expand_path),
            capacity: self.capacity.unwrap_or(base.capacity),
        }
    }
}

/// Synthetic reply served for captured requests of one HTTP method.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResponseConfig {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub is_template: bool,
}

fn default_status() -> u16 {
    200
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            status: default_status(),
            headers: Headers::new(),
            body: String::new(),
            is_template: false,
        }
    }
}

/// Credential handed out once, when a basket is created.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BasketAuth {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestsPage {
    pub requests: Vec<RequestData>,
    pub count: usize,
    pub total_count: u64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestsQueryPage {
    pub requests: Vec<RequestData>,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketNamesPage {
    pub names: Vec<String>,
    pub count: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketNamesQueryPage {
    pub names: Vec<String>,
    pub has_more: bool,
}

/// Which part of a captured request a search inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchField {
    Body,
    Headers,
    Query,
    #[default]
    Any,
}

impl SearchField {
    /// Parses the `in` query parameter; anything unrecognized searches every field.
    pub fn from_param(value: &str) -> Self {
        match value {
            "body" => SearchField::Body,
            "headers" => SearchField::Headers,
            "query" => SearchField::Query,
            _ => SearchField::Any,
        }
    }
}
