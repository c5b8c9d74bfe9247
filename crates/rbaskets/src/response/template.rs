//! Response body templates.
//!
//! Bodies flagged `is_template` are Jinja-style templates rendered with the
//! captured request's query parameters in scope. Each parameter is bound to the
//! list of its values in order, so `?name=a&name=b` renders `{{ name[1] }}` as `b`
//! and `{{ name | join(",") }}` as `a,b`.

use crate::error::{BasketError, Result};
use minijinja::Environment;
use std::collections::BTreeMap;

/// Ensures `source` compiles.
pub fn check(source: &str) -> Result<()> {
    let env = Environment::new();
    env.template_from_str(source)
        .map(|_| ())
        .map_err(|e| BasketError::Validation(format!("invalid template: {e}")))
}

/// Renders `source` against the parameters of a raw query string.
pub fn render(source: &str, raw_query: &str) -> Result<String> {
    let env = Environment::new();
    let template = env
        .template_from_str(source)
        .map_err(|e| BasketError::Render(e.to_string()))?;
    template
        .render(query_context(raw_query))
        .map_err(|e| BasketError::Render(e.to_string()))
}

/// Decodes `a=1&b=2&a=3` into `{a: [1, 3], b: [2]}`.
pub fn query_context(raw_query: &str) -> BTreeMap<String, Vec<String>> {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for pair in raw_query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params
            .entry(decode_component(key))
            .or_default()
            .push(decode_component(value));
    }
    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}
