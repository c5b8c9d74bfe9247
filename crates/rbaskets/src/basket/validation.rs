//! Input checks applied before anything reaches a storage backend.

use super::types::{BasketConfig, ResponseConfig};
use crate::error::{BasketError, Result};
use crate::response::template;
use hyper::header::{HeaderName, HeaderValue};
use hyper::Uri;
use once_cell::sync::Lazy;
use regex::Regex;

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-.]{1,250}$").expect("static basket name pattern"));

/// Path segments owned by the service itself.
pub const RESERVED_NAMES: &[&str] = &["api", "baskets", "web"];

pub const VALID_METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "CONNECT", "OPTIONS", "TRACE",
];

pub fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name)
}

pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Rejects malformed names, then names the service routes itself.
pub fn check_name(name: &str) -> Result<()> {
    if !is_valid_name(name) {
        return Err(BasketError::InvalidName(name.to_string()));
    }
    if is_reserved_name(name) {
        return Err(BasketError::ReservedName(name.to_string()));
    }
    Ok(())
}

/// Uppercases a method token, returning `None` when it is not a standard method.
pub fn normalize_method(method: &str) -> Option<String> {
    let upper = method.to_ascii_uppercase();
    VALID_METHODS.contains(&upper.as_str()).then_some(upper)
}

pub fn validate_config(config: &BasketConfig, max_capacity: usize) -> Result<()> {
    if config.capacity < 1 {
        return Err(BasketError::Validation(
            "capacity should be a positive number".to_string(),
        ));
    }
    if config.capacity > max_capacity {
        return Err(BasketError::Validation(format!(
            "capacity may not be greater than {max_capacity}"
        )));
    }
    if config.forwards() {
        validate_forward_url(&config.forward_url)?;
    }
    Ok(())
}

fn validate_forward_url(url: &str) -> Result<()> {
    let uri: Uri = url
        .parse()
        .map_err(|e| BasketError::Validation(format!("invalid forward URL '{url}': {e}")))?;
    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        _ => {
            return Err(BasketError::Validation(format!(
                "forward URL '{url}' must use http or https"
            )))
        }
    }
    if uri.host().is_none() {
        return Err(BasketError::Validation(format!(
            "forward URL '{url}' has no host"
        )));
    }
    Ok(())
}

pub fn validate_response(response: &ResponseConfig) -> Result<()> {
    if !(100..600).contains(&response.status) {
        return Err(BasketError::Validation(format!(
            "invalid HTTP status of response: {}",
            response.status
        )));
    }
    for (name, values) in &response.headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(BasketError::Validation(format!(
                "invalid header name: {name}"
            )));
        }
        if let Some(bad) = values.iter().find(|v| HeaderValue::from_str(v).is_err()) {
            return Err(BasketError::Validation(format!(
                "invalid value for header {name}: {bad:?}"
            )));
        }
    }
    if response.is_template && !response.body.is_empty() {
        template::check(&response.body)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert!(is_valid_name("my-basket_01.v2"));
        assert!(is_valid_name(&"a".repeat(250)));
        assert!(!is_valid_name(&"a".repeat(251)));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("has space"));
        assert!(!is_valid_name("slash/name"));
        assert!(!is_valid_name("ümlaut"));
    }

    #[test]
    fn test_check_name_reserved() {
        assert!(matches!(
            check_name("api"),
            Err(BasketError::ReservedName(_))
        ));
        assert!(matches!(
            check_name("bad name"),
            Err(BasketError::InvalidName(_))
        ));
        assert!(check_name("hooks").is_ok());
    }

    #[test]
    fn test_normalize_method() {
        assert_eq!(normalize_method("post").as_deref(), Some("POST"));
        assert_eq!(normalize_method("Options").as_deref(), Some("OPTIONS"));
        assert_eq!(normalize_method("FETCH"), None);
    }

    #[test]
    fn test_validate_config() {
        assert!(validate_config(&BasketConfig::with_capacity(200), 2000).is_ok());
        assert!(validate_config(&BasketConfig::with_capacity(0), 2000).is_err());
        assert!(validate_config(&BasketConfig::with_capacity(2001), 2000).is_err());

        let mut cfg = BasketConfig::with_capacity(10);
        cfg.forward_url = "https://example.com/hook".to_string();
        assert!(validate_config(&cfg, 2000).is_ok());
        cfg.forward_url = "ftp://example.com".to_string();
        assert!(validate_config(&cfg, 2000).is_err());
        cfg.forward_url = "/relative/only".to_string();
        assert!(validate_config(&cfg, 2000).is_err());
        cfg.forward_url = "http://exa mple.com".to_string();
        assert!(validate_config(&cfg, 2000).is_err());
    }

    #[test]
    fn test_validate_response() {
        let mut resp = ResponseConfig::default();
        assert!(validate_response(&resp).is_ok());

        resp.status = 99;
        assert!(validate_response(&resp).is_err());
        resp.status = 600;
        assert!(validate_response(&resp).is_err());
        resp.status = 599;
        assert!(validate_response(&resp).is_ok());

        resp.headers
            .insert("Bad Header".to_string(), vec!["x".to_string()]);
        assert!(validate_response(&resp).is_err());
        resp.headers.clear();
        resp.headers
            .insert("X-Ok".to_string(), vec!["line\nbreak".to_string()]);
        assert!(validate_response(&resp).is_err());
        resp.headers.clear();

        resp.is_template = true;
        resp.body = "{{ broken".to_string();
        assert!(validate_response(&resp).is_err());
        resp.is_template = false;
        assert!(validate_response(&resp).is_ok());
    }
}
