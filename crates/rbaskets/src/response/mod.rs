//! Response construction: JSON helpers for the API and delivery of a basket's
//! configured reply to captured requests.

pub mod template;

use crate::basket::ResponseConfig;
use crate::error::BasketError;
use crate::forward::ResponseBody;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use tracing::{error, warn};

pub fn full(body: impl Into<Bytes>) -> ResponseBody {
    Full::new(body.into())
        .map_err(|never: Infallible| match never {})
        .boxed_unsync()
}

/// Build an HTTP response with the given status and body.
pub fn build_response(status: StatusCode, body: impl Into<Bytes>) -> Response<ResponseBody> {
    let mut response = Response::new(full(body));
    *response.status_mut() = status;
    response
}

pub fn empty(status: StatusCode) -> Response<ResponseBody> {
    build_response(status, Bytes::new())
}

/// Create a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<ResponseBody> {
    match serde_json::to_vec(body) {
        Ok(json) => {
            let mut response = build_response(status, json);
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "serialization failure")
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

/// Create an error response: `{"error": "<message>"}`
pub fn error_response(status: StatusCode, message: &str) -> Response<ResponseBody> {
    let mut response = build_response(
        status,
        serde_json::to_vec(&ErrorBody { error: message }).unwrap_or_default(),
    );
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Maps a storage or validation error to its API response.
pub fn from_error(err: &BasketError) -> Response<ResponseBody> {
    if err.is_internal() {
        error!("{}", err);
    }
    error_response(err.status(), &err.to_string())
}

pub fn not_found() -> Response<ResponseBody> {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

/// Renders a basket's configured reply for a captured request.
///
/// Headers the client could not have configured through validation are
/// skipped with a warning rather than failing the reply.
pub fn deliver(config: &ResponseConfig, raw_query: &str) -> Response<ResponseBody> {
    let body = if config.is_template && !config.body.is_empty() {
        match template::render(&config.body, raw_query) {
            Ok(rendered) => rendered,
            Err(e) => {
                return build_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
        }
    } else {
        config.body.clone()
    };

    let status = StatusCode::from_u16(config.status).unwrap_or_else(|_| {
        warn!("Invalid configured status {}, replying 200", config.status);
        StatusCode::OK
    });
    let mut response = build_response(status, body);
    let headers = response.headers_mut();
    for (name, values) in &config.headers {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            warn!("Skipping invalid configured header name {:?}", name);
            continue;
        };
        for value in values {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.append(name.clone(), value);
                }
                Err(_) => warn!("Skipping invalid value for configured header {}", name),
            }
        }
    }
    response
}
