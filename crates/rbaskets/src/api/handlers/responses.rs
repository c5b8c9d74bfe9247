//! Configured response handlers.

use crate::api::types::*;
use crate::basket::{validation, ResponseConfig};
use crate::forward::{BoxError, ResponseBody};
use crate::response::{empty, error_response, from_error, json_response};
use bytes::Bytes;
use hyper::body::Body;
use hyper::{HeaderMap, Response, StatusCode};
use std::sync::Arc;

fn parse_method(method: &str) -> Result<String, Response<ResponseBody>> {
    validation::normalize_method(method).ok_or_else(|| {
        error_response(
            StatusCode::BAD_REQUEST,
            &format!("unknown HTTP method '{method}'"),
        )
    })
}

/// GET /api/baskets/:name/responses/:method - Reply configured for a method
pub async fn handle_get(
    ctx: Arc<ServiceContext>,
    name: &str,
    method: &str,
    headers: &HeaderMap,
) -> Response<ResponseBody> {
    let basket = match ctx.authorized_basket(name, headers).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let method = match parse_method(method) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    match with_basket(&basket, move |b| b.get_response(&method)).await {
        Ok(response) => json_response(StatusCode::OK, &response.unwrap_or_default()),
        Err(e) => from_error(&e),
    }
}

/// PUT /api/baskets/:name/responses/:method - Configure the reply for a method
pub async fn handle_set<B>(
    ctx: Arc<ServiceContext>,
    name: &str,
    method: &str,
    headers: &HeaderMap,
    body: B,
) -> Response<ResponseBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let basket = match ctx.authorized_basket(name, headers).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let method = match parse_method(method) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let body = match read_body(body, ctx.config.limits.max_response_body).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    if is_blank(&body) {
        return empty(StatusCode::NOT_MODIFIED);
    }
    let response: ResponseConfig = match parse_json(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    if let Err(e) = validation::validate_response(&response) {
        return from_error(&e);
    }

    match with_basket(&basket, move |b| b.set_response(&method, response)).await {
        Ok(()) => empty(StatusCode::NO_CONTENT),
        Err(e) => from_error(&e),
    }
}
