//! Captured request handlers.

use crate::api::types::*;
use crate::forward::ResponseBody;
use crate::response::{empty, from_error, json_response};
use hyper::{HeaderMap, Response, StatusCode};
use std::sync::Arc;

/// GET /api/baskets/:name/requests - Page through or search captured requests
pub async fn handle_get(
    ctx: Arc<ServiceContext>,
    name: &str,
    headers: &HeaderMap,
    query: Option<&str>,
) -> Response<ResponseBody> {
    let basket = match ctx.authorized_basket(name, headers).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let limits = &ctx.config.baskets;
    let params = PageParams::parse(query, limits.page_size, limits.max_capacity);
    let result = with_basket(&basket, move |b| match params.query {
        Some(q) => Ok(serde_json::to_value(b.find_requests(
            &q,
            params.field,
            params.max,
            params.skip,
        )?)?),
        None => Ok(serde_json::to_value(b.get_requests(params.max, params.skip)?)?),
    })
    .await;

    match result {
        Ok(page) => json_response(StatusCode::OK, &page),
        Err(e) => from_error(&e),
    }
}

/// DELETE /api/baskets/:name/requests - Drop captured requests
pub async fn handle_clear(
    ctx: Arc<ServiceContext>,
    name: &str,
    headers: &HeaderMap,
) -> Response<ResponseBody> {
    let basket = match ctx.authorized_basket(name, headers).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    match with_basket(&basket, |b| b.clear()).await {
        Ok(()) => empty(StatusCode::NO_CONTENT),
        Err(e) => from_error(&e),
    }
}
