//! Basket lifecycle handlers.

use crate::api::types::*;
use crate::basket::{validation, BasketConfig, BasketConfigPatch};
use crate::config::ServiceMode;
use crate::error::BasketError;
use crate::forward::{BoxError, ResponseBody};
use crate::response::{empty, from_error, json_response};
use bytes::Bytes;
use hyper::body::Body;
use hyper::{HeaderMap, Response, StatusCode};
use std::sync::Arc;
use tracing::info;

/// GET /api/baskets - List or search basket names
pub async fn handle_list(
    ctx: Arc<ServiceContext>,
    headers: &HeaderMap,
    query: Option<&str>,
) -> Response<ResponseBody> {
    if !ctx.is_master(headers) {
        return from_error(&BasketError::Unauthorized);
    }

    let baskets = &ctx.config.baskets;
    let params = PageParams::parse(query, baskets.page_size, baskets.max_capacity);
    let result = match params.query {
        Some(q) => {
            ctx.with_db(move |db| {
                let page = db.find_names(&q, params.max, params.skip)?;
                Ok(serde_json::to_value(page)?)
            })
            .await
        }
        None => {
            ctx.with_db(move |db| {
                let page = db.get_names(params.max, params.skip)?;
                Ok(serde_json::to_value(page)?)
            })
            .await
        }
    };

    match result {
        Ok(page) => json_response(StatusCode::OK, &page),
        Err(e) => from_error(&e),
    }
}

/// POST /api/baskets/:name - Create a basket
pub async fn handle_create<B>(
    ctx: Arc<ServiceContext>,
    name: &str,
    headers: &HeaderMap,
    body: B,
) -> Response<ResponseBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    if let Err(e) = validation::check_name(name) {
        return from_error(&e);
    }
    if ctx.config.service.mode == ServiceMode::Restricted && !ctx.is_master(headers) {
        return from_error(&BasketError::Unauthorized);
    }

    let body = match read_body(body, ctx.config.limits.max_config_body).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let defaults = BasketConfig::with_capacity(ctx.config.baskets.init_capacity);
    let config = if is_blank(&body) {
        defaults
    } else {
        match parse_json::<BasketConfigPatch>(&body) {
            Ok(patch) => patch.apply(&defaults),
            Err(resp) => return resp,
        }
    };
    if let Err(e) = validation::validate_config(&config, ctx.config.baskets.max_capacity) {
        return from_error(&e);
    }

    let owned = name.to_string();
    match ctx.with_db(move |db| db.create(&owned, config)).await {
        Ok(auth) => {
            info!("Created basket '{}'", name);
            json_response(StatusCode::CREATED, &auth)
        }
        Err(e) => from_error(&e),
    }
}

/// GET /api/baskets/:name - Basket settings
pub async fn handle_get(
    ctx: Arc<ServiceContext>,
    name: &str,
    headers: &HeaderMap,
) -> Response<ResponseBody> {
    let basket = match ctx.authorized_basket(name, headers).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    match with_basket(&basket, |b| b.config()).await {
        Ok(config) => json_response(StatusCode::OK, &config),
        Err(e) => from_error(&e),
    }
}

/// PUT /api/baskets/:name - Update basket settings
///
/// Fields absent from the body keep their current value; an empty body
/// changes nothing.
pub async fn handle_update<B>(
    ctx: Arc<ServiceContext>,
    name: &str,
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

    let body = match read_body(body, ctx.config.limits.max_config_body).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    if is_blank(&body) {
        return empty(StatusCode::NOT_MODIFIED);
    }
    let patch: BasketConfigPatch = match parse_json(&body) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let max_capacity = ctx.config.baskets.max_capacity;
    let result = with_basket(&basket, move |b| {
        let config = patch.apply(&b.config()?);
        validation::validate_config(&config, max_capacity)?;
        b.update(config)
    })
    .await;

    match result {
        Ok(()) => empty(StatusCode::NO_CONTENT),
        Err(e) => from_error(&e),
    }
}

/// DELETE /api/baskets/:name - Delete a basket and everything it stores
pub async fn handle_delete(
    ctx: Arc<ServiceContext>,
    name: &str,
    headers: &HeaderMap,
) -> Response<ResponseBody> {
    if let Err(resp) = ctx.authorized_basket(name, headers).await {
        return resp;
    }

    let owned = name.to_string();
    match ctx.with_db(move |db| db.delete(&owned)).await {
        Ok(()) => {
            info!("Deleted basket '{}'", name);
            empty(StatusCode::NO_CONTENT)
        }
        Err(e) => from_error(&e),
    }
}
