//! Route dispatch logic for the basket service.
//!
//! `/api/...` (and the legacy `/baskets/...`) is the management API; every
//! other first path segment names a basket whose requests are captured.

use crate::api::handlers::{baskets, capture, requests, responses, system};
use crate::api::types::ServiceContext;
use crate::forward::{BoxError, ResponseBody};
use crate::response::{error_response, not_found};
use bytes::Bytes;
use hyper::body::Body;
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Parsed route for basket-specific endpoints
#[derive(Debug, PartialEq, Eq)]
enum BasketRoute {
    /// GET/POST/PUT/DELETE /api/baskets/:name
    Root,
    /// GET/DELETE /api/baskets/:name/requests
    Requests,
    /// GET/PUT /api/baskets/:name/responses/:method
    Response(String),
}

impl BasketRoute {
    /// Parse route from path segments after `/api/baskets/:name`
    fn parse(segments: &[&str]) -> Option<Self> {
        match segments {
            [] => Some(BasketRoute::Root),
            ["requests"] => Some(BasketRoute::Requests),
            ["responses", method] => Some(BasketRoute::Response(method.to_string())),
            _ => None,
        }
    }
}

/// Main request router
pub async fn route_request<B>(
    req: Request<B>,
    ctx: Arc<ServiceContext>,
    remote: Option<SocketAddr>,
) -> Result<Response<ResponseBody>, Infallible>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let method = req.method().clone();
    let full_path = req.uri().path().to_string();
    let query = req.uri().query().map(|s| s.to_string());

    debug!("{} {}", method, full_path);

    let prefix = &ctx.config.service.path_prefix;
    let Some(path) = strip_prefix(&full_path, prefix) else {
        return Ok(error_response(
            StatusCode::BAD_REQUEST,
            &format!("path '{full_path}' is outside the service path prefix '{prefix}'"),
        ));
    };
    let path = path.strip_prefix('/').unwrap_or(path);
    let segments: Vec<&str> = path.split('/').collect();

    let response = match segments.as_slice() {
        ["api", "baskets"] | ["baskets"] => match method {
            Method::GET => baskets::handle_list(ctx, req.headers(), query.as_deref()).await,
            _ => not_found(),
        },
        ["api", "baskets", name, rest @ ..] | ["baskets", name, rest @ ..] => {
            match BasketRoute::parse(rest) {
                Some(route) => route_basket(&method, name, route, query.as_deref(), req, ctx).await,
                None => not_found(),
            }
        }
        ["api", "stats"] if method == Method::GET => {
            system::handle_stats(ctx, req.headers(), query.as_deref()).await
        }
        ["api", "version"] if method == Method::GET => system::handle_version(),
        ["api", ..] | ["web", ..] | [""] => not_found(),
        [name, ..] => {
            let sub_path = &path[name.len()..];
            capture::handle_capture(ctx, name, sub_path, req, remote).await
        }
        [] => not_found(),
    };
    Ok(response)
}

/// The path below the mount point, or `None` when the request is outside it.
fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    (rest.is_empty() || rest.starts_with('/')).then_some(rest)
}

/// Route basket-specific requests
async fn route_basket<B>(
    method: &Method,
    name: &str,
    route: BasketRoute,
    query: Option<&str>,
    req: Request<B>,
    ctx: Arc<ServiceContext>,
) -> Response<ResponseBody>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let (parts, body) = req.into_parts();
    let headers = &parts.headers;

    match (method, route) {
        // /api/baskets/:name
        (&Method::GET, BasketRoute::Root) => baskets::handle_get(ctx, name, headers).await,
        (&Method::POST, BasketRoute::Root) => {
            baskets::handle_create(ctx, name, headers, body).await
        }
        (&Method::PUT, BasketRoute::Root) => {
            baskets::handle_update(ctx, name, headers, body).await
        }
        (&Method::DELETE, BasketRoute::Root) => baskets::handle_delete(ctx, name, headers).await,

        // /api/baskets/:name/requests
        (&Method::GET, BasketRoute::Requests) => {
            requests::handle_get(ctx, name, headers, query).await
        }
        (&Method::DELETE, BasketRoute::Requests) => {
            requests::handle_clear(ctx, name, headers).await
        }

        // /api/baskets/:name/responses/:method
        (&Method::GET, BasketRoute::Response(target)) => {
            responses::handle_get(ctx, name, &target, headers).await
        }
        (&Method::PUT, BasketRoute::Response(target)) => {
            responses::handle_set(ctx, name, &target, headers, body).await
        }

        _ => not_found(),
    }
}
