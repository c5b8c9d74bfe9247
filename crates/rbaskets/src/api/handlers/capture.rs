//! Capture of arbitrary requests sent to `/{basket}[/sub/path]`.

use crate::api::types::*;
use crate::basket::{validation, RequestData};
use crate::error::BasketError;
use crate::forward::{build_forward_request, is_forwarded, BoxError, ResponseBody};
use crate::response::{deliver, error_response, from_error};
use bytes::Bytes;
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// ANY /:name[/sub/path] - Store the request, forward it if configured, and
/// reply with the basket's response for the method (or the upstream's, in
/// proxy mode).
pub async fn handle_capture<B>(
    ctx: Arc<ServiceContext>,
    name: &str,
    sub_path: &str,
    req: Request<B>,
    remote: Option<SocketAddr>,
) -> Response<ResponseBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    if !validation::is_valid_name(name) {
        return from_error(&BasketError::InvalidName(name.to_string()));
    }

    let (parts, body) = req.into_parts();
    let body = match read_body(body, ctx.config.limits.max_capture_body).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let snapshot = RequestData::capture(&parts.method, &parts.uri, &parts.headers, &body, remote);
    let method = parts.method.as_str().to_string();
    let stored = {
        let name = name.to_string();
        ctx.with_db(move |db| {
            let Some(basket) = db.get(&name)? else {
                return Ok(None);
            };
            basket.add(snapshot)?;
            let config = basket.config()?;
            let response = basket.get_response(&method)?;
            Ok(Some((config, response)))
        })
        .await
    };

    let (config, response) = match stored {
        Ok(Some(found)) => found,
        Ok(None) => {
            debug!("Request to unknown basket '{}'", name);
            return error_response(StatusCode::NOT_FOUND, "Basket not found");
        }
        Err(e) => return from_error(&e),
    };

    let query = parts.uri.query().unwrap_or_default();
    if config.forwards() && !is_forwarded(&parts.headers) {
        let outbound = build_forward_request(
            &config,
            &parts.method,
            &parts.headers,
            sub_path,
            query,
            body,
        );
        match outbound {
            Ok(outbound) if config.proxy_response => {
                return match ctx.forwarder.proxy(config.insecure_tls, outbound).await {
                    Ok(upstream) => upstream,
                    Err(e) => from_error(&e),
                };
            }
            Ok(outbound) => ctx.forwarder.dispatch(name, config.insecure_tls, outbound),
            Err(e) if config.proxy_response => return from_error(&e),
            Err(e) => warn!("Not forwarding request from basket '{}': {}", name, e),
        }
    }

    deliver(&response.unwrap_or_default(), query)
}

