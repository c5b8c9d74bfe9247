//! Forwarding captured requests to a basket's forward URL.
//!
//! Two modes:
//! - fire-and-forget: the exchange runs on a tracked background task; the
//!   caller never waits for it and failures are only logged
//! - proxy-response: the caller awaits the exchange and relays the upstream
//!   status, headers and body
//!
//! Every outbound request carries `X-Do-Not-Forward: 1`, and requests arriving
//! with that header are never forwarded, so baskets forwarding to each other
//! cannot loop.

mod client;
mod tls;

use crate::basket::BasketConfig;
use crate::config::ForwardConfig;
use crate::error::{BasketError, Result};
use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Frame, SizeHint};
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Method, Request, Response, StatusCode, Uri};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Instant, Sleep};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

pub use client::{create_http_client, HttpClient, OutboundBody};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body type of every response the service writes.
pub type ResponseBody = UnsyncBoxBody<Bytes, BoxError>;

pub static X_DO_NOT_FORWARD: HeaderName = HeaderName::from_static("x-do-not-forward");
static VALUE_ONE: HeaderValue = HeaderValue::from_static("1");

/// Connection-scoped headers that must not be relayed.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-connection"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// True if the request was itself produced by a forward.
pub fn is_forwarded(headers: &HeaderMap) -> bool {
    headers
        .get_all(&X_DO_NOT_FORWARD)
        .iter()
        .any(|v| v.as_bytes() == b"1")
}

/// Builds the forward target: the forward URL, optionally extended with the
/// sub-path that followed the basket name, with the request query appended.
pub fn expand_url(config: &BasketConfig, sub_path: &str, query: &str) -> Result<Uri> {
    let base: Uri = config
        .forward_url
        .parse()
        .map_err(|e| BasketError::Upstream(format!("invalid forward URL: {e}")))?;

    let mut path = base.path().to_string();
    if config.expand_path && !sub_path.is_empty() {
        path = format!("{}{}", path.trim_end_matches('/'), sub_path);
    }
    if path.is_empty() {
        path.push('/');
    }

    let mut path_and_query = path;
    let queries: Vec<&str> = [base.query().unwrap_or_default(), query]
        .into_iter()
        .filter(|q| !q.is_empty())
        .collect();
    if !queries.is_empty() {
        path_and_query.push('?');
        path_and_query.push_str(&queries.join("&"));
    }

    let mut parts = base.into_parts();
    parts.path_and_query = Some(
        path_and_query
            .parse()
            .map_err(|e| BasketError::Upstream(format!("invalid forward path: {e}")))?,
    );
    Uri::from_parts(parts).map_err(|e| BasketError::Upstream(format!("invalid forward URL: {e}")))
}

/// Builds the outbound copy of a captured request.
pub fn build_forward_request(
    config: &BasketConfig,
    method: &Method,
    headers: &HeaderMap,
    sub_path: &str,
    query: &str,
    body: Bytes,
) -> Result<Request<OutboundBody>> {
    let uri = expand_url(config, sub_path, query)?;
    let mut builder = Request::builder().method(method.clone()).uri(uri);
    for (name, value) in headers {
        if name == header::HOST || is_hop_by_hop(name) || name == X_DO_NOT_FORWARD {
            continue;
        }
        builder = builder.header(name, value);
    }
    builder = builder.header(&X_DO_NOT_FORWARD, &VALUE_ONE);
    builder
        .body(Full::new(body).map_err(|never: Infallible| match never {}).boxed())
        .map_err(|e| BasketError::Upstream(format!("failed to build forward request: {e}")))
}

pub struct Forwarder {
    secure: HttpClient,
    insecure: HttpClient,
    timeout: Duration,
    tracker: TaskTracker,
}

impl Forwarder {
    pub fn new(config: &ForwardConfig) -> std::result::Result<Self, anyhow::Error> {
        Ok(Self {
            secure: create_http_client(config, false)?,
            insecure: create_http_client(config, true)?,
            timeout: config.timeout(),
            tracker: TaskTracker::new(),
        })
    }

    fn client(&self, insecure_tls: bool) -> &HttpClient {
        if insecure_tls {
            &self.insecure
        } else {
            &self.secure
        }
    }

    /// Sends `request` on a background task and returns immediately.
    pub fn dispatch(&self, basket: &str, insecure_tls: bool, request: Request<OutboundBody>) {
        let client = self.client(insecure_tls).clone();
        let timeout = self.timeout;
        let basket = basket.to_string();
        let target = request.uri().clone();

        self.tracker.spawn(async move {
            match tokio::time::timeout(timeout, send_and_drain(&client, request)).await {
                Ok(Ok(status)) => {
                    debug!("Forwarded request from basket '{}' to {}: {}", basket, target, status)
                }
                Ok(Err(e)) => warn!(
                    "Failed to forward request from basket '{}' to {}: {}",
                    basket, target, e
                ),
                Err(_) => warn!(
                    "Forwarding request from basket '{}' to {} timed out after {:?}",
                    basket, target, timeout
                ),
            }
        });
    }

    /// Sends `request` and relays the upstream response.
    ///
    /// The deadline covers the whole exchange: a body still streaming when it
    /// expires is cut off with an error.
    pub async fn proxy(
        &self,
        insecure_tls: bool,
        request: Request<OutboundBody>,
    ) -> Result<Response<ResponseBody>> {
        let deadline = Instant::now() + self.timeout;
        let target = request.uri().clone();
        let response = tokio::time::timeout_at(deadline, self.client(insecure_tls).request(request))
            .await
            .map_err(|_| {
                BasketError::Upstream(format!("{target} timed out after {:?}", self.timeout))
            })?
            .map_err(|e| BasketError::Upstream(format!("{target}: {e}")))?;

        let (mut parts, body) = response.into_parts();
        let hop: Vec<HeaderName> = parts
            .headers
            .keys()
            .filter(|name| is_hop_by_hop(name))
            .cloned()
            .collect();
        for name in hop {
            parts.headers.remove(&name);
        }
        let body = DeadlineBody {
            inner: body.map_err(BoxError::from).boxed_unsync(),
            deadline: Box::pin(tokio::time::sleep_until(deadline)),
        };
        Ok(Response::from_parts(parts, body.boxed_unsync()))
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Waits up to `grace` for in-flight forwards. Returns false if some
    /// were abandoned.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            info!("Waiting up to {:?} for {} in-flight forwards", grace, pending);
        }
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!("Abandoning {} in-flight forwards", self.tracker.len());
                false
            }
        }
    }
}

async fn send_and_drain(client: &HttpClient, request: Request<OutboundBody>) -> Result<StatusCode> {
    let response = client
        .request(request)
        .await
        .map_err(|e| BasketError::Upstream(e.to_string()))?;
    let status = response.status();
    response
        .into_body()
        .collect()
        .await
        .map_err(|e| BasketError::Upstream(format!("reading response body: {e}")))?;
    Ok(status)
}

/// Response body that fails once the exchange deadline passes.
struct DeadlineBody {
    inner: ResponseBody,
    deadline: Pin<Box<Sleep>>,
}

impl Body for DeadlineBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<std::result::Result<Frame<Self::Data>, Self::Error>>> {
        if self.deadline.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Some(Err("upstream response body exceeded the deadline".into())));
        }
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
