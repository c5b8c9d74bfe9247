//! Pooled HTTP clients used for forwarding.

use super::tls::NoVerifier;
use crate::config::ForwardConfig;
use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper_rustls::ConfigBuilderExt;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Body of an outbound forwarded request.
pub type OutboundBody = BoxBody<Bytes, hyper::Error>;

pub type HttpClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, OutboundBody>;

/// Creates a client that speaks HTTP/1.1 over plain TCP or TLS.
///
/// With `skip_tls_verify` the client accepts any server certificate;
/// otherwise certificates are checked against the bundled webpki roots.
pub fn create_http_client(
    config: &ForwardConfig,
    skip_tls_verify: bool,
) -> Result<HttpClient, anyhow::Error> {
    let mut http_connector = HttpConnector::new();
    http_connector.set_connect_timeout(Some(Duration::from_secs(config.connect_timeout_secs)));
    http_connector.enforce_http(false);

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()?;
    let tls = if skip_tls_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier::new(provider)))
            .with_no_client_auth()
    } else {
        builder.with_webpki_roots().with_no_client_auth()
    };

    let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(tls)
        .https_or_http()
        .enable_http1()
        .wrap_connector(http_connector);

    let client = Client::builder(TokioExecutor::new())
        .pool_timer(TokioTimer::new())
        .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
        .pool_max_idle_per_host(config.max_idle_per_host)
        .build(https_connector);

    info!(
        "Forwarding client ready: verify_tls={}, max_idle={}, idle_timeout={}s",
        !skip_tls_verify, config.max_idle_per_host, config.pool_idle_timeout_secs
    );
    Ok(client)
}
