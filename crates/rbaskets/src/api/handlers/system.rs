//! Service-wide handlers: version and statistics.

use crate::api::types::*;
use crate::error::BasketError;
use crate::forward::ResponseBody;
use crate::response::{from_error, json_response};
use hyper::{HeaderMap, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct VersionInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub version: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub source_code: &'static str,
}

pub const VERSION: VersionInfo = VersionInfo {
    name: env!("CARGO_PKG_NAME"),
    description: env!("CARGO_PKG_DESCRIPTION"),
    version: env!("CARGO_PKG_VERSION"),
    source_code: env!("CARGO_PKG_REPOSITORY"),
};

/// GET /api/version
pub fn handle_version() -> Response<ResponseBody> {
    json_response(StatusCode::OK, &VERSION)
}

/// GET /api/stats - Aggregated database statistics
pub async fn handle_stats(
    ctx: Arc<ServiceContext>,
    headers: &HeaderMap,
    query: Option<&str>,
) -> Response<ResponseBody> {
    if !ctx.is_master(headers) {
        return from_error(&BasketError::Unauthorized);
    }

    let max = stats_max(query);
    match ctx.with_db(move |db| db.get_stats(max)).await {
        Ok(stats) => json_response(StatusCode::OK, &stats),
        Err(e) => from_error(&e),
    }
}
