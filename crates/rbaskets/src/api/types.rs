//! Shared state and request helpers for the HTTP API.

use crate::backends::create_database;
use crate::basket::{tokens_equal, validation, Basket, BasketConfig, BasketsDatabase, SearchField};
use crate::config::ServerConfig;
use crate::error::{BasketError, Result};
use crate::forward::{BoxError, Forwarder, ResponseBody};
use crate::response::{error_response, from_error, template};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{HeaderMap, AUTHORIZATION};
use hyper::{Response, StatusCode};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Everything a request handler needs. One per server.
pub struct ServiceContext {
    pub config: ServerConfig,
    pub db: Arc<dyn BasketsDatabase>,
    pub forwarder: Forwarder,
}

impl ServiceContext {
    /// Opens the configured backend, builds the forwarding clients and creates
    /// the auto-created baskets that do not exist yet.
    pub fn from_config(mut config: ServerConfig) -> anyhow::Result<Self> {
        if let Some(token) = config.ensure_master_token() {
            info!("Generated master token: {}", token);
        }

        let db = create_database(&config.database)?;
        for name in &config.baskets.auto_create {
            match db.create(name, BasketConfig::with_capacity(config.baskets.init_capacity)) {
                Ok(auth) => info!("Auto-created basket '{}' with token {}", name, auth.token),
                Err(BasketError::NameConflict(_)) => {}
                Err(e) => anyhow::bail!("Failed to create basket '{name}': {e}"),
            }
        }

        let forwarder = Forwarder::new(&config.forward)?;
        Ok(Self {
            config,
            db,
            forwarder,
        })
    }

    /// Runs a storage call off the async workers.
    pub async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn BasketsDatabase) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(db.as_ref()))
            .await
            .map_err(|e| BasketError::storage(format!("storage task failed: {e}")))?
    }

    pub fn is_master(&self, headers: &HeaderMap) -> bool {
        let master = &self.config.service.master_token;
        !master.is_empty()
            && request_token(headers)
                .is_some_and(|token| tokens_equal(master, token))
    }

    /// Looks up a basket the caller may manage: the basket's own token or the
    /// master token is required.
    pub async fn authorized_basket(
        &self,
        name: &str,
        headers: &HeaderMap,
    ) -> std::result::Result<Arc<dyn Basket>, Response<ResponseBody>> {
        if !validation::is_valid_name(name) {
            return Err(from_error(&BasketError::InvalidName(name.to_string())));
        }

        let master = self.is_master(headers);
        let token = request_token(headers).unwrap_or_default().to_string();
        let lookup = {
            let name = name.to_string();
            self.with_db(move |db| {
                let Some(basket) = db.get(&name)? else {
                    return Ok(None);
                };
                let allowed = master || basket.authorize(&token);
                Ok(Some((basket, allowed)))
            })
            .await
        };

        match lookup {
            Ok(Some((basket, true))) => Ok(basket),
            Ok(Some((_, false))) => Err(from_error(&BasketError::Unauthorized)),
            Ok(None) => Err(error_response(StatusCode::NOT_FOUND, "Basket not found")),
            Err(e) => Err(from_error(&e)),
        }
    }
}

/// Runs a basket call off the async workers.
pub async fn with_basket<T, F>(basket: &Arc<dyn Basket>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn Basket) -> Result<T> + Send + 'static,
{
    let basket = Arc::clone(basket);
    tokio::task::spawn_blocking(move || f(basket.as_ref()))
        .await
        .map_err(|e| BasketError::storage(format!("storage task failed: {e}")))?
}

/// Token from `Authorization: <token>` or `Authorization: Bearer <token>`.
pub fn request_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then_some(token)
}

/// Paging and search parameters of list endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageParams {
    pub max: usize,
    pub skip: usize,
    /// Non-empty search text, when searching.
    pub query: Option<String>,
    pub field: SearchField,
}

impl PageParams {
    /// `max` is clamped to `[1, ten pages]` and defaults to the page size;
    /// `skip` is clamped to `[0, max_capacity]`.
    pub fn parse(query: Option<&str>, page_size: usize, max_capacity: usize) -> Self {
        let params = template::query_context(query.unwrap_or_default());
        let max = clamped_param(&params, "max", 1, page_size.saturating_mul(10).max(1), page_size);
        let skip = clamped_param(&params, "skip", 0, max_capacity, 0);
        let search = first_param(&params, "q")
            .filter(|q| !q.is_empty())
            .map(str::to_string);
        let field = first_param(&params, "in")
            .map(SearchField::from_param)
            .unwrap_or_default();

        Self {
            max,
            skip,
            query: search,
            field,
        }
    }
}

const DEFAULT_STATS_MAX: usize = 5;
const STATS_MAX_LIMIT: usize = 100;

/// Size of the stats rankings requested with `max`.
pub fn stats_max(query: Option<&str>) -> usize {
    let params = template::query_context(query.unwrap_or_default());
    clamped_param(&params, "max", 1, STATS_MAX_LIMIT, DEFAULT_STATS_MAX)
}

fn first_param<'a>(params: &'a BTreeMap<String, Vec<String>>, key: &str) -> Option<&'a str> {
    params.get(key)?.first().map(String::as_str)
}

/// Integer parameter clamped to `[min, max]`; `default` when absent or unparsable.
fn clamped_param(
    params: &BTreeMap<String, Vec<String>>,
    key: &str,
    min: usize,
    max: usize,
    default: usize,
) -> usize {
    let Some(value) = first_param(params, key).and_then(|v| v.trim().parse::<i64>().ok()) else {
        return default;
    };
    if value < min as i64 {
        min
    } else {
        usize::try_from(value).map_or(max, |v| v.min(max))
    }
}

/// Collects a request body of at most `limit` bytes.
pub async fn read_body<B>(body: B, limit: usize) -> std::result::Result<Bytes, Response<ResponseBody>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            &format!("request body exceeds {limit} bytes"),
        )),
        Err(e) => Err(error_response(
            StatusCode::BAD_REQUEST,
            &format!("Failed to read request body: {e}"),
        )),
    }
}

/// Parses a JSON request body, mapping failures to 400.
pub fn parse_json<T: serde::de::DeserializeOwned>(
    body: &[u8],
) -> std::result::Result<T, Response<ResponseBody>> {
    serde_json::from_slice(body)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &format!("Invalid JSON: {e}")))
}

/// True when a body carries nothing but whitespace.
pub fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;
    use hyper::header::HeaderValue;

    #[test]
    fn test_page_params_defaults() {
        let params = PageParams::parse(None, 20, 2000);
        assert_eq!(params.max, 20);
        assert_eq!(params.skip, 0);
        assert!(params.query.is_none());
        assert_eq!(params.field, SearchField::Any);
    }

    #[test]
    fn test_page_params_clamping() {
        let params = PageParams::parse(Some("max=1000&skip=99999"), 20, 2000);
        assert_eq!(params.max, 200);
        assert_eq!(params.skip, 2000);

        let params = PageParams::parse(Some("max=0&skip=-3"), 20, 2000);
        assert_eq!(params.max, 1);
        assert_eq!(params.skip, 0);

        let params = PageParams::parse(Some("max=-5"), 20, 2000);
        assert_eq!(params.max, 1);

        let params = PageParams::parse(Some("max=abc&skip=5"), 20, 2000);
        assert_eq!(params.max, 20);
        assert_eq!(params.skip, 5);
    }

    #[test]
    fn test_page_params_search() {
        let params = PageParams::parse(Some("q=yummy+pie&in=headers"), 20, 2000);
        assert_eq!(params.query.as_deref(), Some("yummy pie"));
        assert_eq!(params.field, SearchField::Headers);

        let params = PageParams::parse(Some("q=&in=body"), 20, 2000);
        assert!(params.query.is_none());
    }

    #[test]
    fn test_stats_max() {
        assert_eq!(stats_max(None), 5);
        assert_eq!(stats_max(Some("max=0")), 1);
        assert_eq!(stats_max(Some("max=-7")), 1);
        assert_eq!(stats_max(Some("max=lots")), 5);
        assert_eq!(stats_max(Some("max=500")), 100);
        assert_eq!(stats_max(Some("max=12")), 12);
    }

    #[test]
    fn test_request_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("abc"));
        assert_eq!(request_token(&headers), Some("abc"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(request_token(&headers), Some("xyz"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(request_token(&headers), None);
    }

    #[tokio::test]
    async fn test_read_body_limit() {
        let body = Full::new(Bytes::from_static(b"0123456789"));
        assert_eq!(read_body(body, 10).await.unwrap(), "0123456789");

        let body = Full::new(Bytes::from_static(b"0123456789"));
        let resp = read_body(body, 4).await.unwrap_err();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(b""));
        assert!(is_blank(b" \n\t"));
        assert!(!is_blank(b"{}"));
    }
}
