//! Basket storage engine: the contract every backend implements and the
//! backend-independent pieces they share.

mod paging;
mod record;
mod request;
mod stats;
mod token;
mod types;
pub mod validation;

use crate::error::Result;
use std::sync::Arc;

pub use record::BasketRecord;
pub use request::{canonical_header_name, RequestData};
pub use stats::{BasketInfo, DatabaseStats};
pub use token::{generate_token, tokens_equal};
pub use types::{
    BasketAuth, BasketConfig, BasketConfigPatch, BasketNamesPage, BasketNamesQueryPage, Headers,
    RequestsPage, RequestsQueryPage, ResponseConfig, SearchField,
};

pub(crate) use paging::{find as find_page, page as slice_page, window as page_window};

#[cfg(test)]
pub(crate) use record::tests::request_with_body;

/// One named collection of captured requests.
///
/// Implementations serialize mutations per basket while letting readers of the
/// same basket proceed concurrently. Operations on different baskets never
/// block each other.
pub trait Basket: Send + Sync {
    fn config(&self) -> Result<BasketConfig>;

    /// Replaces the config and drops the oldest requests beyond the new capacity.
    fn update(&self, config: BasketConfig) -> Result<()>;

    fn authorize(&self, token: &str) -> bool;

    fn get_response(&self, method: &str) -> Result<Option<ResponseConfig>>;

    fn set_response(&self, method: &str, response: ResponseConfig) -> Result<()>;

    /// Stores the request as the newest entry, evicting the oldest past capacity.
    fn add(&self, request: RequestData) -> Result<RequestData>;

    /// Removes stored requests. The cumulative counter is kept.
    fn clear(&self) -> Result<()>;

    fn size(&self) -> Result<usize>;

    fn get_requests(&self, max: usize, skip: usize) -> Result<RequestsPage>;

    fn find_requests(
        &self,
        query: &str,
        field: SearchField,
        max: usize,
        skip: usize,
    ) -> Result<RequestsQueryPage>;
}

/// Registry of baskets backed by some storage.
///
/// Names are always enumerated in ascending byte order.
pub trait BasketsDatabase: Send + Sync {
    /// Creates a basket, failing with `NameConflict` if the name is taken.
    fn create(&self, name: &str, config: BasketConfig) -> Result<BasketAuth>;

    fn get(&self, name: &str) -> Result<Option<Arc<dyn Basket>>>;

    /// Removes a basket. Deleting an unknown name is not an error.
    fn delete(&self, name: &str) -> Result<()>;

    fn size(&self) -> Result<usize>;

    fn get_names(&self, max: usize, skip: usize) -> Result<BasketNamesPage>;

    fn find_names(&self, query: &str, max: usize, skip: usize) -> Result<BasketNamesQueryPage>;

    /// Aggregates statistics over every basket, keeping the top `max` of each ranking.
    fn get_stats(&self, max: usize) -> Result<DatabaseStats>;

    /// Frees backend resources.
    fn release(&self);
}
