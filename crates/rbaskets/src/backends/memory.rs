use crate::basket::{
    find_page, generate_token, slice_page, Basket, BasketAuth, BasketConfig, BasketNamesPage,
    BasketNamesQueryPage, BasketRecord, BasketsDatabase, DatabaseStats, RequestData,
    RequestsPage, RequestsQueryPage, ResponseConfig, SearchField,
};
use crate::error::{BasketError, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Basket held entirely in process memory.
pub struct MemoryBasket {
    record: RwLock<BasketRecord>,
}

impl MemoryBasket {
    fn new(record: BasketRecord) -> Self {
        Self {
            record: RwLock::new(record),
        }
    }
}

impl Basket for MemoryBasket {
    fn config(&self) -> Result<BasketConfig> {
        Ok(self.record.read().config.clone())
    }

    fn update(&self, config: BasketConfig) -> Result<()> {
        self.record.write().update(config);
        Ok(())
    }

    fn authorize(&self, token: &str) -> bool {
        self.record.read().authorize(token)
    }

    fn get_response(&self, method: &str) -> Result<Option<ResponseConfig>> {
        Ok(self.record.read().get_response(method))
    }

    fn set_response(&self, method: &str, response: ResponseConfig) -> Result<()> {
        self.record.write().set_response(method, response);
        Ok(())
    }

    fn add(&self, request: RequestData) -> Result<RequestData> {
        Ok(self.record.write().add(request))
    }

    fn clear(&self) -> Result<()> {
        self.record.write().clear();
        Ok(())
    }

    fn size(&self) -> Result<usize> {
        Ok(self.record.read().size())
    }

    fn get_requests(&self, max: usize, skip: usize) -> Result<RequestsPage> {
        Ok(self.record.read().get_requests(max, skip))
    }

    fn find_requests(
        &self,
        query: &str,
        field: SearchField,
        max: usize,
        skip: usize,
    ) -> Result<RequestsQueryPage> {
        Ok(self.record.read().find_requests(query, field, max, skip))
    }
}

/// In-memory implementation of BasketsDatabase
///
/// Nothing survives a restart. Useful for testing, development, and
/// single-instance deployments.
pub struct MemoryDatabase {
    baskets: RwLock<BTreeMap<String, Arc<MemoryBasket>>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            baskets: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl BasketsDatabase for MemoryDatabase {
    fn create(&self, name: &str, config: BasketConfig) -> Result<BasketAuth> {
        let mut baskets = self.baskets.write();
        if baskets.contains_key(name) {
            return Err(BasketError::NameConflict(name.to_string()));
        }
        let token = generate_token();
        let record = BasketRecord::new(token.clone(), config);
        baskets.insert(name.to_string(), Arc::new(MemoryBasket::new(record)));
        Ok(BasketAuth { token })
    }

    fn get(&self, name: &str) -> Result<Option<Arc<dyn Basket>>> {
        Ok(self
            .baskets
            .read()
            .get(name)
            .map(|basket| Arc::clone(basket) as Arc<dyn Basket>))
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.baskets.write().remove(name);
        Ok(())
    }

    fn size(&self) -> Result<usize> {
        Ok(self.baskets.read().len())
    }

    fn get_names(&self, max: usize, skip: usize) -> Result<BasketNamesPage> {
        let baskets = self.baskets.read();
        let names: Vec<&String> = baskets.keys().collect();
        let (page, has_more) = slice_page(&names, max, skip);
        Ok(BasketNamesPage {
            names: page.into_iter().cloned().collect(),
            count: names.len(),
            has_more,
        })
    }

    fn find_names(&self, query: &str, max: usize, skip: usize) -> Result<BasketNamesQueryPage> {
        let baskets = self.baskets.read();
        let (found, has_more) = find_page(baskets.keys(), max, skip, |name| name.contains(query));
        Ok(BasketNamesQueryPage {
            names: found.into_iter().cloned().collect(),
            has_more,
        })
    }

    fn get_stats(&self, max: usize) -> Result<DatabaseStats> {
        let mut stats = DatabaseStats::default();
        let baskets = self.baskets.read();
        for (name, basket) in baskets.iter() {
            stats.collect(basket.record.read().info(name), max);
        }
        stats.finalize();
        Ok(stats)
    }

    fn release(&self) {
        let mut baskets = self.baskets.write();
        tracing::info!("Releasing in-memory database ({} baskets)", baskets.len());
        baskets.clear();
    }
}
