//! Redis storage: one JSON document per basket under `{prefix}basket:{name}`.
//!
//! Mutations read, modify and write back the whole document while holding an
//! in-process lock for that basket. The lock does not extend to other
//! processes: two servers sharing one Redis can lose each other's updates to
//! the same basket.

use super::BasketLocks;
use crate::basket::{
    find_page, generate_token, slice_page, Basket, BasketAuth, BasketConfig, BasketNamesPage,
    BasketNamesQueryPage, BasketRecord, BasketsDatabase, DatabaseStats, RequestData,
    RequestsPage, RequestsQueryPage, ResponseConfig, SearchField,
};
use crate::error::{BasketError, Result};
use parking_lot::Mutex;
use redis::{Commands, Connection};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Keys requested per SCAN round trip.
const SCAN_COUNT: usize = 100;

/// r2d2 manager for plain blocking Redis connections.
struct RedisConnectionManager {
    client: redis::Client,
}

impl r2d2::ManageConnection for RedisConnectionManager {
    type Connection = Mutex<Connection>;
    type Error = redis::RedisError;

    fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        Ok(Mutex::new(self.client.get_connection()?))
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        redis::cmd("PING").query(conn.get_mut())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

struct RedisStore {
    pool: r2d2::Pool<RedisConnectionManager>,
    key_prefix: String,
    locks: BasketLocks,
}

impl RedisStore {
    fn key(&self, name: &str) -> String {
        format!("{}basket:{}", self.key_prefix, name)
    }

    fn with_conn<T>(&self, op: impl FnOnce(&mut Connection) -> redis::RedisResult<T>) -> Result<T> {
        let pooled = self
            .pool
            .get()
            .map_err(|e| BasketError::storage(format!("Redis pool: {e}")))?;
        let mut conn = pooled.lock();
        Ok(op(&mut conn)?)
    }

    fn load(&self, name: &str) -> Result<Option<BasketRecord>> {
        let key = self.key(name);
        let json: Option<String> = self.with_conn(|conn| conn.get(&key))?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn load_existing(&self, name: &str) -> Result<BasketRecord> {
        self.load(name)?
            .ok_or_else(|| BasketError::Storage(format!("basket '{name}' no longer exists")))
    }

    fn save(&self, name: &str, record: &BasketRecord) -> Result<()> {
        let key = self.key(name);
        let json = serde_json::to_string(record)?;
        // XX: never resurrect a basket deleted since it was loaded
        let written: Option<String> =
            self.with_conn(|conn| redis::cmd("SET").arg(&key).arg(json).arg("XX").query(conn))?;
        if written.is_none() {
            return Err(BasketError::Storage(format!(
                "basket '{name}' no longer exists"
            )));
        }
        Ok(())
    }

    /// Loads, modifies and stores a record under the basket's write lock.
    fn mutate<T>(&self, name: &str, change: impl FnOnce(&mut BasketRecord) -> T) -> Result<T> {
        let lock = self.locks.get(name);
        let _guard = lock.write();
        let mut record = self.load_existing(name)?;
        let out = change(&mut record);
        self.save(name, &record)?;
        Ok(out)
    }

    fn read<T>(&self, name: &str, view: impl FnOnce(&BasketRecord) -> T) -> Result<T> {
        let lock = self.locks.get(name);
        let _guard = lock.read();
        let record = self.load_existing(name)?;
        Ok(view(&record))
    }

    /// Scans every basket key, following the cursor until it wraps to zero.
    /// Returns the names found so far and the error if a page fails mid-scan.
    fn scan_names(&self) -> (Vec<String>, Option<BasketError>) {
        let pattern = format!("{}basket:*", self.key_prefix);
        let strip = self.key("");
        let mut names = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let page: Result<(u64, Vec<String>)> = self.with_conn(|conn| {
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_COUNT)
                    .query(conn)
            });
            match page {
                Ok((next, keys)) => {
                    names.extend(
                        keys.iter()
                            .filter_map(|k| k.strip_prefix(&strip))
                            .map(str::to_string),
                    );
                    if next == 0 {
                        break;
                    }
                    cursor = next;
                }
                Err(e) => return (finish_names(names), Some(e)),
            }
        }
        (finish_names(names), None)
    }

    fn all_names(&self) -> Result<Vec<String>> {
        match self.scan_names() {
            (names, None) => Ok(names),
            (_, Some(e)) => Err(e),
        }
    }
}

/// SCAN may repeat keys and returns them unordered.
fn finish_names(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names.dedup();
    names
}

pub struct RedisBasket {
    store: Arc<RedisStore>,
    name: String,
}

impl Basket for RedisBasket {
    fn config(&self) -> Result<BasketConfig> {
        self.store.read(&self.name, |record| record.config.clone())
    }

    fn update(&self, config: BasketConfig) -> Result<()> {
        self.store.mutate(&self.name, |record| record.update(config))
    }

    fn authorize(&self, token: &str) -> bool {
        match self.store.read(&self.name, |record| record.authorize(token)) {
            Ok(authorized) => authorized,
            Err(e) => {
                warn!("Failed to authorize against basket '{}': {}", self.name, e);
                false
            }
        }
    }

    fn get_response(&self, method: &str) -> Result<Option<ResponseConfig>> {
        self.store
            .read(&self.name, |record| record.get_response(method))
    }

    fn set_response(&self, method: &str, response: ResponseConfig) -> Result<()> {
        self.store
            .mutate(&self.name, |record| record.set_response(method, response))
    }

    fn add(&self, request: RequestData) -> Result<RequestData> {
        self.store.mutate(&self.name, |record| record.add(request))
    }

    fn clear(&self) -> Result<()> {
        self.store.mutate(&self.name, |record| record.clear())
    }

    fn size(&self) -> Result<usize> {
        self.store.read(&self.name, |record| record.size())
    }

    fn get_requests(&self, max: usize, skip: usize) -> Result<RequestsPage> {
        self.store
            .read(&self.name, |record| record.get_requests(max, skip))
    }

    fn find_requests(
        &self,
        query: &str,
        field: SearchField,
        max: usize,
        skip: usize,
    ) -> Result<RequestsQueryPage> {
        self.store.read(&self.name, |record| {
            record.find_requests(query, field, max, skip)
        })
    }
}

pub struct RedisDatabase {
    store: Arc<RedisStore>,
}

impl RedisDatabase {
    /// Connects to Redis and verifies the connection with PING.
    pub fn new(url: &str, pool_size: u32, key_prefix: String) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let pool = r2d2::Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(Duration::from_secs(5))
            .build(RedisConnectionManager { client })
            .map_err(|e| BasketError::storage(format!("Failed to create Redis pool: {e}")))?;

        let store = RedisStore {
            pool,
            key_prefix,
            locks: BasketLocks::default(),
        };
        let _: String = store.with_conn(|conn| redis::cmd("PING").query(conn))?;

        info!(
            "Connected to Redis with prefix={}, pool_size={}",
            store.key_prefix, pool_size
        );
        Ok(Self {
            store: Arc::new(store),
        })
    }
}

impl BasketsDatabase for RedisDatabase {
    fn create(&self, name: &str, config: BasketConfig) -> Result<BasketAuth> {
        let token = generate_token();
        let record = BasketRecord::new(token.clone(), config);
        let key = self.store.key(name);
        let json = serde_json::to_string(&record)?;
        let created: Option<String> = self
            .store
            .with_conn(|conn| redis::cmd("SET").arg(&key).arg(json).arg("NX").query(conn))?;
        match created {
            Some(_) => Ok(BasketAuth { token }),
            None => Err(BasketError::NameConflict(name.to_string())),
        }
    }

    fn get(&self, name: &str) -> Result<Option<Arc<dyn Basket>>> {
        let key = self.store.key(name);
        let exists: bool = self.store.with_conn(|conn| conn.exists(&key))?;
        if !exists {
            return Ok(None);
        }
        Ok(Some(Arc::new(RedisBasket {
            store: Arc::clone(&self.store),
            name: name.to_string(),
        })))
    }

    fn delete(&self, name: &str) -> Result<()> {
        let lock = self.store.locks.get(name);
        let _guard = lock.write();
        let key = self.store.key(name);
        let _: i64 = self.store.with_conn(|conn| conn.del(&key))?;
        self.store.locks.forget(name);
        Ok(())
    }

    fn size(&self) -> Result<usize> {
        Ok(self.store.all_names()?.len())
    }

    fn get_names(&self, max: usize, skip: usize) -> Result<BasketNamesPage> {
        let names = self.store.all_names()?;
        let (page, has_more) = slice_page(&names, max, skip);
        Ok(BasketNamesPage {
            names: page,
            count: names.len(),
            has_more,
        })
    }

    fn find_names(&self, query: &str, max: usize, skip: usize) -> Result<BasketNamesQueryPage> {
        let names = self.store.all_names()?;
        let (names, has_more) = find_page(names, max, skip, |name| name.contains(query));
        Ok(BasketNamesQueryPage { names, has_more })
    }

    fn get_stats(&self, max: usize) -> Result<DatabaseStats> {
        let mut stats = DatabaseStats::default();
        let (names, scan_error) = self.store.scan_names();
        if let Some(e) = scan_error {
            if names.is_empty() {
                return Err(e);
            }
            warn!("Basket scan cut short after {} keys: {}", names.len(), e);
            stats.partial = true;
        }

        for (scanned, name) in names.iter().enumerate() {
            match self.store.load(name) {
                Ok(Some(record)) => stats.collect(record.info(name), max),
                // deleted since the scan
                Ok(None) => {}
                Err(e) if scanned == 0 => return Err(e),
                Err(e) => {
                    warn!("Stats scan stopped after {} baskets: {}", scanned, e);
                    stats.partial = true;
                    break;
                }
            }
        }
        stats.finalize();
        Ok(stats)
    }

    fn release(&self) {
        info!("Releasing Redis database (prefix={})", self.store.key_prefix);
    }
}
