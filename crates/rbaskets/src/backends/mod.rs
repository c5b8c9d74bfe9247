//! Storage backends for baskets.

mod file;
mod memory;
#[cfg(feature = "redis-backend")]
mod redis;
mod sql;

use crate::basket::BasketsDatabase;
use crate::config::{DatabaseConfig, DbType};
use anyhow::{Context, Result};
use std::sync::Arc;

pub use file::FileDatabase;
pub use memory::MemoryDatabase;
#[cfg(feature = "redis-backend")]
pub use redis::RedisDatabase;
pub use sql::SqlDatabase;

/// Create a BasketsDatabase based on configuration
///
/// # Example
/// ```ignore
/// use rbaskets::config::DatabaseConfig;
/// use rbaskets::backends::create_database;
///
/// let db = create_database(&DatabaseConfig::default())?; // memory
/// ```
pub fn create_database(config: &DatabaseConfig) -> Result<Arc<dyn BasketsDatabase>> {
    match config.db_type {
        DbType::Memory => {
            tracing::info!("Using in-memory baskets database");
            Ok(Arc::new(MemoryDatabase::new()))
        }
        DbType::File => {
            let db = FileDatabase::open(&config.directory).with_context(|| {
                format!("Failed to open file database at {}", config.directory)
            })?;
            Ok(Arc::new(db))
        }
        DbType::Sql => {
            let path = config.sql_path();
            let db = SqlDatabase::open(path)
                .with_context(|| format!("Failed to open SQL database at {path}"))?;
            Ok(Arc::new(db))
        }
        DbType::Redis => {
            #[cfg(feature = "redis-backend")]
            {
                let redis = &config.redis;
                let db = RedisDatabase::new(&redis.url, redis.pool_size, redis.key_prefix.clone())
                    .context("Failed to create Redis backend")?;
                Ok(Arc::new(db))
            }

            #[cfg(not(feature = "redis-backend"))]
            {
                Err(anyhow::anyhow!(
                    "Redis backend not available. Compile with --features redis-backend"
                ))
            }
        }
    }
}

/// Per-basket reader/writer locks for backends whose storage cannot lock a
/// single basket itself.
#[derive(Default)]
pub(crate) struct BasketLocks {
    locks: parking_lot::Mutex<std::collections::HashMap<String, Arc<parking_lot::RwLock<()>>>>,
}

impl BasketLocks {
    pub(crate) fn get(&self, name: &str) -> Arc<parking_lot::RwLock<()>> {
        Arc::clone(self.locks.lock().entry(name.to_string()).or_default())
    }

    pub(crate) fn forget(&self, name: &str) {
        self.locks.lock().remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basket::{request_with_body, BasketConfig, SearchField};
    use tempfile::TempDir;

    /// Runs the same script against a backend and returns everything observable.
    fn observe(db: &dyn BasketsDatabase) -> serde_json::Value {
        for (name, capacity) in [("gamma", 4), ("alpha", 10), ("beta", 2), ("delta", 3)] {
            db.create(name, BasketConfig::with_capacity(capacity)).unwrap();
        }
        for name in ["alpha", "beta", "gamma"] {
            let basket = db.get(name).unwrap().unwrap();
            for i in 0..6 {
                let mut req = request_with_body(&format!("{name} body {i}"));
                req.date = 1_700_000_000_000 + i;
                req.query = format!("i={i}");
                if i % 2 == 0 {
                    req.headers
                        .insert("X-Even".to_string(), vec!["yes".to_string()]);
                }
                basket.add(req).unwrap();
            }
        }
        db.get("alpha")
            .unwrap()
            .unwrap()
            .update(BasketConfig::with_capacity(5))
            .unwrap();
        db.get("gamma").unwrap().unwrap().clear().unwrap();

        let alpha = db.get("alpha").unwrap().unwrap();
        serde_json::json!({
            "names": db.get_names(2, 1).unwrap(),
            "found": db.find_names("a", 2, 1).unwrap(),
            "size": db.size().unwrap(),
            "page": alpha.get_requests(2, 1).unwrap(),
            "search": alpha.find_requests("yes", SearchField::Headers, 2, 0).unwrap(),
            "search_query": alpha.find_requests("i=1", SearchField::Query, 5, 0).unwrap(),
            "stats": db.get_stats(2).unwrap(),
        })
    }

    #[test]
    fn test_backends_agree() {
        let dir = TempDir::new().unwrap();
        let memory = observe(&MemoryDatabase::new());
        let file = observe(&FileDatabase::open(dir.path().join("files")).unwrap());
        let sql = observe(&SqlDatabase::open(":memory:").unwrap());

        assert_eq!(memory, file);
        assert_eq!(memory, sql);
        assert_eq!(memory["names"]["names"], serde_json::json!(["beta", "delta"]));
        assert_eq!(memory["stats"]["baskets_count"], 4);
        assert_eq!(memory["stats"]["requests_total_count"], 18);
    }

    #[test]
    fn test_create_database_from_config() {
        let dir = TempDir::new().unwrap();
        let mut config = DatabaseConfig::default();
        assert!(create_database(&config).is_ok());

        config.db_type = DbType::File;
        config.directory = dir.path().join("baskets").to_string_lossy().into_owned();
        assert!(create_database(&config).is_ok());

        config.db_type = DbType::Sql;
        config.file = dir.path().join("baskets.db").to_string_lossy().into_owned();
        assert!(create_database(&config).is_ok());
    }
}
