//! SQLite storage.
//!
//! Connections come from an r2d2 pool. Each operation runs as one transaction
//! while holding an in-process lock for its basket: writers to one basket are
//! serialized, readers share, and different baskets never wait on each
//! other's locks. SQLite still admits a single writer per database, so write
//! transactions on different baskets queue briefly on its write lock (bounded
//! by the busy timeout). Other processes writing the same database file are
//! serialized only by SQLite's own locking.

use super::BasketLocks;
use crate::basket::{
    find_page, generate_token, page_window, Basket, BasketAuth, BasketConfig, BasketInfo,
    BasketNamesPage, BasketNamesQueryPage, BasketsDatabase, DatabaseStats, RequestData,
    RequestsPage, RequestsQueryPage, ResponseConfig, SearchField, tokens_equal,
};
use crate::error::{BasketError, Result};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Names fetched per round trip while scanning for stats.
const STATS_PAGE_SIZE: usize = 100;

/// Pooled connections for a database file.
const POOL_SIZE: u32 = 8;

/// How long a write waits for SQLite's database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const IN_MEMORY: &str = ":memory:";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS baskets (
        name TEXT PRIMARY KEY,
        token TEXT NOT NULL,
        capacity INTEGER NOT NULL,
        forward_url TEXT NOT NULL DEFAULT '',
        proxy_response INTEGER NOT NULL DEFAULT 0,
        insecure_tls INTEGER NOT NULL DEFAULT 0,
        expand_path INTEGER NOT NULL DEFAULT 0,
        total_count INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    );

    -- Captured requests, newest has the highest id
    CREATE TABLE IF NOT EXISTS basket_requests (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        basket_name TEXT NOT NULL REFERENCES baskets(name) ON DELETE CASCADE,
        created_at INTEGER NOT NULL,
        request TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_basket_requests_name ON basket_requests(basket_name, id);

    CREATE TABLE IF NOT EXISTS basket_responses (
        basket_name TEXT NOT NULL REFERENCES baskets(name) ON DELETE CASCADE,
        http_method TEXT NOT NULL,
        response TEXT NOT NULL,
        PRIMARY KEY (basket_name, http_method)
    );
"#;

/// r2d2 manager for SQLite connections with the per-connection pragmas set.
struct SqliteConnectionManager {
    path: String,
}

impl r2d2::ManageConnection for SqliteConnectionManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(conn)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.query_row("SELECT 1", [], |_| Ok(()))
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

struct SqlStore {
    pool: r2d2::Pool<SqliteConnectionManager>,
    locks: BasketLocks,
}

impl SqlStore {
    fn conn(&self) -> Result<PooledConnection> {
        self.pool
            .get()
            .map_err(|e| BasketError::storage(format!("SQL pool: {e}")))
    }
}

fn to_sql_int(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_int(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

fn gone(name: &str) -> BasketError {
    BasketError::Storage(format!("basket '{name}' no longer exists"))
}

fn load_config(conn: &Connection, name: &str) -> Result<BasketConfig> {
    conn.query_row(
        "SELECT capacity, forward_url, proxy_response, insecure_tls, expand_path
         FROM baskets WHERE name = ?1",
        params![name],
        |row| {
            Ok(BasketConfig {
                capacity: from_sql_int(row.get(0)?),
                forward_url: row.get(1)?,
                proxy_response: row.get(2)?,
                insecure_tls: row.get(3)?,
                expand_path: row.get(4)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| gone(name))
}

/// Drops the oldest requests beyond `capacity`.
fn trim_requests(conn: &Connection, name: &str, capacity: usize) -> Result<()> {
    conn.execute(
        "DELETE FROM basket_requests
         WHERE basket_name = ?1 AND id NOT IN (
             SELECT id FROM basket_requests WHERE basket_name = ?1 ORDER BY id DESC LIMIT ?2
         )",
        params![name, to_sql_int(capacity)],
    )?;
    Ok(())
}

fn decode_requests(rows: Vec<String>) -> Result<Vec<RequestData>> {
    rows.iter()
        .map(|json| Ok(serde_json::from_str(json)?))
        .collect()
}

pub struct SqlBasket {
    store: Arc<SqlStore>,
    name: String,
}

impl SqlBasket {
    /// Runs `op` under the basket's shared lock.
    fn read<T>(&self, op: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let lock = self.store.locks.get(&self.name);
        let _guard = lock.read();
        let conn = self.store.conn()?;
        op(&conn)
    }

    /// Runs `op` in an immediate transaction under the basket's exclusive lock.
    fn write<T>(&self, op: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let lock = self.store.locks.get(&self.name);
        let _guard = lock.write();
        let mut conn = self.store.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = op(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

impl Basket for SqlBasket {
    fn config(&self) -> Result<BasketConfig> {
        self.read(|conn| load_config(conn, &self.name))
    }

    fn update(&self, config: BasketConfig) -> Result<()> {
        self.write(|tx| {
            let updated = tx.execute(
                "UPDATE baskets SET capacity = ?2, forward_url = ?3, proxy_response = ?4,
                     insecure_tls = ?5, expand_path = ?6
                 WHERE name = ?1",
                params![
                    self.name,
                    to_sql_int(config.capacity),
                    config.forward_url,
                    config.proxy_response,
                    config.insecure_tls,
                    config.expand_path
                ],
            )?;
            if updated == 0 {
                return Err(gone(&self.name));
            }
            trim_requests(tx, &self.name, config.capacity)
        })
    }

    fn authorize(&self, token: &str) -> bool {
        let stored = self
            .read(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT token FROM baskets WHERE name = ?1",
                        params![self.name],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?)
            })
            .unwrap_or_else(|e| {
                warn!("Failed to read token of basket '{}': {}", self.name, e);
                None
            });
        stored.is_some_and(|stored| tokens_equal(&stored, token))
    }

    fn get_response(&self, method: &str) -> Result<Option<ResponseConfig>> {
        let json: Option<String> = self.read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT response FROM basket_responses WHERE basket_name = ?1 AND http_method = ?2",
                    params![self.name, method.to_ascii_uppercase()],
                    |row| row.get(0),
                )
                .optional()?)
        })?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn set_response(&self, method: &str, response: ResponseConfig) -> Result<()> {
        let json = serde_json::to_string(&response)?;
        self.write(|tx| {
            load_config(tx, &self.name)?;
            tx.execute(
                "INSERT INTO basket_responses (basket_name, http_method, response) VALUES (?1, ?2, ?3)
                 ON CONFLICT (basket_name, http_method) DO UPDATE SET response = excluded.response",
                params![self.name, method.to_ascii_uppercase(), json],
            )?;
            Ok(())
        })
    }

    fn add(&self, request: RequestData) -> Result<RequestData> {
        let json = serde_json::to_string(&request)?;
        self.write(|tx| {
            let config = load_config(tx, &self.name)?;
            tx.execute(
                "INSERT INTO basket_requests (basket_name, created_at, request) VALUES (?1, ?2, ?3)",
                params![self.name, request.date, json],
            )?;
            tx.execute(
                "UPDATE baskets SET total_count = total_count + 1 WHERE name = ?1",
                params![self.name],
            )?;
            trim_requests(tx, &self.name, config.capacity)
        })?;
        Ok(request)
    }

    fn clear(&self) -> Result<()> {
        self.write(|tx| {
            tx.execute(
                "DELETE FROM basket_requests WHERE basket_name = ?1",
                params![self.name],
            )?;
            Ok(())
        })
    }

    fn size(&self) -> Result<usize> {
        let count: i64 = self.read(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM basket_requests WHERE basket_name = ?1",
                params![self.name],
                |row| row.get(0),
            )?)
        })?;
        Ok(from_sql_int(count))
    }

    fn get_requests(&self, max: usize, skip: usize) -> Result<RequestsPage> {
        let (total_count, count, rows) = self.read(|conn| {
            // one snapshot for the counters and the page
            let tx = conn.unchecked_transaction()?;
            let total_count: i64 = tx
                .query_row(
                    "SELECT total_count FROM baskets WHERE name = ?1",
                    params![self.name],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| gone(&self.name))?;
            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM basket_requests WHERE basket_name = ?1",
                params![self.name],
                |row| row.get(0),
            )?;
            let rows = {
                let mut stmt = tx.prepare(
                    "SELECT request FROM basket_requests WHERE basket_name = ?1
                     ORDER BY id DESC LIMIT ?2 OFFSET ?3",
                )?;
                let rows = stmt
                    .query_map(
                        params![self.name, to_sql_int(max), to_sql_int(skip)],
                        |row| row.get::<_, String>(0),
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };
            tx.commit()?;
            Ok((total_count, count, rows))
        })?;

        let count = from_sql_int(count);
        let (_, _, has_more) = page_window(count, max, skip);
        Ok(RequestsPage {
            requests: decode_requests(rows)?,
            count,
            total_count: u64::try_from(total_count).unwrap_or(0),
            has_more,
        })
    }

    fn find_requests(
        &self,
        query: &str,
        field: SearchField,
        max: usize,
        skip: usize,
    ) -> Result<RequestsQueryPage> {
        let rows = self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT request FROM basket_requests WHERE basket_name = ?1 ORDER BY id DESC",
            )?;
            let rows = stmt
                .query_map(params![self.name], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        let requests = decode_requests(rows)?;
        let (found, has_more) = find_page(requests, max, skip, |req| req.matches(query, field));
        Ok(RequestsQueryPage {
            requests: found,
            has_more,
        })
    }
}

/// Folds pages of basket summaries into stats. A failure after the first
/// page keeps what was collected and marks the result partial.
fn collect_paged_stats(
    max: usize,
    mut fetch_page: impl FnMut(usize) -> Result<Vec<BasketInfo>>,
) -> Result<DatabaseStats> {
    let mut stats = DatabaseStats::default();
    let mut offset = 0;
    loop {
        match fetch_page(offset) {
            Ok(page) => {
                let fetched = page.len();
                for info in page {
                    stats.collect(info, max);
                }
                if fetched < STATS_PAGE_SIZE {
                    break;
                }
                offset += fetched;
            }
            Err(e) if offset == 0 => return Err(e),
            Err(e) => {
                warn!("Stats scan stopped after {} baskets: {}", offset, e);
                stats.partial = true;
                break;
            }
        }
    }
    stats.finalize();
    Ok(stats)
}

pub struct SqlDatabase {
    store: Arc<SqlStore>,
}

impl SqlDatabase {
    /// Opens the database at `path` (`:memory:` for a private in-memory one)
    /// and creates the schema if missing.
    pub fn open(path: &str) -> Result<Self> {
        let in_memory = path == IN_MEMORY;
        let mut builder = r2d2::Pool::builder()
            .max_size(if in_memory { 1 } else { POOL_SIZE })
            .connection_timeout(Duration::from_secs(5));
        if in_memory {
            // an in-memory database lives exactly as long as its one connection
            builder = builder.idle_timeout(None).max_lifetime(None);
        }
        let pool = builder
            .build(SqliteConnectionManager {
                path: path.to_string(),
            })
            .map_err(|e| BasketError::storage(format!("Failed to create SQL pool: {e}")))?;
        let store = SqlStore {
            pool,
            locks: BasketLocks::default(),
        };

        {
            let conn = store.conn()?;
            if !in_memory {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            }
            conn.execute_batch(SCHEMA)?;
        }
        info!("Opened SQL database at {}", path);
        Ok(Self {
            store: Arc::new(store),
        })
    }

    fn stats_page(&self, offset: usize) -> Result<Vec<BasketInfo>> {
        let conn = self.store.conn()?;
        let mut stmt = conn.prepare(
            "SELECT b.name, b.total_count,
                 (SELECT COUNT(*) FROM basket_requests r WHERE r.basket_name = b.name),
                 (SELECT r.created_at FROM basket_requests r WHERE r.basket_name = b.name
                  ORDER BY r.id DESC LIMIT 1)
             FROM baskets b ORDER BY b.name LIMIT ?1 OFFSET ?2",
        )?;
        let infos = stmt
            .query_map(
                params![to_sql_int(STATS_PAGE_SIZE), to_sql_int(offset)],
                |row| {
                    Ok(BasketInfo {
                        name: row.get(0)?,
                        requests_total_count: u64::try_from(row.get::<_, i64>(1)?).unwrap_or(0),
                        requests_count: from_sql_int(row.get(2)?),
                        last_request_date: row.get(3)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(infos)
    }

    fn all_names(&self) -> Result<Vec<String>> {
        let conn = self.store.conn()?;
        let mut stmt = conn.prepare("SELECT name FROM baskets ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }
}

impl BasketsDatabase for SqlDatabase {
    fn create(&self, name: &str, config: BasketConfig) -> Result<BasketAuth> {
        let token = generate_token();
        let conn = self.store.conn()?;
        let inserted = conn.execute(
            "INSERT INTO baskets
                 (name, token, capacity, forward_url, proxy_response, insecure_tls, expand_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                name,
                token,
                to_sql_int(config.capacity),
                config.forward_url,
                config.proxy_response,
                config.insecure_tls,
                config.expand_path,
                chrono::Utc::now().timestamp_millis()
            ],
        );
        match inserted {
            Ok(_) => Ok(BasketAuth { token }),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(BasketError::NameConflict(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, name: &str) -> Result<Option<Arc<dyn Basket>>> {
        let conn = self.store.conn()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM baskets WHERE name = ?1",
                params![name],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        Ok(exists.then(|| {
            Arc::new(SqlBasket {
                store: Arc::clone(&self.store),
                name: name.to_string(),
            }) as Arc<dyn Basket>
        }))
    }

    fn delete(&self, name: &str) -> Result<()> {
        let lock = self.store.locks.get(name);
        let _guard = lock.write();
        let mut conn = self.store.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM basket_requests WHERE basket_name = ?1",
            params![name],
        )?;
        tx.execute(
            "DELETE FROM basket_responses WHERE basket_name = ?1",
            params![name],
        )?;
        tx.execute("DELETE FROM baskets WHERE name = ?1", params![name])?;
        tx.commit()?;
        self.store.locks.forget(name);
        Ok(())
    }

    fn size(&self) -> Result<usize> {
        let conn = self.store.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM baskets", [], |row| row.get(0))?;
        Ok(from_sql_int(count))
    }

    fn get_names(&self, max: usize, skip: usize) -> Result<BasketNamesPage> {
        let count = self.size()?;
        let conn = self.store.conn()?;
        let mut stmt =
            conn.prepare("SELECT name FROM baskets ORDER BY name LIMIT ?1 OFFSET ?2")?;
        let names = stmt
            .query_map(params![to_sql_int(max), to_sql_int(skip)], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let (_, _, has_more) = page_window(count, max, skip);
        Ok(BasketNamesPage {
            names,
            count,
            has_more,
        })
    }

    fn find_names(&self, query: &str, max: usize, skip: usize) -> Result<BasketNamesQueryPage> {
        let names = self.all_names()?;
        let (names, has_more) = find_page(names, max, skip, |name| name.contains(query));
        Ok(BasketNamesQueryPage { names, has_more })
    }

    fn get_stats(&self, max: usize) -> Result<DatabaseStats> {
        collect_paged_stats(max, |offset| self.stats_page(offset))
    }

    fn release(&self) {
        info!("Releasing SQL database");
        let optimized = self
            .store
            .conn()
            .and_then(|conn| Ok(conn.execute_batch("PRAGMA optimize;")?));
        if let Err(e) = optimized {
            warn!("PRAGMA optimize failed on release: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basket::request_with_body;
    use tempfile::TempDir;

    fn memory_db() -> SqlDatabase {
        SqlDatabase::open(":memory:").unwrap()
    }

    #[test]
    fn test_capacity_and_total() {
        let db = memory_db();
        db.create("sql", BasketConfig::with_capacity(10)).unwrap();
        let basket = db.get("sql").unwrap().unwrap();
        for i in 1..=35 {
            basket.add(request_with_body(&format!("req{i}"))).unwrap();
        }
        let page = basket.get_requests(20, 0).unwrap();
        assert_eq!(page.count, 10);
        assert_eq!(page.total_count, 35);
        assert_eq!(page.requests.len(), 10);
        assert_eq!(page.requests[0].body, "req35");
        assert!(!page.has_more);
    }

    #[test]
    fn test_conflict_and_token() {
        let db = memory_db();
        let auth = db.create("dup", BasketConfig::with_capacity(10)).unwrap();
        assert!(matches!(
            db.create("dup", BasketConfig::with_capacity(5)),
            Err(BasketError::NameConflict(_))
        ));
        let basket = db.get("dup").unwrap().unwrap();
        assert!(basket.authorize(&auth.token));
        assert!(!basket.authorize("nope"));
        assert_eq!(basket.config().unwrap().capacity, 10);
    }

    #[test]
    fn test_update_and_responses() {
        let db = memory_db();
        db.create("cfg", BasketConfig::with_capacity(10)).unwrap();
        let basket = db.get("cfg").unwrap().unwrap();
        for i in 1..=10 {
            basket.add(request_with_body(&format!("req{i}"))).unwrap();
        }

        let mut config = basket.config().unwrap();
        config.capacity = 3;
        config.forward_url = "http://localhost:1/x".to_string();
        config.expand_path = true;
        basket.update(config.clone()).unwrap();
        assert_eq!(basket.config().unwrap(), config);
        assert_eq!(basket.size().unwrap(), 3);
        assert_eq!(basket.get_requests(1, 0).unwrap().requests[0].body, "req10");

        let response = ResponseConfig {
            status: 201,
            body: "created".to_string(),
            ..Default::default()
        };
        basket.set_response("post", response.clone()).unwrap();
        basket.set_response("POST", response.clone()).unwrap();
        assert_eq!(basket.get_response("POST").unwrap(), Some(response));
        assert_eq!(basket.get_response("GET").unwrap(), None);
    }

    #[test]
    fn test_delete_and_stale_handle() {
        let db = memory_db();
        db.create("tmp", BasketConfig::with_capacity(10)).unwrap();
        let basket = db.get("tmp").unwrap().unwrap();
        db.delete("tmp").unwrap();
        db.delete("tmp").unwrap();
        assert!(db.get("tmp").unwrap().is_none());
        assert!(basket.add(request_with_body("late")).is_err());
        assert!(!basket.authorize("anything"));
    }

    #[test]
    fn test_stats_across_pages() {
        let db = memory_db();
        for i in 0..250 {
            db.create(&format!("b{i:03}"), BasketConfig::with_capacity(5))
                .unwrap();
        }
        let basket = db.get("b123").unwrap().unwrap();
        basket.add(request_with_body("x")).unwrap();

        let stats = db.get_stats(3).unwrap();
        assert_eq!(stats.baskets_count, 250);
        assert_eq!(stats.empty_baskets_count, 249);
        assert_eq!(stats.requests_count, 1);
        assert_eq!(stats.top_baskets_size[0].name, "b123");
        assert_eq!(stats.top_baskets_recent.len(), 1);
        assert!(!stats.partial);
    }

    #[test]
    fn test_stats_partial_when_later_page_fails() {
        let db = memory_db();
        for i in 0..150 {
            db.create(&format!("p{i:03}"), BasketConfig::with_capacity(5))
                .unwrap();
        }

        let mut fetched_pages = 0;
        let stats = collect_paged_stats(2, |offset| {
            fetched_pages += 1;
            if offset == 0 {
                db.stats_page(offset)
            } else {
                Err(BasketError::storage("connection lost"))
            }
        })
        .unwrap();
        assert_eq!(fetched_pages, 2);
        assert!(stats.partial);
        assert_eq!(stats.baskets_count, STATS_PAGE_SIZE);
        assert_eq!(stats.top_baskets_size.len(), 2);

        let complete = db.get_stats(2).unwrap();
        assert!(!complete.partial);
        assert_eq!(complete.baskets_count, 150);
    }

    #[test]
    fn test_stats_fail_when_first_page_fails() {
        let result = collect_paged_stats(2, |_| Err(BasketError::storage("unavailable")));
        assert!(matches!(result, Err(BasketError::Storage(_))));
    }

    #[test]
    fn test_locked_basket_does_not_block_others() {
        let dir = TempDir::new().unwrap();
        let db = SqlDatabase::open(dir.path().join("locks.db").to_str().unwrap()).unwrap();
        db.create("busy", BasketConfig::with_capacity(10)).unwrap();
        db.create("free", BasketConfig::with_capacity(10)).unwrap();

        let busy = db.store.locks.get("busy");
        let _held = busy.write();

        let free = db.get("free").unwrap().unwrap();
        free.add(request_with_body("through")).unwrap();
        assert_eq!(free.size().unwrap(), 1);
        assert_eq!(free.get_requests(5, 0).unwrap().total_count, 1);
    }

    #[test]
    fn test_concurrent_writers_keep_counts() {
        let dir = TempDir::new().unwrap();
        let db = SqlDatabase::open(dir.path().join("writers.db").to_str().unwrap()).unwrap();
        let names = ["w0", "w1", "w2", "w3"];
        for name in names {
            db.create(name, BasketConfig::with_capacity(100)).unwrap();
        }
        db.create("shared", BasketConfig::with_capacity(20)).unwrap();

        std::thread::scope(|scope| {
            for name in names {
                let db = &db;
                scope.spawn(move || {
                    let own = db.get(name).unwrap().unwrap();
                    let shared = db.get("shared").unwrap().unwrap();
                    for i in 0..50 {
                        own.add(request_with_body(&format!("{name}-{i}"))).unwrap();
                        if i % 2 == 0 {
                            shared.add(request_with_body(name)).unwrap();
                        }
                    }
                });
            }
        });

        for name in names {
            let page = db.get(name).unwrap().unwrap().get_requests(1, 0).unwrap();
            assert_eq!(page.count, 50);
            assert_eq!(page.total_count, 50);
            assert_eq!(page.requests[0].body, format!("{name}-49"));
        }
        let shared = db.get("shared").unwrap().unwrap().get_requests(1, 0).unwrap();
        assert_eq!(shared.count, 20);
        assert_eq!(shared.total_count, 100);
    }

    #[test]
    fn test_file_database_reopens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("baskets.db");
        let path = path.to_str().unwrap();
        {
            let db = SqlDatabase::open(path).unwrap();
            db.create("kept", BasketConfig::with_capacity(4)).unwrap();
            let basket = db.get("kept").unwrap().unwrap();
            basket.add(request_with_body("one")).unwrap();
        }
        let db = SqlDatabase::open(path).unwrap();
        let basket = db.get("kept").unwrap().unwrap();
        assert_eq!(basket.size().unwrap(), 1);
    }
}
