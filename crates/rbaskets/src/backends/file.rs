//! File-based storage: one JSON document per basket.
//!
//! Documents are loaded once at open. Every mutation rewrites the basket's
//! document through a temporary file and a rename, so a crash leaves either
//! the old or the new version on disk.

use crate::basket::{
    find_page, generate_token, slice_page, Basket, BasketAuth, BasketConfig, BasketNamesPage,
    BasketNamesQueryPage, BasketRecord, BasketsDatabase, DatabaseStats, RequestData,
    RequestsPage, RequestsQueryPage, ResponseConfig, SearchField,
};
use crate::error::{BasketError, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const EXTENSION: &str = "json";

pub struct FileBasket {
    path: PathBuf,
    state: RwLock<FileBasketState>,
}

struct FileBasketState {
    record: BasketRecord,
    /// Set once the basket is deleted; later writes through stale handles are dropped.
    deleted: bool,
}

impl FileBasket {
    fn new(path: PathBuf, record: BasketRecord) -> Self {
        Self {
            path,
            state: RwLock::new(FileBasketState {
                record,
                deleted: false,
            }),
        }
    }

    /// Applies `change` and persists the result while still holding the lock.
    fn mutate<T>(&self, change: impl FnOnce(&mut BasketRecord) -> T) -> Result<T> {
        let mut state = self.state.write();
        let out = change(&mut state.record);
        if !state.deleted {
            write_document(&self.path, &state.record)?;
        }
        Ok(out)
    }
}

impl Basket for FileBasket {
    fn config(&self) -> Result<BasketConfig> {
        Ok(self.state.read().record.config.clone())
    }

    fn update(&self, config: BasketConfig) -> Result<()> {
        self.mutate(|record| record.update(config))
    }

    fn authorize(&self, token: &str) -> bool {
        self.state.read().record.authorize(token)
    }

    fn get_response(&self, method: &str) -> Result<Option<ResponseConfig>> {
        Ok(self.state.read().record.get_response(method))
    }

    fn set_response(&self, method: &str, response: ResponseConfig) -> Result<()> {
        self.mutate(|record| record.set_response(method, response))
    }

    fn add(&self, request: RequestData) -> Result<RequestData> {
        self.mutate(|record| record.add(request))
    }

    fn clear(&self) -> Result<()> {
        self.mutate(|record| record.clear())
    }

    fn size(&self) -> Result<usize> {
        Ok(self.state.read().record.size())
    }

    fn get_requests(&self, max: usize, skip: usize) -> Result<RequestsPage> {
        Ok(self.state.read().record.get_requests(max, skip))
    }

    fn find_requests(
        &self,
        query: &str,
        field: SearchField,
        max: usize,
        skip: usize,
    ) -> Result<RequestsQueryPage> {
        Ok(self
            .state
            .read()
            .record
            .find_requests(query, field, max, skip))
    }
}

pub struct FileDatabase {
    dir: PathBuf,
    baskets: RwLock<BTreeMap<String, Arc<FileBasket>>>,
}

impl FileDatabase {
    /// Opens (creating if needed) `dir` and loads every basket document in it.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut baskets = BTreeMap::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            else {
                continue;
            };
            match read_document(&path) {
                Ok(record) => {
                    baskets.insert(name, Arc::new(FileBasket::new(path, record)));
                }
                Err(e) => warn!("Skipping unreadable basket file {}: {}", path.display(), e),
            }
        }

        info!(
            "Opened file database at {} ({} baskets)",
            dir.display(),
            baskets.len()
        );
        Ok(Self {
            dir,
            baskets: RwLock::new(baskets),
        })
    }

    fn document_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{EXTENSION}"))
    }
}

fn read_document(path: &Path) -> Result<BasketRecord> {
    let contents = fs::read(path)?;
    Ok(serde_json::from_slice(&contents)?)
}

fn write_document(path: &Path, record: &BasketRecord) -> Result<()> {
    let json = serde_json::to_vec(record)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl BasketsDatabase for FileDatabase {
    fn create(&self, name: &str, config: BasketConfig) -> Result<BasketAuth> {
        let mut baskets = self.baskets.write();
        if baskets.contains_key(name) {
            return Err(BasketError::NameConflict(name.to_string()));
        }
        let token = generate_token();
        let record = BasketRecord::new(token.clone(), config);
        let path = self.document_path(name);
        write_document(&path, &record)?;
        baskets.insert(name.to_string(), Arc::new(FileBasket::new(path, record)));
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
        // The registry stays locked until the document is gone, so a
        // re-create of the same name cannot interleave with the removal.
        let mut baskets = self.baskets.write();
        let Some(basket) = baskets.remove(name) else {
            return Ok(());
        };
        let mut state = basket.state.write();
        state.deleted = true;
        match fs::remove_file(&basket.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Basket file {} already gone", basket.path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
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
            stats.collect(basket.state.read().record.info(name), max);
        }
        stats.finalize();
        Ok(stats)
    }

    fn release(&self) {
        info!("Releasing file database at {}", self.dir.display());
        self.baskets.write().clear();
    }
}
