//! Resource cache
//!
//! Tables of string tuples keyed by collection and aggregation parameters,
//! each with its own TTL. Scope listings (zones, regions) are cached here so
//! repeated prompts do not re-list them. Both backends persist the same
//! [`CacheTable`] record, so tables move between them without loss.

use crate::config::CacheImplementation;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Identifies one table: a collection plus the parameters it was listed under
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TableKey {
    pub collection: String,
    pub aggregation: Vec<(String, String)>,
}

impl TableKey {
    pub fn new(collection: &str, aggregation: &[(&str, &str)]) -> Self {
        Self {
            collection: collection.to_string(),
            aggregation: aggregation
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Stable table name, e.g. `compute.zones|project=p`
    pub fn name(&self) -> String {
        let mut name = self.collection.clone();
        for (k, v) in &self.aggregation {
            name.push_str(&format!("|{k}={v}"));
        }
        name
    }
}

/// A cached table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheTable {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
    pub rows: Vec<Vec<String>>,
}

impl CacheTable {
    pub fn new(key: &TableKey, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: key.name(),
            created_at: Utc::now(),
            ttl_secs: ttl_for(&key.collection).as_secs(),
            rows,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let ttl = Duration::seconds(i64::try_from(self.ttl_secs).unwrap_or(i64::MAX / 1000));
        now >= self.created_at + ttl
    }
}

/// Table lifetime per collection
pub fn ttl_for(collection: &str) -> std::time::Duration {
    const HOUR: u64 = 3600;
    match collection {
        "compute.zones" | "compute.regions" => std::time::Duration::from_secs(8 * HOUR),
        _ => std::time::Duration::from_secs(HOUR),
    }
}

/// Backing store for cached tables
pub trait ResourceCache: Send + Sync {
    /// Fresh table for `key`, or `None` when absent or expired
    fn load(&self, key: &TableKey) -> Result<Option<CacheTable>>;

    fn store(&self, table: &CacheTable) -> Result<()>;

    fn invalidate(&self, key: &TableKey) -> Result<()>;

    /// Every stored table, expired or not
    fn tables(&self) -> Result<Vec<CacheTable>>;
}

/// Open the configured backend under `dir`
pub fn open(implementation: CacheImplementation, dir: &Path) -> Box<dyn ResourceCache> {
    match implementation {
        CacheImplementation::File => Box::new(FileCache::new(dir.join("tables"))),
        CacheImplementation::SingleFile => Box::new(TableStore::new(dir.join("cache.db.json"))),
    }
}

/// Default cache location
pub fn default_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|p| p.join("cloudctl"))
}

/// Copy every table from one backend to another
pub fn copy_tables(from: &dyn ResourceCache, to: &dyn ResourceCache) -> Result<usize> {
    let tables = from.tables()?;
    for table in &tables {
        to.store(table)?;
    }
    Ok(tables.len())
}

fn write_atomically(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// One JSON file per table
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(name)))
    }
}

impl ResourceCache for FileCache {
    fn load(&self, key: &TableKey) -> Result<Option<CacheTable>> {
        let path = self.path_for(&key.name());
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let table: CacheTable = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt cache table {}", path.display()))?;
        if table.is_expired(Utc::now()) {
            tracing::debug!("Cache table {} expired", table.name);
            return Ok(None);
        }
        Ok(Some(table))
    }

    fn store(&self, table: &CacheTable) -> Result<()> {
        let content = serde_json::to_string_pretty(table)?;
        write_atomically(&self.path_for(&table.name), &content)
    }

    fn invalidate(&self, key: &TableKey) -> Result<()> {
        let path = self.path_for(&key.name());
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Ok(())
    }

    fn tables(&self) -> Result<Vec<CacheTable>> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Ok(Vec::new());
        };
        let mut tables = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<CacheTable>(&content) {
                Ok(table) => tables.push(table),
                Err(e) => tracing::warn!("Skipping corrupt cache table {}: {}", path.display(), e),
            }
        }
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tables)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    tables: BTreeMap<String, CacheTable>,
}

/// Every table in a single JSON document
pub struct TableStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TableStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<StoreFile> {
        if !self.path.exists() {
            return Ok(StoreFile::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Corrupt cache database {}", self.path.display()))
    }

    fn write(&self, file: &StoreFile) -> Result<()> {
        write_atomically(&self.path, &serde_json::to_string_pretty(file)?)
    }
}

impl ResourceCache for TableStore {
    fn load(&self, key: &TableKey) -> Result<Option<CacheTable>> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let file = self.read()?;
        Ok(file
            .tables
            .get(&key.name())
            .filter(|t| !t.is_expired(Utc::now()))
            .cloned())
    }

    fn store(&self, table: &CacheTable) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut file = self.read()?;
        file.tables.insert(table.name.clone(), table.clone());
        self.write(&file)
    }

    fn invalidate(&self, key: &TableKey) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut file = self.read()?;
        if file.tables.remove(&key.name()).is_some() {
            self.write(&file)?;
        }
        Ok(())
    }

    fn tables(&self) -> Result<Vec<CacheTable>> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        Ok(self.read()?.tables.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones_key() -> TableKey {
        TableKey::new("compute.zones", &[("project", "p")])
    }

    #[test]
    fn test_ttl_per_collection() {
        assert_eq!(ttl_for("compute.zones").as_secs(), 8 * 3600);
        assert_eq!(ttl_for("compute.instances").as_secs(), 3600);
    }

    #[test]
    fn test_file_cache_round_trip_and_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(CacheImplementation::File, dir.path());
        let key = zones_key();
        assert!(cache.load(&key).unwrap().is_none());

        let table = CacheTable::new(&key, vec![vec!["p".into(), "us-central1-a".into()]]);
        cache.store(&table).unwrap();
        assert_eq!(cache.load(&key).unwrap(), Some(table.clone()));

        let stale = CacheTable {
            created_at: Utc::now() - Duration::hours(9),
            ..table
        };
        cache.store(&stale).unwrap();
        assert!(cache.load(&key).unwrap().is_none());

        cache.invalidate(&key).unwrap();
        assert!(cache.tables().unwrap().is_empty());
    }

    #[test]
    fn test_backends_are_interchangeable() {
        let dir = tempfile::tempdir().unwrap();
        let file = open(CacheImplementation::File, dir.path());
        let store = open(CacheImplementation::SingleFile, dir.path());

        let key = zones_key();
        let table = CacheTable::new(&key, vec![vec!["p".into(), "a".into()], vec!["p".into(), "b".into()]]);
        file.store(&table).unwrap();
        file.store(&CacheTable::new(&TableKey::new("compute.regions", &[]), vec![])).unwrap();

        assert_eq!(copy_tables(file.as_ref(), store.as_ref()).unwrap(), 2);
        assert_eq!(store.load(&key).unwrap(), Some(table));
        assert_eq!(store.tables().unwrap(), file.tables().unwrap());
    }
}
