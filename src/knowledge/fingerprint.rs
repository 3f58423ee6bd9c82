//! Content fingerprints and the change-detection store.
//!
//! Each (record, category) pair gets a SHA-256 fingerprint over its
//! formatted content. The store keeps the last indexed fingerprint per
//! composite key in SQLite, one table per category. `change_check` stages
//! a new hash without persisting it; `commit_staged` writes staged hashes
//! in one transaction and is called only after the matching documents have
//! landed in the category store, so a fingerprint never exists for data
//! that was not indexed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OpenFlags};
use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};
use crate::knowledge::store::{Category, StoreKind};

/// SHA-256 hex digest over the content only.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Composite key: stable source id, backend tag, category tag.
///
/// Including the backend tag keeps fingerprints per backend, so switching
/// `lance` to `memory` re-indexes instead of silently skipping.
pub fn composite_key(source_id: &str, kind: StoreKind, category: Category) -> String {
    format!("{}_{}_{}", source_id, kind.tag(), category.tag())
}

// ============================================================================
// FingerprintStore
// ============================================================================

pub struct FingerprintStore {
    conn: Arc<Mutex<Connection>>,
    staged: Mutex<HashMap<(Category, String), String>>,
    db_path: PathBuf,
}

impl FingerprintStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RagError::StorageUnavailable(e.to_string()))?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            staged: Mutex::new(HashMap::new()),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// Open under `<data_dir>/hash/fingerprints.db`.
    pub fn open_in(data_dir: &Path) -> Result<Self> {
        Self::open(&data_dir.join("hash").join("fingerprints.db"))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn table(category: Category) -> &'static str {
        match category {
            Category::Info => "hash_info",
            Category::Review => "hash_review",
        }
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        for category in Category::ALL {
            conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        id TEXT PRIMARY KEY,
                        hash TEXT NOT NULL
                    )",
                    Self::table(category)
                ),
                [],
            )?;
        }
        tracing::debug!(path = %self.db_path.display(), "fingerprint store initialized");
        Ok(())
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RagError::StorageUnavailable(format!("lock error: {}", e)))
    }

    /// Last committed fingerprint for a key, if any.
    pub fn load(&self, category: Category, key: &str) -> Result<Option<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT hash FROM {} WHERE id = ?1",
            Self::table(category)
        ))?;
        let hash = stmt.query_row(params![key], |row| row.get(0)).ok();
        Ok(hash)
    }

    /// Compare against the committed fingerprint. A new or different hash
    /// is staged (not persisted) and reported as changed; an identical hash
    /// drops any stale staged value and reports unchanged.
    pub fn change_check(&self, category: Category, key: &str, new_hash: &str) -> Result<bool> {
        let mut staged = self
            .staged
            .lock()
            .map_err(|e| RagError::StorageUnavailable(format!("lock error: {}", e)))?;

        let stored = self.load(category, key)?;
        if stored.as_deref() == Some(new_hash) {
            staged.remove(&(category, key.to_string()));
            return Ok(false);
        }

        staged.insert((category, key.to_string()), new_hash.to_string());
        Ok(true)
    }

    /// Persist the staged hashes for the given keys in one transaction.
    /// Keys with nothing staged are skipped. Returns the number written.
    pub fn commit_staged(&self, category: Category, keys: &[String]) -> Result<usize> {
        let mut staged = self
            .staged
            .lock()
            .map_err(|e| RagError::StorageUnavailable(format!("lock error: {}", e)))?;

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let mut written = 0;

        for key in keys {
            if let Some(hash) = staged.remove(&(category, key.clone())) {
                tx.execute(
                    &format!(
                        "INSERT OR REPLACE INTO {} (id, hash) VALUES (?1, ?2)",
                        Self::table(category)
                    ),
                    params![key, hash],
                )?;
                written += 1;
            }
        }

        tx.commit()?;
        Ok(written)
    }

    /// Drop every committed fingerprint for a category. Other categories
    /// are untouched. Clearing an index without clearing its fingerprints
    /// would make the next ingest skip everything.
    pub fn clear(&self, category: Category) -> Result<usize> {
        let mut staged = self
            .staged
            .lock()
            .map_err(|e| RagError::StorageUnavailable(format!("lock error: {}", e)))?;
        staged.retain(|(c, _), _| *c != category);

        let conn = self.lock_conn()?;
        let removed = conn.execute(&format!("DELETE FROM {}", Self::table(category)), [])?;
        Ok(removed)
    }

    /// Committed fingerprint count for a category.
    pub fn count(&self, category: Category) -> Result<usize> {
        let conn = self.lock_conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", Self::table(category)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

// ============================================================================
// Tests
// ============================================================================
