//! ItemStore - typed, thread-safe item collection
//!
//! Concurrency Model:
//! - Database uses an r2d2 connection pool; write transactions begin IMMEDIATE
//!   so the SQLite busy timeout absorbs writer contention
//! - Writes that target an existing item (update, enrichment, favorite, delete)
//!   take that item's lock, so they never interleave for the same id
//! - Different ids never share a lock; lock entries are dropped once unused

use crate::database::Database;
use crate::interface::{
    ClipShotResult, EnrichmentPatch, Item, ItemContent, ItemFilter, ItemId, ItemKind, ItemQuery,
};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub struct ItemStore {
    db: Database,
    item_locks: Mutex<HashMap<ItemId, Arc<Mutex<()>>>>,
}

impl ItemStore {
    /// Open (or create) the store backed by a file
    pub fn open<P: AsRef<Path>>(path: P) -> ClipShotResult<Self> {
        Ok(Self::with_database(Database::open(path)?))
    }

    /// Create a store with an in-memory database (for testing)
    pub fn open_in_memory() -> ClipShotResult<Self> {
        Ok(Self::with_database(Database::open_in_memory()?))
    }

    fn with_database(db: Database) -> Self {
        Self {
            db,
            item_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` while holding the write lock for `id`
    fn with_item_lock<T>(&self, id: ItemId, f: impl FnOnce() -> T) -> T {
        let lock = self
            .item_locks
            .lock()
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock();
            f()
        };

        let mut table = self.item_locks.lock();
        // One reference in the table, one held here: nobody else is waiting
        if Arc::strong_count(&lock) == 2 {
            table.remove(&id);
        }
        result
    }

    #[cfg(test)]
    fn lock_table_len(&self) -> usize {
        self.item_locks.lock().len()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────────

    /// Persist a new candidate. The store assigns id and timestamp.
    pub fn insert(&self, content: ItemContent) -> ClipShotResult<Item> {
        let timestamp = Utc::now();
        let id = self.db.insert_item(&content, &[], timestamp)?;
        debug!(item_id = id, kind = %content.kind(), "Inserted item");
        Ok(Item {
            id,
            timestamp,
            is_favorite: false,
            tags: Vec::new(),
            content,
        })
    }

    /// Persist favorite, tags and enrichment fields of an existing item
    pub fn update(&self, item: &Item) -> ClipShotResult<()> {
        self.with_item_lock(item.id, || self.db.update_item(item))?;
        Ok(())
    }

    /// Write only the fields carried by the patch
    pub fn apply_enrichment(&self, id: ItemId, patch: &EnrichmentPatch) -> ClipShotResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        self.with_item_lock(id, || self.db.apply_patch(id, patch))?;
        Ok(())
    }

    pub fn set_favorite(&self, id: ItemId, is_favorite: bool) -> ClipShotResult<()> {
        self.with_item_lock(id, || self.db.set_favorite(id, is_favorite))?;
        Ok(())
    }

    /// Flip the favorite flag under the item lock. Returns the new value.
    pub fn toggle_favorite(&self, id: ItemId) -> ClipShotResult<bool> {
        let toggled = self.with_item_lock(id, || {
            let item = self
                .db
                .fetch_item(id)?
                .ok_or(crate::database::DatabaseError::NotFound(id))?;
            let value = !item.is_favorite;
            self.db.set_favorite(id, value)?;
            Ok::<_, crate::database::DatabaseError>(value)
        })?;
        Ok(toggled)
    }

    /// Delete an item. Returns false if it was already gone.
    pub fn delete(&self, id: ItemId) -> ClipShotResult<bool> {
        let deleted = self.with_item_lock(id, || self.db.delete_item(id))?;
        debug!(item_id = id, deleted, "Delete item");
        Ok(deleted)
    }

    /// Remove every item of every kind
    pub fn clear_all(&self) -> ClipShotResult<()> {
        self.db.clear_all()?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn get(&self, id: ItemId) -> ClipShotResult<Option<Item>> {
        Ok(self.db.fetch_item(id)?)
    }

    pub fn most_recent(&self, kind: ItemKind, limit: usize) -> ClipShotResult<Vec<Item>> {
        Ok(self.db.most_recent(kind, limit)?)
    }

    pub fn find_by_field(&self, kind: ItemKind, filter: &ItemFilter) -> ClipShotResult<Vec<Item>> {
        Ok(self.db.find_by_field(kind, filter)?)
    }

    pub fn contains_screenshot(&self, file_name: &str) -> ClipShotResult<bool> {
        Ok(self.db.screenshot_exists(file_name)?)
    }

    /// Items across kinds, newest first, filtered by kind, favorite flag and search text
    pub fn query(&self, query: &ItemQuery) -> ClipShotResult<Vec<Item>> {
        let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let Some(search) = search else {
            return Ok(self.db.fetch_items(query, true)?);
        };

        // Search is applied after hydration, so the limit must be too
        let mut items: Vec<Item> = self
            .db
            .fetch_items(query, false)?
            .into_iter()
            .filter(|item| item.matches_search(search))
            .collect();
        if let Some(limit) = query.limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    pub fn count(&self) -> ClipShotResult<u64> {
        Ok(self.db.count_items()?)
    }

    pub fn database_size(&self) -> ClipShotResult<i64> {
        Ok(self.db.database_size()?)
    }
}
