//! SQLite database layer for history storage
//!
//! Normalized schema: base `items` table (shared envelope) + one child table
//! per kind. Uses r2d2 connection pooling so the UI can read while the
//! monitors and enrichment tasks write.

use crate::interface::{EnrichmentPatch, Item, ItemContent, ItemFilter, ItemId, ItemKind, ItemQuery};
use chrono::{DateTime, TimeZone, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Tag encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Item {0} not found")]
    NotFound(ItemId),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const BASE_COLUMNS: &str = "items.id, items.kind, items.timestamp, items.isFavorite, items.tags";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Format a timestamp for storage. Fixed-width so string order is time order.
fn format_db_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse timestamp string from database to DateTime<Utc>
fn parse_db_timestamp(timestamp_str: &str) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%d %H:%M:%S"))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .ok()
}

/// Write transactions take the write lock up front. A deferred transaction
/// that reads first cannot be retried by the busy handler once another
/// connection commits in WAL mode.
fn begin_write(conn: &mut Connection) -> rusqlite::Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
}

/// Envelope columns read from `items` before the child row is joined in
struct BaseRow {
    id: ItemId,
    kind: String,
    timestamp: String,
    is_favorite: bool,
    tags: String,
}

/// Thread-safe database wrapper using connection pooling
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open or create a database at the given path with connection pooling
    pub fn open<P: AsRef<Path>>(path: P) -> DatabaseResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch(
                "
                PRAGMA journal_mode=WAL;
                PRAGMA synchronous=NORMAL;
                PRAGMA foreign_keys=ON;
                PRAGMA mmap_size=67108864;
                PRAGMA cache_size=-32000;
            ",
            )?;
            Ok(())
        });

        let pool = Pool::builder().max_size(8).build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests and throwaway sessions)
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys=ON;")?;
            Ok(())
        });

        // In-memory needs single connection to maintain state
        let pool = Pool::builder().max_size(1).build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    /// Get a connection from the pool
    fn get_conn(&self) -> DatabaseResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Set up the database schema (items + one child table per kind)
    fn setup_schema(&self) -> DatabaseResult<()> {
        let conn = self.get_conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                isFavorite INTEGER NOT NULL DEFAULT 0,
                tags TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS text_items (
                itemId INTEGER PRIMARY KEY REFERENCES items(id) ON DELETE CASCADE,
                content TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS url_items (
                itemId INTEGER PRIMARY KEY REFERENCES items(id) ON DELETE CASCADE,
                url TEXT NOT NULL,
                title TEXT,
                faviconUrl TEXT
            );

            CREATE TABLE IF NOT EXISTS code_items (
                itemId INTEGER PRIMARY KEY REFERENCES items(id) ON DELETE CASCADE,
                code TEXT NOT NULL,
                language TEXT
            );

            CREATE TABLE IF NOT EXISTS screenshot_items (
                itemId INTEGER PRIMARY KEY REFERENCES items(id) ON DELETE CASCADE,
                filePath TEXT NOT NULL,
                fileName TEXT NOT NULL UNIQUE,
                ocrText TEXT,
                thumbnail BLOB
            );

            CREATE TABLE IF NOT EXISTS image_items (
                itemId INTEGER PRIMARY KEY REFERENCES items(id) ON DELETE CASCADE,
                data BLOB NOT NULL,
                thumbnail BLOB
            );

            CREATE INDEX IF NOT EXISTS idx_items_timestamp ON items(timestamp);
            CREATE INDEX IF NOT EXISTS idx_items_kind_timestamp ON items(kind, timestamp);
        "#,
        )?;

        Ok(())
    }

    /// Get the database size in bytes
    pub fn database_size(&self) -> DatabaseResult<i64> {
        let conn = self.get_conn()?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        Ok(page_count * page_size)
    }

    /// Get total number of items in the database
    pub fn count_items(&self) -> DatabaseResult<u64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────────

    /// Insert a new item into `items` + its child table in one transaction.
    /// Returns the assigned item ID.
    pub fn insert_item(
        &self,
        content: &ItemContent,
        tags: &[String],
        timestamp: DateTime<Utc>,
    ) -> DatabaseResult<ItemId> {
        let mut conn = self.get_conn()?;
        let tx = begin_write(&mut conn)?;

        let tags_json = serde_json::to_string(tags)?;
        tx.execute(
            "INSERT INTO items (kind, timestamp, isFavorite, tags) VALUES (?1, ?2, 0, ?3)",
            params![
                content.kind().database_type(),
                format_db_timestamp(&timestamp),
                tags_json
            ],
        )?;
        let item_id = tx.last_insert_rowid();

        match content {
            ItemContent::Text { content } => {
                tx.execute(
                    "INSERT INTO text_items (itemId, content) VALUES (?1, ?2)",
                    params![item_id, content],
                )?;
            }
            ItemContent::Url { url, title, favicon_url } => {
                tx.execute(
                    "INSERT INTO url_items (itemId, url, title, faviconUrl) VALUES (?1, ?2, ?3, ?4)",
                    params![item_id, url, title, favicon_url],
                )?;
            }
            ItemContent::Code { code, language } => {
                tx.execute(
                    "INSERT INTO code_items (itemId, code, language) VALUES (?1, ?2, ?3)",
                    params![item_id, code, language],
                )?;
            }
            ItemContent::Screenshot { file_path, file_name, ocr_text, thumbnail } => {
                tx.execute(
                    r#"INSERT INTO screenshot_items (itemId, filePath, fileName, ocrText, thumbnail)
                       VALUES (?1, ?2, ?3, ?4, ?5)"#,
                    params![item_id, file_path, file_name, ocr_text, thumbnail],
                )?;
            }
            ItemContent::Image { data, thumbnail } => {
                tx.execute(
                    "INSERT INTO image_items (itemId, data, thumbnail) VALUES (?1, ?2, ?3)",
                    params![item_id, data, thumbnail],
                )?;
            }
        }

        tx.commit()?;
        Ok(item_id)
    }

    /// Persist every mutable field of an existing item (favorite, tags,
    /// enrichment fields). Identity fields are never written.
    pub fn update_item(&self, item: &Item) -> DatabaseResult<()> {
        let mut conn = self.get_conn()?;
        let tx = begin_write(&mut conn)?;

        let tags_json = serde_json::to_string(&item.tags)?;
        let updated = tx.execute(
            "UPDATE items SET isFavorite = ?1, tags = ?2 WHERE id = ?3 AND kind = ?4",
            params![item.is_favorite, tags_json, item.id, item.kind().database_type()],
        )?;
        if updated == 0 {
            return Err(DatabaseError::NotFound(item.id));
        }

        match &item.content {
            ItemContent::Url { title, favicon_url, .. } => {
                tx.execute(
                    "UPDATE url_items SET title = ?1, faviconUrl = ?2 WHERE itemId = ?3",
                    params![title, favicon_url, item.id],
                )?;
            }
            ItemContent::Code { language, .. } => {
                tx.execute(
                    "UPDATE code_items SET language = ?1 WHERE itemId = ?2",
                    params![language, item.id],
                )?;
            }
            ItemContent::Screenshot { ocr_text, thumbnail, .. } => {
                tx.execute(
                    "UPDATE screenshot_items SET ocrText = ?1, thumbnail = ?2 WHERE itemId = ?3",
                    params![ocr_text, thumbnail, item.id],
                )?;
            }
            ItemContent::Image { thumbnail, .. } => {
                tx.execute(
                    "UPDATE image_items SET thumbnail = ?1 WHERE itemId = ?2",
                    params![thumbnail, item.id],
                )?;
            }
            ItemContent::Text { .. } => {}
        }

        tx.commit()?;
        Ok(())
    }

    /// Apply an enrichment patch. Only the fields present in the patch are
    /// written; fields that do not apply to the item's kind are ignored.
    pub fn apply_patch(&self, id: ItemId, patch: &EnrichmentPatch) -> DatabaseResult<()> {
        let mut conn = self.get_conn()?;
        let tx = begin_write(&mut conn)?;

        let kind: Option<String> = tx
            .query_row("SELECT kind FROM items WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        let kind = kind
            .as_deref()
            .and_then(ItemKind::from_database)
            .ok_or(DatabaseError::NotFound(id))?;

        match kind {
            ItemKind::Url => {
                tx.execute(
                    r#"UPDATE url_items SET title = COALESCE(?1, title), faviconUrl = COALESCE(?2, faviconUrl)
                       WHERE itemId = ?3"#,
                    params![patch.title, patch.favicon_url, id],
                )?;
            }
            ItemKind::Screenshot => {
                tx.execute(
                    r#"UPDATE screenshot_items SET ocrText = COALESCE(?1, ocrText), thumbnail = COALESCE(?2, thumbnail)
                       WHERE itemId = ?3"#,
                    params![patch.ocr_text, patch.thumbnail, id],
                )?;
            }
            ItemKind::Image => {
                tx.execute(
                    "UPDATE image_items SET thumbnail = COALESCE(?1, thumbnail) WHERE itemId = ?2",
                    params![patch.thumbnail, id],
                )?;
            }
            ItemKind::Text | ItemKind::Code => {}
        }

        tx.commit()?;
        Ok(())
    }

    /// Set the favorite flag
    pub fn set_favorite(&self, id: ItemId, is_favorite: bool) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            "UPDATE items SET isFavorite = ?1 WHERE id = ?2",
            params![is_favorite, id],
        )?;
        if updated == 0 {
            return Err(DatabaseError::NotFound(id));
        }
        Ok(())
    }

    /// Delete an item by ID (CASCADE handles the child row).
    /// Returns false when the item did not exist.
    pub fn delete_item(&self, id: ItemId) -> DatabaseResult<bool> {
        let conn = self.get_conn()?;
        let deleted = conn.execute("DELETE FROM items WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    /// Delete every item of every kind in one transaction.
    /// AUTOINCREMENT keeps its high-water mark, so IDs are never reused.
    pub fn clear_all(&self) -> DatabaseResult<()> {
        let mut conn = self.get_conn()?;
        let tx = begin_write(&mut conn)?;
        for kind in ItemKind::ALL {
            tx.execute(&format!("DELETE FROM {}", kind.child_table()), [])?;
        }
        tx.execute("DELETE FROM items", [])?;
        tx.commit()?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────────

    /// Fetch a single item by ID
    pub fn fetch_item(&self, id: ItemId) -> DatabaseResult<Option<Item>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM items WHERE items.id = ?1", BASE_COLUMNS);
        let base = conn.query_row(&sql, [id], Self::row_to_base).optional()?;
        match base {
            Some(base) => Self::hydrate(&conn, base),
            None => Ok(None),
        }
    }

    /// Most recent items of one kind, newest first
    pub fn most_recent(&self, kind: ItemKind, limit: usize) -> DatabaseResult<Vec<Item>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM items WHERE items.kind = ?1 ORDER BY items.timestamp DESC, items.id DESC LIMIT ?2",
            BASE_COLUMNS
        );
        let values = vec![
            Value::from(kind.database_type().to_string()),
            Value::from(limit as i64),
        ];
        Self::load_items(&conn, &sql, values)
    }

    /// Items of one kind matching an equality / range predicate, newest first
    pub fn find_by_field(&self, kind: ItemKind, filter: &ItemFilter) -> DatabaseResult<Vec<Item>> {
        let conn = self.get_conn()?;
        let mut values = vec![Value::from(kind.database_type().to_string())];

        let (join, clause) = match filter {
            ItemFilter::FileName(name) => {
                values.push(Value::from(name.clone()));
                (
                    "JOIN screenshot_items s ON s.itemId = items.id",
                    "s.fileName = ?2",
                )
            }
            ItemFilter::Url(url) => {
                values.push(Value::from(url.clone()));
                ("JOIN url_items u ON u.itemId = items.id", "u.url = ?2")
            }
            ItemFilter::CreatedSince(since) => {
                values.push(Value::from(format_db_timestamp(since)));
                ("", "items.timestamp >= ?2")
            }
            ItemFilter::CreatedBetween { start, end } => {
                values.push(Value::from(format_db_timestamp(start)));
                values.push(Value::from(format_db_timestamp(end)));
                ("", "items.timestamp >= ?2 AND items.timestamp <= ?3")
            }
            ItemFilter::Favorite(is_favorite) => {
                values.push(Value::from(*is_favorite));
                ("", "items.isFavorite = ?2")
            }
        };

        let sql = format!(
            "SELECT {} FROM items {} WHERE items.kind = ?1 AND {} ORDER BY items.timestamp DESC, items.id DESC",
            BASE_COLUMNS, join, clause
        );
        Self::load_items(&conn, &sql, values)
    }

    /// Check whether a screenshot with this file name is already stored
    pub fn screenshot_exists(&self, file_name: &str) -> DatabaseResult<bool> {
        let conn = self.get_conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM screenshot_items WHERE fileName = ?1)",
            [file_name],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Items across kinds, newest first, filtered by kind and favorite flag.
    /// Search text is matched by the caller on hydrated items.
    pub fn fetch_items(&self, query: &ItemQuery, apply_limit: bool) -> DatabaseResult<Vec<Item>> {
        let conn = self.get_conn()?;
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(kind) = query.kind {
            values.push(Value::from(kind.database_type().to_string()));
            clauses.push(format!("items.kind = ?{}", values.len()));
        }
        if query.favorites_only {
            clauses.push("items.isFavorite = 1".to_string());
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let limit_clause = match query.limit {
            Some(limit) if apply_limit => {
                values.push(Value::from(limit as i64));
                format!("LIMIT ?{}", values.len())
            }
            _ => String::new(),
        };

        let sql = format!(
            "SELECT {} FROM items {} ORDER BY items.timestamp DESC, items.id DESC {}",
            BASE_COLUMNS, where_clause, limit_clause
        );
        Self::load_items(&conn, &sql, values)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Row mapping
    // ─────────────────────────────────────────────────────────────────────────────

    fn load_items(conn: &Connection, sql: &str, values: Vec<Value>) -> DatabaseResult<Vec<Item>> {
        let mut stmt = conn.prepare(sql)?;
        let bases = stmt
            .query_map(params_from_iter(values), Self::row_to_base)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut items = Vec::with_capacity(bases.len());
        for base in bases {
            if let Some(item) = Self::hydrate(conn, base)? {
                items.push(item);
            }
        }
        Ok(items)
    }

    fn row_to_base(row: &rusqlite::Row) -> rusqlite::Result<BaseRow> {
        Ok(BaseRow {
            id: row.get(0)?,
            kind: row.get(1)?,
            timestamp: row.get(2)?,
            is_favorite: row.get(3)?,
            tags: row.get(4)?,
        })
    }

    /// Join the child row into a full `Item`.
    /// Returns None for rows whose child row is missing or whose kind is unknown.
    fn hydrate(conn: &Connection, base: BaseRow) -> DatabaseResult<Option<Item>> {
        let Some(kind) = ItemKind::from_database(&base.kind) else {
            warn!(item_id = base.id, kind = %base.kind, "Skipping item with unknown kind");
            return Ok(None);
        };
        let Some(timestamp) = parse_db_timestamp(&base.timestamp) else {
            warn!(item_id = base.id, timestamp = %base.timestamp, "Skipping item with unreadable timestamp");
            return Ok(None);
        };

        let id = base.id;
        let content = match kind {
            ItemKind::Text => conn
                .query_row(
                    "SELECT content FROM text_items WHERE itemId = ?1",
                    [id],
                    |row| Ok(ItemContent::Text { content: row.get(0)? }),
                )
                .optional()?,
            ItemKind::Url => conn
                .query_row(
                    "SELECT url, title, faviconUrl FROM url_items WHERE itemId = ?1",
                    [id],
                    |row| {
                        Ok(ItemContent::Url {
                            url: row.get(0)?,
                            title: row.get(1)?,
                            favicon_url: row.get(2)?,
                        })
                    },
                )
                .optional()?,
            ItemKind::Code => conn
                .query_row(
                    "SELECT code, language FROM code_items WHERE itemId = ?1",
                    [id],
                    |row| {
                        Ok(ItemContent::Code {
                            code: row.get(0)?,
                            language: row.get(1)?,
                        })
                    },
                )
                .optional()?,
            ItemKind::Screenshot => conn
                .query_row(
                    "SELECT filePath, fileName, ocrText, thumbnail FROM screenshot_items WHERE itemId = ?1",
                    [id],
                    |row| {
                        Ok(ItemContent::Screenshot {
                            file_path: row.get(0)?,
                            file_name: row.get(1)?,
                            ocr_text: row.get(2)?,
                            thumbnail: row.get(3)?,
                        })
                    },
                )
                .optional()?,
            ItemKind::Image => conn
                .query_row(
                    "SELECT data, thumbnail FROM image_items WHERE itemId = ?1",
                    [id],
                    |row| {
                        Ok(ItemContent::Image {
                            data: row.get(0)?,
                            thumbnail: row.get(1)?,
                        })
                    },
                )
                .optional()?,
        };

        let Some(content) = content else {
            warn!(item_id = id, kind = %kind, "Skipping item without child row");
            return Ok(None);
        };

        let tags: Vec<String> = serde_json::from_str(&base.tags).unwrap_or_else(|e| {
            warn!(item_id = id, error = %e, "Unreadable tags, treating as empty");
            Vec::new()
        });

        Ok(Some(Item {
            id,
            timestamp,
            is_favorite: base.is_favorite,
            tags,
            content,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> ItemContent {
        ItemContent::Text {
            content: value.to_string(),
        }
    }

    #[test]
    fn test_insert_and_fetch_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let content = ItemContent::Screenshot {
            file_path: "/tmp/Screenshot 1.png".to_string(),
            file_name: "Screenshot 1.png".to_string(),
            ocr_text: None,
            thumbnail: None,
        };
        let id = db.insert_item(&content, &["work".to_string()], now).unwrap();

        let item = db.fetch_item(id).unwrap().unwrap();
        assert_eq!(item.id, id);
        assert_eq!(item.content, content);
        assert_eq!(item.tags, vec!["work".to_string()]);
        assert!(!item.is_favorite);
        assert_eq!(item.timestamp.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn test_timestamp_format_orders_lexicographically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 9, 59, 59).unwrap();
        let late = early + chrono::Duration::milliseconds(1);
        assert!(format_db_timestamp(&early) < format_db_timestamp(&late));
        assert_eq!(
            parse_db_timestamp(&format_db_timestamp(&late)).unwrap().timestamp_micros(),
            late.timestamp_micros()
        );
    }

    #[test]
    fn test_most_recent_breaks_ties_by_id() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.insert_item(&text("first"), &[], now).unwrap();
        let second = db.insert_item(&text("second"), &[], now).unwrap();

        let recent = db.most_recent(ItemKind::Text, 1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, second);
    }

    #[test]
    fn test_duplicate_file_name_rejected_by_schema() {
        let db = Database::open_in_memory().unwrap();
        let content = ItemContent::Screenshot {
            file_path: "/a/screenshot_01.png".to_string(),
            file_name: "screenshot_01.png".to_string(),
            ocr_text: None,
            thumbnail: None,
        };
        db.insert_item(&content, &[], Utc::now()).unwrap();
        assert!(db.insert_item(&content, &[], Utc::now()).is_err());
        // The failed transaction must not leave an orphaned envelope row
        assert_eq!(db.count_items().unwrap(), 1);
    }

    #[test]
    fn test_apply_patch_keeps_unpatched_fields() {
        let db = Database::open_in_memory().unwrap();
        let content = ItemContent::Screenshot {
            file_path: "/a/screenshot_02.png".to_string(),
            file_name: "screenshot_02.png".to_string(),
            ocr_text: None,
            thumbnail: None,
        };
        let id = db.insert_item(&content, &[], Utc::now()).unwrap();

        db.apply_patch(id, &EnrichmentPatch { ocr_text: Some("hello".into()), ..Default::default() })
            .unwrap();
        db.apply_patch(id, &EnrichmentPatch { thumbnail: Some(vec![1, 2, 3]), ..Default::default() })
            .unwrap();

        match db.fetch_item(id).unwrap().unwrap().content {
            ItemContent::Screenshot { ocr_text, thumbnail, .. } => {
                assert_eq!(ocr_text.as_deref(), Some("hello"));
                assert_eq!(thumbnail, Some(vec![1, 2, 3]));
            }
            other => panic!("Expected Screenshot content, got {:?}", other),
        }
    }

    #[test]
    fn test_writes_against_missing_item_are_not_found() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_item(&text("gone"), &[], Utc::now()).unwrap();
        let item = db.fetch_item(id).unwrap().unwrap();
        assert!(db.delete_item(id).unwrap());
        assert!(!db.delete_item(id).unwrap());

        assert!(matches!(db.update_item(&item), Err(DatabaseError::NotFound(x)) if x == id));
        assert!(matches!(
            db.apply_patch(id, &EnrichmentPatch::default()),
            Err(DatabaseError::NotFound(_))
        ));
        assert!(matches!(db.set_favorite(id, true), Err(DatabaseError::NotFound(_))));
        assert!(db.fetch_item(id).unwrap().is_none());
    }

    #[test]
    fn test_clear_all_does_not_reuse_ids() {
        let db = Database::open_in_memory().unwrap();
        let first = db.insert_item(&text("a"), &[], Utc::now()).unwrap();
        db.clear_all().unwrap();
        assert_eq!(db.count_items().unwrap(), 0);

        let second = db.insert_item(&text("b"), &[], Utc::now()).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_find_by_field_created_since() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let old = db
            .insert_item(&text("old"), &[], now - chrono::Duration::seconds(30))
            .unwrap();
        let new = db.insert_item(&text("new"), &[], now).unwrap();

        let found = db
            .find_by_field(ItemKind::Text, &ItemFilter::CreatedSince(now - chrono::Duration::seconds(5)))
            .unwrap();
        let ids: Vec<ItemId> = found.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![new]);
        assert!(!ids.contains(&old));
    }

    #[test]
    fn test_fetch_items_filters_kind_and_favorites() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let t = db.insert_item(&text("a"), &[], now).unwrap();
        db.insert_item(
            &ItemContent::Code { code: "let x = 1;".into(), language: None },
            &[],
            now,
        )
        .unwrap();
        db.set_favorite(t, true).unwrap();

        let texts = db
            .fetch_items(&ItemQuery { kind: Some(ItemKind::Text), ..Default::default() }, true)
            .unwrap();
        assert_eq!(texts.len(), 1);

        let favorites = db
            .fetch_items(&ItemQuery { favorites_only: true, ..Default::default() }, true)
            .unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].id, t);

        let limited = db
            .fetch_items(&ItemQuery { limit: Some(1), ..Default::default() }, true)
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_unreadable_timestamp_skips_row() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let kept = db.insert_item(&text("kept"), &[], now).unwrap();
        let broken = db.insert_item(&text("broken"), &[], now).unwrap();
        db.get_conn()
            .unwrap()
            .execute("UPDATE items SET timestamp = 'not a time' WHERE id = ?1", [broken])
            .unwrap();

        assert!(db.fetch_item(broken).unwrap().is_none());
        let recent = db.most_recent(ItemKind::Text, 10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, kept);
        assert_eq!(recent[0].timestamp.timestamp_micros(), now.timestamp_micros());
    }
}
