use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use super::models::{Group, GroupId, GroupPatch, Item, ItemFields, ItemId, ItemPatch, Priority};
use super::store::{BoardStore, StoreOp};
use crate::errors::{StoreError, StoreResult};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Async-safe handle to the board database.
///
/// Every call runs on tokio's blocking pool so SQLite I/O never stalls the
/// thread that applies local mutations.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure against the database on a blocking thread.
    pub async fn call<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&BoardDb) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("database lock poisoned: {}", e)))?;
            f(&*guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("database task failed: {}", e)))?
    }
}

pub struct BoardDb {
    conn: Connection,
}

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> StoreResult<Self> {
        let db = Self {
            conn: Connection::open(path)?,
        };
        db.init()?;
        Ok(db)
    }

    /// In-memory database (for tests and dry runs).
    pub fn new_in_memory() -> StoreResult<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> StoreResult<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS groups (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                order_index INTEGER NOT NULL,
                accent_color TEXT
            );

            CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                group_id TEXT NOT NULL REFERENCES groups(id),
                position INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                priority TEXT,
                due_date TEXT,
                assignee TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                value INTEGER,
                related_name TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_items_group ON items(group_id, position);
            ",
        )?;
        Ok(())
    }

    // ── Groups ────────────────────────────────────────────────────────

    pub fn list_groups(&self) -> StoreResult<Vec<Group>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, order_index, accent_color FROM groups ORDER BY order_index, id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Group {
                id: GroupId::from(row.get::<_, String>(0)?),
                title: row.get(1)?,
                order_index: row.get(2)?,
                accent_color: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_group(&self, id: &GroupId) -> StoreResult<Option<Group>> {
        let group = self
            .conn
            .query_row(
                "SELECT id, title, order_index, accent_color FROM groups WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok(Group {
                        id: GroupId::from(row.get::<_, String>(0)?),
                        title: row.get(1)?,
                        order_index: row.get(2)?,
                        accent_color: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(group)
    }

    pub fn insert_group(&self, group: &Group) -> StoreResult<()> {
        self.conn
            .execute(
                "INSERT INTO groups (id, title, order_index, accent_color) VALUES (?1, ?2, ?3, ?4)",
                params![
                    group.id.as_str(),
                    group.title,
                    group.order_index,
                    group.accent_color
                ],
            )
            .map_err(|e| conflict_or(e, "group", group.id.as_str()))?;
        Ok(())
    }

    pub fn update_group(&self, id: &GroupId, patch: &GroupPatch) -> StoreResult<()> {
        let mut group = self.get_group(id)?.ok_or_else(|| not_found("group", id))?;
        patch.apply_to(&mut group);
        self.conn.execute(
            "UPDATE groups SET title = ?1, order_index = ?2, accent_color = ?3 WHERE id = ?4",
            params![group.title, group.order_index, group.accent_color, id.as_str()],
        )?;
        Ok(())
    }

    /// Fails with `Conflict` while the group still owns items.
    pub fn delete_group(&self, id: &GroupId) -> StoreResult<()> {
        let count = self
            .conn
            .execute("DELETE FROM groups WHERE id = ?1", params![id.as_str()])
            .map_err(|e| conflict_or(e, "group", id.as_str()))?;
        if count == 0 {
            return Err(not_found("group", id));
        }
        Ok(())
    }

    // ── Items ─────────────────────────────────────────────────────────

    pub fn list_items(&self) -> StoreResult<Vec<Item>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM items ORDER BY group_id, position, id",
            ITEM_COLUMNS
        ))?;
        let rows = stmt.query_map([], ItemRow::from_row)?;
        rows.map(|row| row?.into_item()).collect()
    }

    pub fn get_item(&self, id: &ItemId) -> StoreResult<Option<Item>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM items WHERE id = ?1", ITEM_COLUMNS),
                params![id.as_str()],
                ItemRow::from_row,
            )
            .optional()?;
        row.map(ItemRow::into_item).transpose()
    }

    pub fn insert_item(&self, item: &Item) -> StoreResult<()> {
        let fields = &item.fields;
        let tags = serde_json::to_string(&fields.tags)
            .map_err(|e| StoreError::Database(format!("failed to encode tags: {}", e)))?;
        self.conn
            .execute(
                "INSERT INTO items (id, group_id, position, title, description, priority,
                                    due_date, assignee, tags, value, related_name)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    item.id.as_str(),
                    item.group_id.as_str(),
                    item.position,
                    fields.title,
                    fields.description,
                    fields.priority.map(|p| p.as_str()),
                    fields.due_date.map(|d| d.format(DATE_FORMAT).to_string()),
                    fields.assignee,
                    tags,
                    fields.value,
                    fields.related_name,
                ],
            )
            .map_err(|e| conflict_or(e, "item", item.id.as_str()))?;
        Ok(())
    }

    /// Read-modify-write under the connection lock.
    pub fn update_item(&self, id: &ItemId, patch: &ItemPatch) -> StoreResult<()> {
        let mut item = self.get_item(id)?.ok_or_else(|| not_found("item", id))?;
        patch.apply_to(&mut item);
        let fields = &item.fields;
        let tags = serde_json::to_string(&fields.tags)
            .map_err(|e| StoreError::Database(format!("failed to encode tags: {}", e)))?;
        self.conn
            .execute(
                "UPDATE items SET group_id = ?1, position = ?2, title = ?3, description = ?4,
                        priority = ?5, due_date = ?6, assignee = ?7, tags = ?8, value = ?9,
                        related_name = ?10
                 WHERE id = ?11",
                params![
                    item.group_id.as_str(),
                    item.position,
                    fields.title,
                    fields.description,
                    fields.priority.map(|p| p.as_str()),
                    fields.due_date.map(|d| d.format(DATE_FORMAT).to_string()),
                    fields.assignee,
                    tags,
                    fields.value,
                    fields.related_name,
                    id.as_str(),
                ],
            )
            .map_err(|e| conflict_or(e, "item", id.as_str()))?;
        Ok(())
    }

    pub fn delete_item(&self, id: &ItemId) -> StoreResult<()> {
        let count = self
            .conn
            .execute("DELETE FROM items WHERE id = ?1", params![id.as_str()])?;
        if count == 0 {
            return Err(not_found("item", id));
        }
        Ok(())
    }

    // ── Batches ───────────────────────────────────────────────────────

    /// Apply a batch of writes in one transaction. Any failure rolls the
    /// whole batch back.
    pub fn apply_batch(&self, ops: &[StoreOp]) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for op in ops {
            match op {
                StoreOp::InsertGroup(group) => self.insert_group(group)?,
                StoreOp::UpdateGroup(id, patch) => self.update_group(id, patch)?,
                StoreOp::DeleteGroup(id) => self.delete_group(id)?,
                StoreOp::InsertItem(item) => self.insert_item(item)?,
                StoreOp::UpdateItem(id, patch) => self.update_item(id, patch)?,
                StoreOp::DeleteItem(id) => self.delete_item(id)?,
            }
        }
        tx.commit()?;
        Ok(())
    }
}

const ITEM_COLUMNS: &str = "id, group_id, position, title, description, priority, due_date, \
                            assignee, tags, value, related_name";

/// Raw column values; decoded outside the rusqlite row callback so decode
/// failures surface as `StoreError`.
struct ItemRow {
    id: String,
    group_id: String,
    position: u32,
    title: String,
    description: String,
    priority: Option<String>,
    due_date: Option<String>,
    assignee: Option<String>,
    tags: String,
    value: Option<i64>,
    related_name: Option<String>,
}

impl ItemRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            group_id: row.get(1)?,
            position: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            priority: row.get(5)?,
            due_date: row.get(6)?,
            assignee: row.get(7)?,
            tags: row.get(8)?,
            value: row.get(9)?,
            related_name: row.get(10)?,
        })
    }

    fn into_item(self) -> StoreResult<Item> {
        let priority = self
            .priority
            .map(|p| p.parse::<Priority>())
            .transpose()
            .map_err(StoreError::Database)?;
        let due_date = self
            .due_date
            .map(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT))
            .transpose()
            .map_err(|e| StoreError::Database(format!("invalid due date on item {}: {}", self.id, e)))?;
        let tags: Vec<String> = serde_json::from_str(&self.tags)
            .map_err(|e| StoreError::Database(format!("invalid tags on item {}: {}", self.id, e)))?;
        Ok(Item {
            id: ItemId::from(self.id),
            group_id: GroupId::from(self.group_id),
            position: self.position,
            fields: ItemFields {
                title: self.title,
                description: self.description,
                priority,
                due_date,
                assignee: self.assignee,
                tags,
                value: self.value,
                related_name: self.related_name,
            },
        })
    }
}

fn not_found(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

/// Constraint failures (duplicate key, dangling group reference) become
/// `Conflict`; anything else stays a database error.
fn conflict_or(err: rusqlite::Error, entity: &'static str, id: &str) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            StoreError::Conflict {
                entity,
                id: id.to_string(),
            }
        }
        _ => err.into(),
    }
}

/// Durable `BoardStore` on SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    db: DbHandle,
}

impl SqliteStore {
    pub fn new(db: BoardDb) -> Self {
        Self {
            db: DbHandle::new(db),
        }
    }

    pub fn open(path: &Path) -> StoreResult<Self> {
        Ok(Self::new(BoardDb::new(path)?))
    }

    pub fn in_memory() -> StoreResult<Self> {
        Ok(Self::new(BoardDb::new_in_memory()?))
    }
}

#[async_trait]
impl BoardStore for SqliteStore {
    async fn list_groups(&self) -> StoreResult<Vec<Group>> {
        self.db.call(|db| db.list_groups()).await
    }

    async fn list_items(&self) -> StoreResult<Vec<Item>> {
        self.db.call(|db| db.list_items()).await
    }

    async fn insert_group(&self, group: &Group) -> StoreResult<Group> {
        let group = group.clone();
        self.db
            .call(move |db| {
                db.insert_group(&group)?;
                Ok(group)
            })
            .await
    }

    async fn update_group(&self, id: &GroupId, patch: &GroupPatch) -> StoreResult<()> {
        let (id, patch) = (id.clone(), patch.clone());
        self.db.call(move |db| db.update_group(&id, &patch)).await
    }

    async fn delete_group(&self, id: &GroupId) -> StoreResult<()> {
        let id = id.clone();
        self.db.call(move |db| db.delete_group(&id)).await
    }

    async fn insert_item(&self, item: &Item) -> StoreResult<Item> {
        let item = item.clone();
        self.db
            .call(move |db| {
                db.insert_item(&item)?;
                Ok(item)
            })
            .await
    }

    async fn update_item(&self, id: &ItemId, patch: &ItemPatch) -> StoreResult<()> {
        let (id, patch) = (id.clone(), patch.clone());
        self.db.call(move |db| db.update_item(&id, &patch)).await
    }

    async fn delete_item(&self, id: &ItemId) -> StoreResult<()> {
        let id = id.clone();
        self.db.call(move |db| db.delete_item(&id)).await
    }

    async fn apply_all(&self, ops: &[StoreOp]) -> StoreResult<()> {
        let ops = ops.to_vec();
        self.db.call(move |db| db.apply_batch(&ops)).await
    }
}
