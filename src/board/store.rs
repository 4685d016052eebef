//! Remote store contract and an in-memory implementation.
//!
//! The engine reaches the durable owner of record only through
//! [`BoardStore`]. Every call resolves independently; the sync engine never
//! assumes calls complete in the order they were issued.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;

use super::models::{Group, GroupId, GroupPatch, Item, ItemId, ItemPatch};
use crate::errors::{StoreError, StoreResult};

/// Async item/group store.
#[async_trait]
pub trait BoardStore: Send + Sync {
    async fn list_groups(&self) -> StoreResult<Vec<Group>>;

    async fn list_items(&self) -> StoreResult<Vec<Item>>;

    async fn insert_group(&self, group: &Group) -> StoreResult<Group>;

    async fn update_group(&self, id: &GroupId, patch: &GroupPatch) -> StoreResult<()>;

    async fn delete_group(&self, id: &GroupId) -> StoreResult<()>;

    async fn insert_item(&self, item: &Item) -> StoreResult<Item>;

    async fn update_item(&self, id: &ItemId, patch: &ItemPatch) -> StoreResult<()>;

    async fn delete_item(&self, id: &ItemId) -> StoreResult<()>;

    /// Apply one operation's writes in order, stopping at the first failure.
    ///
    /// Stores that can make the batch atomic override this so a failure
    /// leaves none of the writes behind.
    async fn apply_all(&self, ops: &[StoreOp]) -> StoreResult<()> {
        for op in ops {
            match op {
                StoreOp::InsertGroup(group) => {
                    self.insert_group(group).await?;
                }
                StoreOp::UpdateGroup(id, patch) => self.update_group(id, patch).await?,
                StoreOp::DeleteGroup(id) => self.delete_group(id).await?,
                StoreOp::InsertItem(item) => {
                    self.insert_item(item).await?;
                }
                StoreOp::UpdateItem(id, patch) => self.update_item(id, patch).await?,
                StoreOp::DeleteItem(id) => self.delete_item(id).await?,
            }
        }
        Ok(())
    }
}

/// One store call, owned so it can move into a write task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    InsertGroup(Group),
    UpdateGroup(GroupId, GroupPatch),
    DeleteGroup(GroupId),
    InsertItem(Item),
    UpdateItem(ItemId, ItemPatch),
    DeleteItem(ItemId),
}

/// A write the store accepted, in acceptance order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    InsertGroup(GroupId),
    UpdateGroup(GroupId, GroupPatch),
    DeleteGroup(GroupId),
    InsertItem(ItemId),
    UpdateItem(ItemId, ItemPatch),
    DeleteItem(ItemId),
}

#[derive(Debug, Default)]
struct MemoryData {
    groups: BTreeMap<GroupId, Group>,
    items: BTreeMap<ItemId, Item>,
    writes: Vec<StoreWrite>,
}

#[derive(Debug, Default)]
struct Faults {
    all: Option<StoreError>,
    groups: HashMap<GroupId, StoreError>,
    items: HashMap<ItemId, StoreError>,
}

/// In-process store with failure injection and a pause gate.
///
/// While paused, every write waits at the gate, which lets callers hold
/// remote confirmations in flight and release them in any order.
pub struct MemoryStore {
    data: Mutex<MemoryData>,
    faults: Mutex<Faults>,
    gate: watch::Sender<bool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            data: Mutex::new(MemoryData::default()),
            faults: Mutex::new(Faults::default()),
            gate,
        }
    }

    pub fn with_records(groups: Vec<Group>, items: Vec<Item>) -> Self {
        let store = Self::new();
        if let Ok(mut data) = store.data.lock() {
            data.groups = groups.into_iter().map(|g| (g.id.clone(), g)).collect();
            data.items = items.into_iter().map(|i| (i.id.clone(), i)).collect();
        }
        store
    }

    /// Hold all subsequent writes until [`Self::resume`].
    pub fn pause(&self) {
        self.gate.send_replace(false);
    }

    pub fn resume(&self) {
        self.gate.send_replace(true);
    }

    /// Fail every write with `err` until cleared.
    pub fn fail_all(&self, err: StoreError) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.all = Some(err);
        }
    }

    /// Fail writes that touch this item.
    pub fn fail_item(&self, id: &ItemId, err: StoreError) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.items.insert(id.clone(), err);
        }
    }

    /// Fail writes that touch this group.
    pub fn fail_group(&self, id: &GroupId, err: StoreError) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.groups.insert(id.clone(), err);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            *faults = Faults::default();
        }
    }

    /// Accepted writes, oldest first.
    pub fn writes(&self) -> Vec<StoreWrite> {
        self.data
            .lock()
            .map(|data| data.writes.clone())
            .unwrap_or_default()
    }

    pub fn stored_groups(&self) -> Vec<Group> {
        self.data
            .lock()
            .map(|data| data.groups.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn stored_items(&self) -> Vec<Item> {
        self.data
            .lock()
            .map(|data| data.items.values().cloned().collect())
            .unwrap_or_default()
    }

    async fn pass_gate(&self) {
        let mut rx = self.gate.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }

    fn check_fault(&self, group: Option<&GroupId>, item: Option<&ItemId>) -> StoreResult<()> {
        let faults = self.faults.lock().map_err(|_| poisoned())?;
        if let Some(err) = &faults.all {
            return Err(err.clone());
        }
        if let Some(err) = group.and_then(|id| faults.groups.get(id)) {
            return Err(err.clone());
        }
        if let Some(err) = item.and_then(|id| faults.items.get(id)) {
            return Err(err.clone());
        }
        Ok(())
    }

    fn with_data<R>(&self, f: impl FnOnce(&mut MemoryData) -> StoreResult<R>) -> StoreResult<R> {
        let mut data = self.data.lock().map_err(|_| poisoned())?;
        f(&mut data)
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".to_string())
}

fn not_found(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

#[async_trait]
impl BoardStore for MemoryStore {
    async fn list_groups(&self) -> StoreResult<Vec<Group>> {
        self.check_fault(None, None)?;
        self.with_data(|data| Ok(data.groups.values().cloned().collect()))
    }

    async fn list_items(&self) -> StoreResult<Vec<Item>> {
        self.check_fault(None, None)?;
        self.with_data(|data| Ok(data.items.values().cloned().collect()))
    }

    async fn insert_group(&self, group: &Group) -> StoreResult<Group> {
        self.pass_gate().await;
        self.check_fault(Some(&group.id), None)?;
        self.with_data(|data| {
            if data.groups.contains_key(&group.id) {
                return Err(StoreError::Conflict {
                    entity: "group",
                    id: group.id.to_string(),
                });
            }
            data.groups.insert(group.id.clone(), group.clone());
            data.writes.push(StoreWrite::InsertGroup(group.id.clone()));
            Ok(group.clone())
        })
    }

    async fn update_group(&self, id: &GroupId, patch: &GroupPatch) -> StoreResult<()> {
        self.pass_gate().await;
        self.check_fault(Some(id), None)?;
        self.with_data(|data| {
            let group = data.groups.get_mut(id).ok_or_else(|| not_found("group", id))?;
            patch.apply_to(group);
            data.writes
                .push(StoreWrite::UpdateGroup(id.clone(), patch.clone()));
            Ok(())
        })
    }

    async fn delete_group(&self, id: &GroupId) -> StoreResult<()> {
        self.pass_gate().await;
        self.check_fault(Some(id), None)?;
        self.with_data(|data| {
            data.groups.remove(id).ok_or_else(|| not_found("group", id))?;
            data.writes.push(StoreWrite::DeleteGroup(id.clone()));
            Ok(())
        })
    }

    async fn insert_item(&self, item: &Item) -> StoreResult<Item> {
        self.pass_gate().await;
        self.check_fault(Some(&item.group_id), Some(&item.id))?;
        self.with_data(|data| {
            if data.items.contains_key(&item.id) {
                return Err(StoreError::Conflict {
                    entity: "item",
                    id: item.id.to_string(),
                });
            }
            data.items.insert(item.id.clone(), item.clone());
            data.writes.push(StoreWrite::InsertItem(item.id.clone()));
            Ok(item.clone())
        })
    }

    async fn update_item(&self, id: &ItemId, patch: &ItemPatch) -> StoreResult<()> {
        self.pass_gate().await;
        self.check_fault(patch.group_id.as_ref(), Some(id))?;
        self.with_data(|data| {
            let item = data.items.get_mut(id).ok_or_else(|| not_found("item", id))?;
            patch.apply_to(item);
            data.writes
                .push(StoreWrite::UpdateItem(id.clone(), patch.clone()));
            Ok(())
        })
    }

    async fn delete_item(&self, id: &ItemId) -> StoreResult<()> {
        self.pass_gate().await;
        self.check_fault(None, Some(id))?;
        self.with_data(|data| {
            data.items.remove(id).ok_or_else(|| not_found("item", id))?;
            data.writes.push(StoreWrite::DeleteItem(id.clone()));
            Ok(())
        })
    }
}
