//! Optimistic sync engine.
//!
//! Every mutation follows the same protocol:
//! 1. snapshot the entities it touches
//! 2. apply the change to local state synchronously
//! 3. issue the store writes on a spawned task
//! 4. on success, do nothing more
//! 5. on failure, restore the snapshot and emit `WriteRolledBack`
//!
//! Local application is serialised by the state mutex. Store confirmations
//! race freely; each carries its own snapshot. Two in-flight operations on
//! the same entity are not isolated from each other: a late rollback
//! restores its snapshot over the newer change and logs a warning.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::events::{BoardEvent, OpKind, broadcast_event};
use super::models::{Group, GroupId, GroupPatch, Item, ItemFields, ItemId, ItemPatch, NewGroup};
use super::planner::{MovePlan, Placement};
use super::state::{BoardState, Snapshot};
use super::store::{BoardStore, StoreOp};
use crate::errors::{BoardError, BoardResult, StoreError, StoreResult};

/// Board state shared between the controller and in-flight writes.
pub type SharedState = Arc<Mutex<BoardState>>;

/// Suffix appended to a duplicated item's title.
pub const COPY_SUFFIX: &str = " (copy)";

/// How a remote write ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Confirmed,
    RolledBack(StoreError),
    /// The write task panicked or was aborted; local state was left as is.
    Aborted(String),
}

impl SyncOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

/// Handle to an operation's remote confirmation.
///
/// Dropping it does not cancel the write.
#[derive(Debug)]
pub struct PendingWrite {
    op_id: u64,
    op: OpKind,
    handle: Option<JoinHandle<SyncOutcome>>,
}

impl PendingWrite {
    fn ready(op_id: u64, op: OpKind) -> Self {
        Self {
            op_id,
            op,
            handle: None,
        }
    }

    pub fn op_id(&self) -> u64 {
        self.op_id
    }

    pub fn op(&self) -> OpKind {
        self.op
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Wait for the store to answer (and for any rollback to finish).
    pub async fn settled(self) -> SyncOutcome {
        match self.handle {
            None => SyncOutcome::Confirmed,
            Some(handle) => match handle.await {
                Ok(outcome) => outcome,
                Err(err) => SyncOutcome::Aborted(err.to_string()),
            },
        }
    }
}

/// What a local apply step produced.
struct Mutation<R> {
    value: R,
    snapshot: Snapshot,
    writes: Vec<StoreOp>,
    events: Vec<BoardEvent>,
    /// Items whose group and position must satisfy the invariants now.
    touched: Vec<ItemId>,
}

pub struct SyncEngine {
    state: SharedState,
    store: Arc<dyn BoardStore>,
    events: broadcast::Sender<BoardEvent>,
    next_op: AtomicU64,
}

impl SyncEngine {
    pub fn new(
        state: SharedState,
        store: Arc<dyn BoardStore>,
        events: broadcast::Sender<BoardEvent>,
    ) -> Self {
        Self {
            state,
            store,
            events,
            next_op: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> BoardResult<MutexGuard<'_, BoardState>> {
        self.state.lock().map_err(|_| BoardError::LockPoisoned)
    }

    // ── Operations ────────────────────────────────────────────────────

    /// Apply a planned move. `NoOp` plans settle immediately.
    pub fn commit(&self, plan: &MovePlan) -> BoardResult<PendingWrite> {
        match plan {
            MovePlan::NoOp { .. } => Ok(PendingWrite::ready(self.allocate_op(), OpKind::MoveItem)),
            MovePlan::TargetGone { item_id, .. } => Err(BoardError::InvalidPlan(format!(
                "drop target for item {} no longer exists",
                item_id
            ))),
            MovePlan::Move {
                item_id,
                from_group,
                to_group,
                position,
                placements,
            } => self
                .mutate(OpKind::MoveItem, |state| {
                    validate_move(state, item_id, from_group, to_group, placements)?;

                    let snapshot = state.snapshot(
                        [],
                        placements.iter().map(|p| p.item_id.clone()),
                    );
                    let mut writes = Vec::new();
                    for placement in placements {
                        let Some(item) = state.item_mut(&placement.item_id) else {
                            continue;
                        };
                        let group_changed = item.group_id != placement.group_id;
                        if !group_changed && item.position == placement.position {
                            continue;
                        }
                        item.group_id = placement.group_id.clone();
                        item.position = placement.position;
                        let patch = if group_changed {
                            ItemPatch::placement(placement.group_id.clone(), placement.position)
                        } else {
                            ItemPatch::position(placement.position)
                        };
                        writes.push(StoreOp::UpdateItem(placement.item_id.clone(), patch));
                    }

                    Ok(Mutation {
                        value: (),
                        snapshot,
                        writes,
                        events: vec![BoardEvent::ItemMoved {
                            item_id: item_id.clone(),
                            from_group: from_group.clone(),
                            to_group: to_group.clone(),
                            position: *position,
                        }],
                        touched: placements.iter().map(|p| p.item_id.clone()).collect(),
                    })
                })
                .map(|((), pending)| pending),
        }
    }

    /// Append a new item to the end of `group_id`.
    pub fn create_item(
        &self,
        group_id: &GroupId,
        fields: ItemFields,
    ) -> BoardResult<(ItemId, PendingWrite)> {
        validate_title(&fields.title)?;
        self.mutate(OpKind::CreateItem, |state| {
            if !state.contains_group(group_id) {
                return Err(BoardError::GroupNotFound {
                    id: group_id.clone(),
                });
            }
            let item = Item {
                id: ItemId::generate(),
                group_id: group_id.clone(),
                position: state.count_items_in(group_id),
                fields,
            };
            Ok(insert_item_mutation(state, item))
        })
    }

    /// Copy an item into a new item appended to the same group.
    pub fn duplicate_item(&self, item_id: &ItemId) -> BoardResult<(ItemId, PendingWrite)> {
        self.mutate(OpKind::DuplicateItem, |state| {
            let source = state
                .item(item_id)
                .ok_or_else(|| BoardError::ItemNotFound { id: item_id.clone() })?;
            let mut fields = source.fields.clone();
            fields.title.push_str(COPY_SUFFIX);
            let group_id = source.group_id.clone();
            let item = Item {
                id: ItemId::generate(),
                position: state.count_items_in(&group_id),
                group_id,
                fields,
            };
            Ok(insert_item_mutation(state, item))
        })
    }

    /// Replace an item's domain fields. Group and position are untouched.
    pub fn update_item(&self, item_id: &ItemId, fields: ItemFields) -> BoardResult<PendingWrite> {
        validate_title(&fields.title)?;
        self.mutate(OpKind::UpdateItem, |state| {
            let snapshot = state.snapshot([], [item_id.clone()]);
            let item = state
                .item_mut(item_id)
                .ok_or_else(|| BoardError::ItemNotFound { id: item_id.clone() })?;
            item.fields = fields.clone();
            let updated = item.clone();
            Ok(Mutation {
                value: (),
                snapshot,
                writes: vec![StoreOp::UpdateItem(
                    item_id.clone(),
                    ItemPatch::fields(fields),
                )],
                events: vec![BoardEvent::ItemUpdated { item: updated }],
                touched: vec![item_id.clone()],
            })
        })
        .map(|((), pending)| pending)
    }

    /// Remove an item and close the gap it leaves in its group.
    pub fn delete_item(&self, item_id: &ItemId) -> BoardResult<PendingWrite> {
        self.mutate(OpKind::DeleteItem, |state| {
            let group_id = state
                .item(item_id)
                .map(|item| item.group_id.clone())
                .ok_or_else(|| BoardError::ItemNotFound { id: item_id.clone() })?;
            let siblings: Vec<ItemId> = state
                .items_in(&group_id)
                .iter()
                .map(|i| i.id.clone())
                .collect();
            let snapshot = state.snapshot([], siblings);

            state.take_item(item_id);
            let renumbered = state.renumber_group(&group_id);

            let mut writes = vec![StoreOp::DeleteItem(item_id.clone())];
            writes.extend(
                renumbered
                    .iter()
                    .map(|(id, pos)| StoreOp::UpdateItem(id.clone(), ItemPatch::position(*pos))),
            );
            Ok(Mutation {
                value: (),
                snapshot,
                writes,
                events: vec![BoardEvent::ItemDeleted {
                    item_id: item_id.clone(),
                }],
                touched: renumbered.into_iter().map(|(id, _)| id).collect(),
            })
        })
        .map(|((), pending)| pending)
    }

    /// Append a group at the right end of the board.
    pub fn create_group(&self, payload: NewGroup) -> BoardResult<(GroupId, PendingWrite)> {
        validate_title(&payload.title)?;
        self.mutate(OpKind::CreateGroup, |state| {
            let group = Group {
                id: GroupId::generate(),
                title: payload.title,
                order_index: state.next_order_index(),
                accent_color: payload.accent_color,
            };
            let snapshot = state.snapshot([group.id.clone()], []);
            state.put_group(group.clone());
            Ok(Mutation {
                value: group.id.clone(),
                snapshot,
                writes: vec![StoreOp::InsertGroup(group.clone())],
                events: vec![BoardEvent::GroupCreated { group }],
                touched: Vec::new(),
            })
        })
    }

    /// Rename or recolour a group.
    pub fn update_group(&self, group_id: &GroupId, patch: GroupPatch) -> BoardResult<PendingWrite> {
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }
        self.mutate(OpKind::UpdateGroup, |state| {
            if let Some(order_index) = patch.order_index
                && state
                    .groups_ordered()
                    .iter()
                    .any(|g| &g.id != group_id && g.order_index == order_index)
            {
                return Err(BoardError::InvalidPlan(format!(
                    "order index {} is taken",
                    order_index
                )));
            }
            let snapshot = state.snapshot([group_id.clone()], []);
            let group = state.group_mut(group_id).ok_or_else(|| BoardError::GroupNotFound {
                id: group_id.clone(),
            })?;
            patch.apply_to(group);
            let updated = group.clone();
            Ok(Mutation {
                value: (),
                snapshot,
                writes: vec![StoreOp::UpdateGroup(group_id.clone(), patch.clone())],
                events: vec![BoardEvent::GroupUpdated { group: updated }],
                touched: Vec::new(),
            })
        })
        .map(|((), pending)| pending)
    }

    /// Delete a group and every item it owns.
    ///
    /// Items leave local state before the group so no item is ever seen
    /// pointing at a missing group; the store receives the item deletes
    /// first for the same reason.
    pub fn delete_group(&self, group_id: &GroupId) -> BoardResult<PendingWrite> {
        self.mutate(OpKind::DeleteGroup, |state| {
            if !state.contains_group(group_id) {
                return Err(BoardError::GroupNotFound {
                    id: group_id.clone(),
                });
            }
            let members: Vec<ItemId> = state
                .items_in(group_id)
                .iter()
                .map(|i| i.id.clone())
                .collect();
            let snapshot = state.snapshot([group_id.clone()], members.clone());

            for id in &members {
                state.take_item(id);
            }
            state.take_group(group_id);

            let mut writes: Vec<StoreOp> =
                members.iter().cloned().map(StoreOp::DeleteItem).collect();
            writes.push(StoreOp::DeleteGroup(group_id.clone()));
            Ok(Mutation {
                value: (),
                snapshot,
                writes,
                events: vec![BoardEvent::GroupDeleted {
                    group_id: group_id.clone(),
                    item_ids: members,
                }],
                touched: Vec::new(),
            })
        })
        .map(|((), pending)| pending)
    }

    // ── Protocol ──────────────────────────────────────────────────────

    fn allocate_op(&self) -> u64 {
        self.next_op.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Run steps 1-2 under the state lock, then hand steps 3-5 to a task.
    fn mutate<R>(
        &self,
        op: OpKind,
        apply: impl FnOnce(&mut BoardState) -> BoardResult<Mutation<R>>,
    ) -> BoardResult<(R, PendingWrite)> {
        let runtime = Handle::try_current().map_err(|_| BoardError::NoRuntime)?;

        let (mutation, applied) = {
            let mut state = self.lock()?;
            let mutation = apply(&mut state)?;
            for id in &mutation.touched {
                state.assert_single_ownership(id);
                if let Some(item) = state.item(id) {
                    state.assert_unique_position(&item.group_id, item.position);
                }
            }
            let applied = mutation.snapshot.recapture(&state);
            (mutation, applied)
        };

        let op_id = self.allocate_op();
        tracing::debug!(op_id, op = op.as_str(), writes = mutation.writes.len(), "applied locally");
        for event in mutation.events {
            broadcast_event(&self.events, event);
        }

        let pending = if mutation.writes.is_empty() {
            PendingWrite::ready(op_id, op)
        } else {
            let task = WriteTask {
                op_id,
                op,
                state: self.state.clone(),
                store: self.store.clone(),
                events: self.events.clone(),
                snapshot: mutation.snapshot,
                applied,
                writes: mutation.writes,
            };
            PendingWrite {
                op_id,
                op,
                handle: Some(runtime.spawn(task.run())),
            }
        };
        Ok((mutation.value, pending))
    }
}

/// Steps 3-5 for one operation.
struct WriteTask {
    op_id: u64,
    op: OpKind,
    state: SharedState,
    store: Arc<dyn BoardStore>,
    events: broadcast::Sender<BoardEvent>,
    snapshot: Snapshot,
    /// The touched entities as this operation left them.
    applied: Snapshot,
    writes: Vec<StoreOp>,
}

impl WriteTask {
    async fn run(self) -> SyncOutcome {
        if let Err(err) = self.store.apply_all(&self.writes).await {
            self.roll_back(&err);
            return SyncOutcome::RolledBack(err);
        }
        tracing::debug!(op_id = self.op_id, op = self.op.as_str(), "store confirmed");
        broadcast_event(
            &self.events,
            BoardEvent::WriteConfirmed {
                op_id: self.op_id,
                op: self.op,
            },
        );
        SyncOutcome::Confirmed
    }

    fn roll_back(&self, err: &StoreError) {
        let overwritten = match self.state.lock() {
            Ok(mut state) => {
                let current = self.applied.recapture(&state);
                let mut overwritten = self.applied.diverging_entities(&current);
                let report = self.snapshot.restore(&mut state);
                if !report.is_exact() {
                    tracing::warn!(
                        op_id = self.op_id,
                        kept = ?report.kept,
                        dropped = ?report.dropped,
                        renumbered = ?report.renumbered,
                        "rollback could not restore every entity verbatim"
                    );
                    overwritten.extend(report.describe());
                }
                if !overwritten.is_empty() {
                    tracing::warn!(
                        op_id = self.op_id,
                        entities = ?overwritten,
                        "rollback overwrites newer local changes"
                    );
                }
                overwritten
            }
            Err(_) => {
                tracing::error!(op_id = self.op_id, "board state lock poisoned, rollback skipped");
                return;
            }
        };
        tracing::warn!(
            op_id = self.op_id,
            op = self.op.as_str(),
            error = %err,
            "store rejected write, local change rolled back"
        );
        broadcast_event(
            &self.events,
            BoardEvent::WriteRolledBack {
                op_id: self.op_id,
                op: self.op,
                error: err.to_string(),
                overwritten,
            },
        );
    }
}

fn validate_title(title: &str) -> BoardResult<()> {
    if title.trim().is_empty() {
        return Err(BoardError::InvalidTitle);
    }
    Ok(())
}

fn insert_item_mutation(state: &mut BoardState, item: Item) -> Mutation<ItemId> {
    let snapshot = state.snapshot([], [item.id.clone()]);
    state.put_item(item.clone());
    Mutation {
        value: item.id.clone(),
        snapshot,
        writes: vec![StoreOp::InsertItem(item.clone())],
        touched: vec![item.id.clone()],
        events: vec![BoardEvent::ItemCreated { item }],
    }
}

/// Reject plans that no longer match the board: the groups must exist and
/// the placements must cover exactly the items those groups will hold.
fn validate_move(
    state: &BoardState,
    item_id: &ItemId,
    from_group: &GroupId,
    to_group: &GroupId,
    placements: &[Placement],
) -> BoardResult<()> {
    let item = state
        .item(item_id)
        .ok_or_else(|| BoardError::ItemNotFound { id: item_id.clone() })?;
    if &item.group_id != from_group {
        return Err(BoardError::InvalidPlan(format!(
            "item {} is no longer in group {}",
            item_id, from_group
        )));
    }
    if !state.contains_group(to_group) {
        return Err(BoardError::GroupNotFound {
            id: to_group.clone(),
        });
    }

    let mut current: HashSet<&ItemId> =
        state.items_in(to_group).into_iter().map(|i| &i.id).collect();
    current.extend(state.items_in(from_group).into_iter().map(|i| &i.id));
    let planned: HashSet<&ItemId> = placements.iter().map(|p| &p.item_id).collect();
    if current != planned || planned.len() != placements.len() {
        return Err(BoardError::InvalidPlan(
            "plan is stale: group membership changed since planning".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::planner::{DropTarget, plan_move};
    use crate::board::state::tests::sample_state;
    use crate::board::store::{MemoryStore, StoreWrite};

    fn engine_with(store: Arc<MemoryStore>) -> SyncEngine {
        let state = Arc::new(Mutex::new(sample_state()));
        let (tx, _) = broadcast::channel(64);
        SyncEngine::new(state, store, tx)
    }

    fn seeded_store() -> Arc<MemoryStore> {
        let state = sample_state();
        Arc::new(MemoryStore::with_records(
            state.groups_ordered().into_iter().cloned().collect(),
            state.items_ordered().into_iter().cloned().collect(),
        ))
    }

    fn read(engine: &SyncEngine) -> BoardState {
        engine.state().lock().unwrap().clone()
    }

    #[tokio::test]
    async fn commit_applies_before_store_answers() {
        let store = seeded_store();
        store.pause();
        let engine = engine_with(store.clone());
        let plan = plan_move(&read(&engine), &ItemId::from("a1"), &DropTarget::item("b1")).unwrap();

        let pending = engine.commit(&plan).unwrap();
        let now = read(&engine);
        assert_eq!(now.item(&ItemId::from("a1")).unwrap().group_id.as_str(), "b");
        assert!(store.writes().is_empty());

        store.resume();
        assert_eq!(pending.settled().await, SyncOutcome::Confirmed);
        assert_eq!(store.writes().len(), 3);
    }

    #[tokio::test]
    async fn failed_commit_restores_snapshot() {
        let store = seeded_store();
        store.fail_item(&ItemId::from("b1"), StoreError::Unavailable("offline".into()));
        let engine = engine_with(store.clone());
        let before = read(&engine);
        let mut events = engine.subscribe();

        let plan = plan_move(&before, &ItemId::from("a1"), &DropTarget::item("b1")).unwrap();
        let outcome = engine.commit(&plan).unwrap().settled().await;

        assert!(matches!(outcome, SyncOutcome::RolledBack(StoreError::Unavailable(_))));
        assert_eq!(read(&engine), before);

        assert!(matches!(events.recv().await.unwrap(), BoardEvent::ItemMoved { .. }));
        let rolled = events.recv().await.unwrap();
        assert!(rolled.notification().is_some());
    }

    #[tokio::test]
    async fn noop_plan_settles_without_writes() {
        let store = seeded_store();
        let engine = engine_with(store.clone());
        let plan = plan_move(&read(&engine), &ItemId::from("a1"), &DropTarget::item("a1")).unwrap();
        let pending = engine.commit(&plan).unwrap();
        assert!(pending.is_finished());
        assert!(pending.settled().await.is_confirmed());
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn target_gone_plan_is_rejected_without_change() {
        let engine = engine_with(seeded_store());
        let before = read(&engine);
        let plan = plan_move(&before, &ItemId::from("a1"), &DropTarget::group("gone")).unwrap();
        assert!(matches!(engine.commit(&plan), Err(BoardError::InvalidPlan(_))));
        assert_eq!(read(&engine), before);
    }

    #[tokio::test]
    async fn stale_plan_is_rejected() {
        let engine = engine_with(seeded_store());
        let plan = plan_move(&read(&engine), &ItemId::from("a1"), &DropTarget::item("b1")).unwrap();
        let (_, pending) = engine
            .create_item(&GroupId::from("b"), ItemFields::titled("late arrival"))
            .unwrap();
        pending.settled().await;
        assert!(matches!(engine.commit(&plan), Err(BoardError::InvalidPlan(_))));
    }

    #[tokio::test]
    async fn create_item_appends_and_inserts_remotely() {
        let store = seeded_store();
        let engine = engine_with(store.clone());
        let (id, pending) = engine
            .create_item(&GroupId::from("a"), ItemFields::titled("Kickoff call"))
            .unwrap();
        assert_eq!(read(&engine).item(&id).unwrap().position, 2);
        assert!(pending.settled().await.is_confirmed());
        assert_eq!(store.writes(), vec![StoreWrite::InsertItem(id)]);
    }

    #[tokio::test]
    async fn create_item_validates_before_mutating() {
        let engine = engine_with(seeded_store());
        let before = read(&engine);
        assert!(matches!(
            engine.create_item(&GroupId::from("a"), ItemFields::titled("  ")),
            Err(BoardError::InvalidTitle)
        ));
        assert!(matches!(
            engine.create_item(&GroupId::from("zz"), ItemFields::titled("x")),
            Err(BoardError::GroupNotFound { .. })
        ));
        assert_eq!(read(&engine), before);
    }

    #[tokio::test]
    async fn failed_create_removes_the_item_again() {
        let store = seeded_store();
        store.fail_all(StoreError::Rejected("quota".into()));
        let engine = engine_with(store);
        let before = read(&engine);
        let (_, pending) = engine
            .create_item(&GroupId::from("a"), ItemFields::titled("x"))
            .unwrap();
        assert!(!pending.settled().await.is_confirmed());
        assert_eq!(read(&engine), before);
    }

    #[tokio::test]
    async fn delete_item_renumbers_siblings() {
        let store = seeded_store();
        let engine = engine_with(store.clone());
        engine.delete_item(&ItemId::from("a1")).unwrap().settled().await;

        let state = read(&engine);
        assert_eq!(state.item(&ItemId::from("a2")).unwrap().position, 0);
        assert_eq!(
            store.writes(),
            vec![
                StoreWrite::DeleteItem(ItemId::from("a1")),
                StoreWrite::UpdateItem(ItemId::from("a2"), ItemPatch::position(0)),
            ]
        );
    }

    #[tokio::test]
    async fn delete_group_removes_items_first() {
        let store = seeded_store();
        let engine = engine_with(store.clone());
        engine.delete_group(&GroupId::from("a")).unwrap().settled().await;

        let state = read(&engine);
        assert_eq!(state.group_count(), 1);
        assert!(state.items_ordered().iter().all(|i| i.group_id.as_str() == "b"));
        assert_eq!(
            store.writes(),
            vec![
                StoreWrite::DeleteItem(ItemId::from("a1")),
                StoreWrite::DeleteItem(ItemId::from("a2")),
                StoreWrite::DeleteGroup(GroupId::from("a")),
            ]
        );
    }

    #[tokio::test]
    async fn failed_group_delete_restores_group_and_items() {
        let store = seeded_store();
        store.fail_group(&GroupId::from("a"), StoreError::Conflict {
            entity: "group",
            id: "a".into(),
        });
        let engine = engine_with(store);
        let before = read(&engine);
        let outcome = engine.delete_group(&GroupId::from("a")).unwrap().settled().await;
        assert!(matches!(outcome, SyncOutcome::RolledBack(StoreError::Conflict { .. })));
        assert_eq!(read(&engine), before);
    }

    #[tokio::test]
    async fn duplicate_copies_fields_with_marker() {
        let store = seeded_store();
        let engine = engine_with(store);
        let (copy_id, pending) = engine.duplicate_item(&ItemId::from("a1")).unwrap();
        pending.settled().await;
        let state = read(&engine);
        let copy = state.item(&copy_id).unwrap();
        assert_eq!(copy.title(), "a1 (copy)");
        assert_eq!(copy.group_id.as_str(), "a");
        assert_eq!(copy.position, 2);
    }

    #[tokio::test]
    async fn create_group_appends_at_end() {
        let engine = engine_with(seeded_store());
        let (id, pending) = engine
            .create_group(NewGroup {
                title: "Won".into(),
                accent_color: Some("#22c55e".into()),
            })
            .unwrap();
        pending.settled().await;
        assert_eq!(read(&engine).group(&id).unwrap().order_index, 2);
    }

    #[tokio::test]
    async fn update_group_rejects_taken_order_index() {
        let engine = engine_with(seeded_store());
        let patch = GroupPatch {
            order_index: Some(1),
            ..GroupPatch::default()
        };
        assert!(matches!(
            engine.update_group(&GroupId::from("a"), patch),
            Err(BoardError::InvalidPlan(_))
        ));
    }

    #[tokio::test]
    async fn out_of_order_completions_roll_back_independently() {
        let store = seeded_store();
        store.pause();
        store.fail_item(&ItemId::from("b1"), StoreError::Unavailable("offline".into()));
        let engine = engine_with(store.clone());

        let edit = engine
            .update_item(&ItemId::from("b1"), ItemFields::titled("renamed"))
            .unwrap();
        let (_, create) = engine
            .create_item(&GroupId::from("a"), ItemFields::titled("new"))
            .unwrap();

        store.resume();
        assert!(create.settled().await.is_confirmed());
        assert!(!edit.settled().await.is_confirmed());

        let state = read(&engine);
        assert_eq!(state.item(&ItemId::from("b1")).unwrap().title(), "b1");
        assert_eq!(state.count_items_in(&GroupId::from("a")), 3);
    }

    fn rolled_back_entities(events: &mut broadcast::Receiver<BoardEvent>) -> Vec<String> {
        while let Ok(event) = events.try_recv() {
            if let BoardEvent::WriteRolledBack { overwritten, .. } = event {
                return overwritten;
            }
        }
        panic!("no WriteRolledBack event");
    }

    #[tokio::test]
    async fn late_rollback_overwrites_newer_edit_of_same_item() {
        let store = seeded_store();
        store.pause();
        store.fail_group(&GroupId::from("b"), StoreError::Rejected("stage locked".into()));
        let engine = engine_with(store.clone());
        let mut events = engine.subscribe();

        let plan = plan_move(&read(&engine), &ItemId::from("a1"), &DropTarget::group("b")).unwrap();
        let moved = engine.commit(&plan).unwrap();
        let edited = engine
            .update_item(&ItemId::from("a1"), ItemFields::titled("renamed"))
            .unwrap();

        store.resume();
        assert!(!moved.settled().await.is_confirmed());
        assert!(edited.settled().await.is_confirmed());

        // The move's snapshot wins over the edit applied after it.
        let state = read(&engine);
        let a1 = state.item(&ItemId::from("a1")).unwrap();
        assert_eq!(a1.title(), "a1");
        assert_eq!((a1.group_id.as_str(), a1.position), ("a", 0));
        assert_eq!(state.item(&ItemId::from("a2")).unwrap().position, 1);
        assert_eq!(state.item(&ItemId::from("b1")).unwrap().position, 0);
        assert!(state.check_invariants().is_empty());

        assert_eq!(rolled_back_entities(&mut events), vec!["item a1".to_string()]);
    }

    #[tokio::test]
    async fn rollback_after_source_group_deleted_keeps_invariants() {
        let store = seeded_store();
        store.pause();
        store.fail_item(&ItemId::from("b1"), StoreError::Unavailable("offline".into()));
        let engine = engine_with(store.clone());
        let mut events = engine.subscribe();

        let plan = plan_move(&read(&engine), &ItemId::from("a1"), &DropTarget::item("b1")).unwrap();
        let moved = engine.commit(&plan).unwrap();
        let deleted = engine.delete_group(&GroupId::from("a")).unwrap();

        store.resume();
        assert!(matches!(
            moved.settled().await,
            SyncOutcome::RolledBack(StoreError::Unavailable(_))
        ));
        assert!(deleted.settled().await.is_confirmed());

        let state = read(&engine);
        assert!(state.check_invariants().is_empty());
        assert!(state.group(&GroupId::from("a")).is_none());
        assert!(state.item(&ItemId::from("a2")).is_none());
        assert_eq!(state.item(&ItemId::from("a1")).unwrap().group_id.as_str(), "b");
        assert_eq!(state.count_items_in(&GroupId::from("b")), 2);

        let overwritten = rolled_back_entities(&mut events);
        assert!(overwritten.contains(&"item a1 (group deleted)".to_string()));

        let outcome = engine
            .update_item(&ItemId::from("a1"), ItemFields::titled("still editable"))
            .unwrap()
            .settled()
            .await;
        assert!(outcome.is_confirmed());
        assert_eq!(read(&engine).item(&ItemId::from("a1")).unwrap().title(), "still editable");
    }

    #[test]
    fn mutations_outside_a_runtime_are_rejected() {
        let engine = engine_with(seeded_store());
        let before = read(&engine);
        assert!(matches!(
            engine.delete_item(&ItemId::from("a1")),
            Err(BoardError::NoRuntime)
        ));
        assert_eq!(read(&engine), before);
    }
}
