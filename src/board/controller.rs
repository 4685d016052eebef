//! Board controller: the public surface presentation code talks to.
//!
//! One controller per board instance. It owns the authoritative state, the
//! single drag session, the active filters, and the sync engine, which is
//! the only path to the store.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;

use super::drag::{
    CancelReason, DEFAULT_DRAG_THRESHOLD_PX, DragMachine, DragPhase, DragRelease, PointerPosition,
};
use super::events::BoardEvent;
use super::filter::{FilterSet, Predicate, visible_items};
use super::models::{BoardKind, Group, GroupId, GroupPatch, Item, ItemFields, ItemId, NewGroup};
use super::planner::{DropTarget, MovePlan, plan_move};
use super::state::{BoardState, InvariantViolation};
use super::store::BoardStore;
use super::sync::{PendingWrite, SharedState, SyncEngine};
use crate::board_config::BoardConfig;
use crate::errors::{BoardError, BoardResult};

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Per-board settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerOptions {
    pub kind: BoardKind,
    /// Acting user, compared against item owners by the "mine only" filter.
    pub actor: Option<String>,
    pub drag_threshold_px: f64,
    pub event_capacity: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            kind: BoardKind::default(),
            actor: None,
            drag_threshold_px: DEFAULT_DRAG_THRESHOLD_PX,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl From<&BoardConfig> for ControllerOptions {
    fn from(config: &BoardConfig) -> Self {
        Self {
            kind: config.board.kind,
            actor: config.board.actor.clone(),
            drag_threshold_px: config.drag.threshold_px,
            event_capacity: config.sync.event_capacity.max(1),
        }
    }
}

/// A group with its visible items, ready to render as a column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupView {
    pub group: Group,
    pub items: Vec<Item>,
    pub total: usize,
    pub visible: usize,
}

/// Result of ending a drag.
#[derive(Debug)]
pub enum DragOutcome {
    /// The plan was applied locally; the store write is in flight.
    Moved {
        plan: MovePlan,
        pending: PendingWrite,
    },
    /// Dropped where it started.
    Unchanged { item_id: ItemId },
    Cancelled {
        item_id: ItemId,
        reason: CancelReason,
    },
}

pub struct BoardController {
    kind: BoardKind,
    actor: Option<String>,
    state: SharedState,
    drag: DragMachine,
    sync: SyncEngine,
    filters: FilterSet,
    predicates: Vec<Predicate>,
}

impl BoardController {
    /// Controller over an already-built state.
    pub fn new(store: Arc<dyn BoardStore>, state: BoardState, options: ControllerOptions) -> Self {
        let state: SharedState = Arc::new(Mutex::new(state));
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        Self {
            kind: options.kind,
            actor: options.actor,
            sync: SyncEngine::new(state.clone(), store, events),
            state,
            drag: DragMachine::new(options.drag_threshold_px),
            filters: FilterSet::default(),
            predicates: Vec::new(),
        }
    }

    /// Fetch every group and item from the store and build a controller.
    pub async fn load(store: Arc<dyn BoardStore>, options: ControllerOptions) -> BoardResult<Self> {
        let groups = store.list_groups().await?;
        let items = store.list_items().await?;
        let state = BoardState::from_records(groups, items);
        tracing::info!(
            kind = options.kind.as_str(),
            groups = state.group_count(),
            items = state.item_count(),
            "board loaded"
        );
        Ok(Self::new(store, state, options))
    }

    pub fn kind(&self) -> BoardKind {
        self.kind
    }

    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.sync.subscribe()
    }

    // Readers never fail: a poisoned lock still holds a consistent board,
    // since every mutation validates before touching it.
    fn read(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deep copy of the current board.
    pub fn snapshot(&self) -> BoardState {
        self.read().clone()
    }

    // ── Views ─────────────────────────────────────────────────────────

    /// All groups in left-to-right order. Filters never hide a group.
    pub fn get_visible_groups(&self) -> Vec<Group> {
        self.read().groups_ordered().into_iter().cloned().collect()
    }

    /// Visible items of one group in position order.
    pub fn get_items_for_group(&self, group_id: &GroupId) -> BoardResult<Vec<Item>> {
        let state = self.read();
        if !state.contains_group(group_id) {
            return Err(BoardError::GroupNotFound {
                id: group_id.clone(),
            });
        }
        Ok(visible_items(state.items_in(group_id), &self.predicates)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Every group with its visible items and counts.
    pub fn groups_view(&self) -> Vec<GroupView> {
        let state = self.read();
        state
            .groups_ordered()
            .into_iter()
            .map(|group| {
                let all = state.items_in(&group.id);
                let total = all.len();
                let items: Vec<Item> = visible_items(all, &self.predicates)
                    .into_iter()
                    .cloned()
                    .collect();
                GroupView {
                    group: group.clone(),
                    visible: items.len(),
                    items,
                    total,
                }
            })
            .collect()
    }

    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        self.read().check_invariants()
    }

    /// Resolve a full id or unique id prefix to an item id.
    pub fn resolve_item(&self, reference: &str) -> BoardResult<ItemId> {
        let state = self.read();
        match state.find_item_by_prefix(reference).as_slice() {
            [item] => Ok(item.id.clone()),
            [] => Err(BoardError::ItemNotFound {
                id: ItemId::from(reference),
            }),
            matches => Err(BoardError::AmbiguousItem {
                prefix: reference.to_string(),
                matches: matches.len(),
            }),
        }
    }

    /// Resolve an id, id prefix, or title to a group id.
    pub fn resolve_group(&self, reference: &str) -> BoardResult<GroupId> {
        let state = self.read();
        match state.find_group(reference).as_slice() {
            [group] => Ok(group.id.clone()),
            _ => Err(BoardError::GroupNotFound {
                id: GroupId::from(reference),
            }),
        }
    }

    // ── Filters ───────────────────────────────────────────────────────

    /// Replace the active predicates. Never touches board state.
    pub fn set_filter_predicates(&mut self, predicates: Vec<Predicate>) {
        tracing::debug!(count = predicates.len(), "filter predicates replaced");
        self.filters = FilterSet::default();
        self.predicates = predicates;
    }

    /// Set filters from UI controls, resolving "mine only" against the actor.
    pub fn set_filters(&mut self, filters: FilterSet) {
        self.predicates = filters.predicates(self.actor.as_deref());
        if filters.mine_only && self.actor.is_none() {
            tracing::warn!("'mine only' filter ignored: no acting user configured");
        }
        self.filters = filters;
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    // ── Drag session ──────────────────────────────────────────────────

    pub fn start_drag(&mut self, item_id: &ItemId, at: PointerPosition) -> BoardResult<DragPhase> {
        let state = self.state.lock().map_err(|_| BoardError::LockPoisoned)?;
        self.drag.press(&state, item_id, at)
    }

    pub fn pointer_moved(&mut self, at: PointerPosition) -> DragPhase {
        self.drag.pointer_moved(at)
    }

    /// Pointer over a droppable surface (`Some`) or off every surface (`None`).
    /// Returns the recomputed preview.
    pub fn update_drag_target(&mut self, target: Option<DropTarget>) -> BoardResult<Option<MovePlan>> {
        let state = self.state.lock().map_err(|_| BoardError::LockPoisoned)?;
        Ok(self.drag.hover(&state, target)?.cloned())
    }

    pub fn drag_phase(&self) -> DragPhase {
        self.drag.phase()
    }

    pub fn drag_preview(&self) -> Option<&MovePlan> {
        self.drag.preview()
    }

    /// Pointer-up. Replans against the board as it is now, so a target
    /// deleted mid-drag cancels instead of committing a stale preview.
    pub fn end_drag(&mut self) -> BoardResult<DragOutcome> {
        let (context, target) = match self.drag.release()? {
            DragRelease::Cancelled { item_id, reason } => {
                tracing::debug!(item_id = %item_id, ?reason, "drag cancelled");
                return Ok(DragOutcome::Cancelled { item_id, reason });
            }
            DragRelease::Drop { context, target } => (context, target),
        };

        let plan = {
            let state = self.state.lock().map_err(|_| BoardError::LockPoisoned)?;
            plan_move(&state, &context.active_item_id, &target)?
        };

        match plan {
            MovePlan::NoOp { item_id } => Ok(DragOutcome::Unchanged { item_id }),
            MovePlan::TargetGone { item_id, target } => {
                tracing::warn!(item_id = %item_id, drop_target = ?target, "drop target vanished during drag");
                Ok(DragOutcome::Cancelled {
                    item_id,
                    reason: CancelReason::TargetGone,
                })
            }
            plan @ MovePlan::Move { .. } => {
                let pending = self.sync.commit(&plan)?;
                tracing::info!(
                    item_id = %plan.item_id(),
                    op_id = pending.op_id(),
                    "item moved"
                );
                Ok(DragOutcome::Moved { plan, pending })
            }
        }
    }

    /// Abort the drag session with no side effects.
    pub fn cancel_drag(&mut self) -> Option<ItemId> {
        self.drag.cancel()
    }

    /// Plan and commit a move in one step, bypassing the pointer session.
    pub fn move_item(&self, item_id: &ItemId, target: &DropTarget) -> BoardResult<(MovePlan, PendingWrite)> {
        let plan = {
            let state = self.state.lock().map_err(|_| BoardError::LockPoisoned)?;
            plan_move(&state, item_id, target)?
        };
        let pending = self.sync.commit(&plan)?;
        Ok((plan, pending))
    }

    // ── Mutations ─────────────────────────────────────────────────────

    pub fn create_item(&self, group_id: &GroupId, fields: ItemFields) -> BoardResult<(ItemId, PendingWrite)> {
        self.sync.create_item(group_id, fields)
    }

    pub fn duplicate_item(&self, item_id: &ItemId) -> BoardResult<(ItemId, PendingWrite)> {
        self.sync.duplicate_item(item_id)
    }

    pub fn update_item(&self, item_id: &ItemId, fields: ItemFields) -> BoardResult<PendingWrite> {
        self.sync.update_item(item_id, fields)
    }

    /// Delete an item. Cancels the drag first if it is the one being dragged.
    pub fn delete_item(&mut self, item_id: &ItemId) -> BoardResult<PendingWrite> {
        if self.drag.active_item() == Some(item_id) {
            self.drag.cancel();
        }
        self.sync.delete_item(item_id)
    }

    pub fn create_group(&self, payload: NewGroup) -> BoardResult<(GroupId, PendingWrite)> {
        self.sync.create_group(payload)
    }

    pub fn update_group(&self, group_id: &GroupId, patch: GroupPatch) -> BoardResult<PendingWrite> {
        self.sync.update_group(group_id, patch)
    }

    /// Delete a group and its items. A drag of one of those items is cancelled.
    pub fn delete_group(&mut self, group_id: &GroupId) -> BoardResult<PendingWrite> {
        if let Some(context) = self.drag.context()
            && &context.origin_group_id == group_id
        {
            self.drag.cancel();
        }
        self.sync.delete_group(group_id)
    }
}
