//! Interactive board engine.
//!
//! ## Overview
//!
//! A board is a set of ordered groups (columns on a task board, stages in a
//! sales pipeline), each holding an ordered list of items. Users move items
//! between and within groups by drag-and-drop, filter what is visible, and
//! create, duplicate or delete items and groups. Every mutation is applied
//! locally first and confirmed against a remote store afterwards; a store
//! failure rolls the local change back.
//!
//! ## Module Map
//!
//! ```text
//!  presentation
//!       │ start_drag / update_drag_target / end_drag / create_item / ...
//!       v
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ controller.rs  (BoardController, GroupView, DragOutcome)         │
//! │    ├─ drag.rs     DragMachine: Idle → Pressed → Dragging → Over   │
//! │    │     └─ planner.rs  plan_move() → MovePlan (pure)             │
//! │    ├─ filter.rs   visible_items(items, predicates) (pure)        │
//! │    └─ sync.rs     SyncEngine: snapshot → apply → write → rollback │
//! │          │  state.rs  BoardState + invariants + Snapshot          │
//! │          │  events.rs BoardEvent broadcast                        │
//! │          v                                                       │
//! │      store.rs  BoardStore trait, MemoryStore                      │
//! │      db.rs     SqliteStore (DbHandle, blocking pool)             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module    | Responsibility                                          |
//! |-----------|---------------------------------------------------------|
//! | `models`  | `Group`, `Item`, `ItemFields`, ids, patches             |
//! | `state`   | Authoritative collections, invariant checks, snapshots  |
//! | `events`  | `BoardEvent` + `broadcast_event()` helper               |
//!
//! ## Typical Flow (drop an item on another item)
//!
//! 1. `start_drag` records the press point; `pointer_moved` promotes the
//!    press to a drag once it travels past the threshold.
//! 2. Each `update_drag_target` replans the move as a preview only.
//! 3. `end_drag` replans against the current board and hands the plan to
//!    `SyncEngine::commit`, which applies it under the state lock and
//!    spawns the store writes.
//! 4. The returned `PendingWrite` settles to `Confirmed`, or to
//!    `RolledBack` after the snapshot is restored and a `WriteRolledBack`
//!    event is broadcast.

pub mod controller;
pub mod db;
pub mod drag;
pub mod events;
pub mod filter;
pub mod models;
pub mod planner;
pub mod state;
pub mod store;
pub mod sync;

pub use controller::{BoardController, ControllerOptions, DragOutcome, GroupView};
pub use db::SqliteStore;
pub use drag::{CancelReason, DragPhase, PointerPosition};
pub use events::{BoardEvent, OpKind};
pub use filter::{FilterSet, Predicate, visible_items};
pub use models::{
    BoardKind, Group, GroupId, GroupPatch, Item, ItemFields, ItemId, ItemPatch, NewGroup, Priority,
};
pub use planner::{DropTarget, MovePlan, plan_move};
pub use state::{BoardState, RestoreReport};
pub use store::{BoardStore, MemoryStore, StoreOp, StoreWrite};
pub use sync::{PendingWrite, SyncOutcome};
