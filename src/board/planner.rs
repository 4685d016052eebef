//! Move planner: turns a drop target into new (group, position) assignments.
//!
//! Planning is pure. A [`MovePlan`] describes the resulting layout of every
//! group it touches; the sync engine applies it.

use serde::{Deserialize, Serialize};

use super::models::{GroupId, ItemId};
use super::state::BoardState;
use crate::errors::{BoardError, BoardResult};

/// Where an item was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DropTarget {
    /// Empty area of a group: append to its end.
    Group { group_id: GroupId },
    /// Over another item: take that item's slot.
    Item { item_id: ItemId },
}

impl DropTarget {
    pub fn group(id: impl Into<GroupId>) -> Self {
        Self::Group { group_id: id.into() }
    }

    pub fn item(id: impl Into<ItemId>) -> Self {
        Self::Item { item_id: id.into() }
    }
}

/// Final slot of one item in an affected group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub item_id: ItemId,
    pub group_id: GroupId,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MovePlan {
    /// Nothing changes (self-drop, or group drop onto the current group).
    NoOp { item_id: ItemId },
    /// The item lands at `position` in `to_group`. `placements` lists the
    /// dense layout of the source and destination groups after the move.
    Move {
        item_id: ItemId,
        from_group: GroupId,
        to_group: GroupId,
        position: u32,
        placements: Vec<Placement>,
    },
    /// The target disappeared while the drag was in flight.
    TargetGone { item_id: ItemId, target: DropTarget },
}

impl MovePlan {
    pub fn item_id(&self) -> &ItemId {
        match self {
            Self::NoOp { item_id } | Self::TargetGone { item_id, .. } => item_id,
            Self::Move { item_id, .. } => item_id,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp { .. })
    }

    pub fn is_cross_group(&self) -> bool {
        matches!(self, Self::Move { from_group, to_group, .. } if from_group != to_group)
    }
}

/// Plan dropping `active` on `target`.
///
/// Fails only when the active item itself is unknown; a vanished target
/// yields [`MovePlan::TargetGone`].
pub fn plan_move(state: &BoardState, active: &ItemId, target: &DropTarget) -> BoardResult<MovePlan> {
    let item = state
        .item(active)
        .ok_or_else(|| BoardError::ItemNotFound { id: active.clone() })?;
    let from_group = item.group_id.clone();

    match target {
        DropTarget::Group { group_id } => {
            if !state.contains_group(group_id) {
                return Ok(gone(active, target));
            }
            if *group_id == from_group {
                return Ok(MovePlan::NoOp {
                    item_id: active.clone(),
                });
            }
            let append_at = state.count_items_in(group_id) as usize;
            Ok(build_move(state, active, &from_group, group_id, append_at))
        }
        DropTarget::Item { item_id } => {
            if item_id == active {
                return Ok(MovePlan::NoOp {
                    item_id: active.clone(),
                });
            }
            let Some(anchor) = state.item(item_id) else {
                return Ok(gone(active, target));
            };
            if !state.contains_group(&anchor.group_id) {
                return Ok(gone(active, target));
            }
            let to_group = anchor.group_id.clone();
            let anchor_index = state
                .items_in(&to_group)
                .iter()
                .position(|i| &i.id == item_id)
                .unwrap_or(0);
            Ok(build_move(state, active, &from_group, &to_group, anchor_index))
        }
    }
}

fn gone(active: &ItemId, target: &DropTarget) -> MovePlan {
    MovePlan::TargetGone {
        item_id: active.clone(),
        target: target.clone(),
    }
}

/// Remove `active` from its group, insert it at `index` of `to_group`
/// (clamped), and renumber both groups from zero.
fn build_move(
    state: &BoardState,
    active: &ItemId,
    from_group: &GroupId,
    to_group: &GroupId,
    index: usize,
) -> MovePlan {
    let mut destination: Vec<ItemId> = state
        .items_in(to_group)
        .iter()
        .map(|i| i.id.clone())
        .filter(|id| id != active)
        .collect();
    let index = index.min(destination.len());
    destination.insert(index, active.clone());

    let mut placements = layout(to_group, &destination);
    if from_group != to_group {
        let source: Vec<ItemId> = state
            .items_in(from_group)
            .iter()
            .map(|i| i.id.clone())
            .filter(|id| id != active)
            .collect();
        placements.extend(layout(from_group, &source));
    }

    MovePlan::Move {
        item_id: active.clone(),
        from_group: from_group.clone(),
        to_group: to_group.clone(),
        position: index as u32,
        placements,
    }
}

fn layout(group_id: &GroupId, order: &[ItemId]) -> Vec<Placement> {
    order
        .iter()
        .enumerate()
        .map(|(position, item_id)| Placement {
            item_id: item_id.clone(),
            group_id: group_id.clone(),
            position: position as u32,
        })
        .collect()
}
