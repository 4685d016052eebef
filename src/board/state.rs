//! Authoritative in-memory board state and its invariants.
//!
//! Two invariants hold after every committed operation:
//! - single ownership: every item's `group_id` names an existing group
//! - dense positions: a group with N items holds positions `0..N` exactly
//!
//! Violations are programmer errors and panic.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::models::{Group, GroupId, Item, ItemId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardState {
    groups: BTreeMap<GroupId, Group>,
    items: BTreeMap<ItemId, Item>,
}

/// A broken invariant found by [`BoardState::check_invariants`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    OrphanItem { item_id: ItemId, group_id: GroupId },
    DuplicatePosition { group_id: GroupId, position: u32 },
    PositionGap { group_id: GroupId, expected: u32, found: u32 },
    DuplicateOrderIndex { order_index: u32 },
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OrphanItem { item_id, group_id } => {
                write!(f, "item {} references missing group {}", item_id, group_id)
            }
            Self::DuplicatePosition { group_id, position } => {
                write!(f, "group {} has two items at position {}", group_id, position)
            }
            Self::PositionGap {
                group_id,
                expected,
                found,
            } => write!(
                f,
                "group {} expected position {} but found {}",
                group_id, expected, found
            ),
            Self::DuplicateOrderIndex { order_index } => {
                write!(f, "two groups share order index {}", order_index)
            }
        }
    }
}

impl BoardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build state from store records.
    ///
    /// Items whose group is missing are dropped, and each group's positions
    /// are renumbered densely in stored order (ties broken by id).
    pub fn from_records(groups: Vec<Group>, items: Vec<Item>) -> Self {
        let mut state = Self::new();
        for group in groups {
            state.groups.insert(group.id.clone(), group);
        }
        for item in items {
            if !state.groups.contains_key(&item.group_id) {
                tracing::warn!(
                    item_id = %item.id,
                    group_id = %item.group_id,
                    "dropping item that references a missing group"
                );
                continue;
            }
            state.items.insert(item.id.clone(), item);
        }
        let group_ids: Vec<GroupId> = state.groups.keys().cloned().collect();
        for group_id in &group_ids {
            state.renumber_group(group_id);
        }
        state
    }

    /// Invariant report for store records exactly as stored, before
    /// [`Self::from_records`] repairs them.
    pub fn audit_records(groups: Vec<Group>, items: Vec<Item>) -> Vec<InvariantViolation> {
        let raw = Self {
            groups: groups.into_iter().map(|g| (g.id.clone(), g)).collect(),
            items: items.into_iter().map(|i| (i.id.clone(), i)).collect(),
        };
        raw.check_invariants()
    }

    // ── Queries ───────────────────────────────────────────────────────

    pub fn group(&self, id: &GroupId) -> Option<&Group> {
        self.groups.get(id)
    }

    pub fn item(&self, id: &ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn contains_group(&self, id: &GroupId) -> bool {
        self.groups.contains_key(id)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Groups in left-to-right order.
    pub fn groups_ordered(&self) -> Vec<&Group> {
        let mut groups: Vec<&Group> = self.groups.values().collect();
        groups.sort_by(|a, b| a.order_index.cmp(&b.order_index).then(a.id.cmp(&b.id)));
        groups
    }

    /// Items of one group in vertical order.
    pub fn items_in(&self, group_id: &GroupId) -> Vec<&Item> {
        let mut items: Vec<&Item> = self
            .items
            .values()
            .filter(|item| &item.group_id == group_id)
            .collect();
        items.sort_by(|a, b| a.position.cmp(&b.position).then(a.id.cmp(&b.id)));
        items
    }

    pub fn count_items_in(&self, group_id: &GroupId) -> u32 {
        self.items
            .values()
            .filter(|item| &item.group_id == group_id)
            .count() as u32
    }

    /// Every item, ordered by group order then position.
    pub fn items_ordered(&self) -> Vec<&Item> {
        self.groups_ordered()
            .into_iter()
            .flat_map(|group| self.items_in(&group.id))
            .collect()
    }

    /// Order index for a group appended at the end.
    ///
    /// Equals the group count while indices are dense; after a deletion it
    /// stays one past the largest index so indices remain unique.
    pub fn next_order_index(&self) -> u32 {
        self.groups
            .values()
            .map(|g| g.order_index + 1)
            .max()
            .unwrap_or(0)
    }

    /// Resolve an item by full id or unique id prefix.
    pub fn find_item_by_prefix(&self, prefix: &str) -> Vec<&Item> {
        if let Some(item) = self.items.get(&ItemId::from(prefix)) {
            return vec![item];
        }
        self.items
            .values()
            .filter(|item| item.id.as_str().starts_with(prefix))
            .collect()
    }

    /// Resolve a group by full id, unique id prefix, or case-insensitive title.
    pub fn find_group(&self, needle: &str) -> Vec<&Group> {
        if let Some(group) = self.groups.get(&GroupId::from(needle)) {
            return vec![group];
        }
        let by_title: Vec<&Group> = self
            .groups
            .values()
            .filter(|g| g.title.eq_ignore_ascii_case(needle))
            .collect();
        if !by_title.is_empty() {
            return by_title;
        }
        self.groups
            .values()
            .filter(|g| g.id.as_str().starts_with(needle))
            .collect()
    }

    // ── Mutators (crate-internal; the sync engine is the only caller) ──

    pub(crate) fn put_group(&mut self, group: Group) {
        self.groups.insert(group.id.clone(), group);
    }

    pub(crate) fn take_group(&mut self, id: &GroupId) -> Option<Group> {
        self.groups.remove(id)
    }

    pub(crate) fn put_item(&mut self, item: Item) {
        self.items.insert(item.id.clone(), item);
    }

    pub(crate) fn take_item(&mut self, id: &ItemId) -> Option<Item> {
        self.items.remove(id)
    }

    pub(crate) fn group_mut(&mut self, id: &GroupId) -> Option<&mut Group> {
        self.groups.get_mut(id)
    }

    pub(crate) fn item_mut(&mut self, id: &ItemId) -> Option<&mut Item> {
        self.items.get_mut(id)
    }

    /// Rewrite a group's positions to `0..N` keeping their current order.
    /// Returns the items whose position changed.
    pub(crate) fn renumber_group(&mut self, group_id: &GroupId) -> Vec<(ItemId, u32)> {
        let order: Vec<ItemId> = self
            .items_in(group_id)
            .into_iter()
            .map(|item| item.id.clone())
            .collect();
        let mut changed = Vec::new();
        for (index, id) in order.iter().enumerate() {
            let position = index as u32;
            if let Some(item) = self.items.get_mut(id)
                && item.position != position
            {
                item.position = position;
                changed.push((id.clone(), position));
            }
        }
        changed
    }

    // ── Invariants ────────────────────────────────────────────────────

    /// Panics if two items of `group_id` sit at `position`.
    pub fn assert_unique_position(&self, group_id: &GroupId, position: u32) {
        let holders = self
            .items
            .values()
            .filter(|item| &item.group_id == group_id && item.position == position)
            .count();
        assert!(
            holders <= 1,
            "invariant violated: {} items of group {} at position {}",
            holders,
            group_id,
            position
        );
    }

    /// Panics if the item is missing or references a missing group.
    pub fn assert_single_ownership(&self, item_id: &ItemId) {
        let item = self
            .items
            .get(item_id)
            .unwrap_or_else(|| panic!("invariant violated: item {} is not on the board", item_id));
        assert!(
            self.groups.contains_key(&item.group_id),
            "invariant violated: item {} references missing group {}",
            item_id,
            item.group_id
        );
    }

    /// Panics on any violation reported by [`Self::check_invariants`].
    pub fn assert_invariants(&self) {
        let violations = self.check_invariants();
        assert!(
            violations.is_empty(),
            "board invariants violated: {}",
            violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        );
    }

    /// Non-panicking invariant report.
    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();

        for item in self.items.values() {
            if !self.groups.contains_key(&item.group_id) {
                violations.push(InvariantViolation::OrphanItem {
                    item_id: item.id.clone(),
                    group_id: item.group_id.clone(),
                });
            }
        }

        for group in self.groups_ordered() {
            let mut positions: Vec<u32> =
                self.items_in(&group.id).iter().map(|i| i.position).collect();
            positions.sort_unstable();
            for pair in positions.windows(2) {
                if pair[0] == pair[1] {
                    violations.push(InvariantViolation::DuplicatePosition {
                        group_id: group.id.clone(),
                        position: pair[0],
                    });
                }
            }
            positions.dedup();
            for (expected, found) in positions.iter().enumerate() {
                if *found != expected as u32 {
                    violations.push(InvariantViolation::PositionGap {
                        group_id: group.id.clone(),
                        expected: expected as u32,
                        found: *found,
                    });
                    break;
                }
            }
        }

        let mut order_indices: Vec<u32> = self.groups.values().map(|g| g.order_index).collect();
        order_indices.sort_unstable();
        for pair in order_indices.windows(2) {
            if pair[0] == pair[1] {
                violations.push(InvariantViolation::DuplicateOrderIndex {
                    order_index: pair[0],
                });
            }
        }

        violations
    }

    // ── Snapshots ─────────────────────────────────────────────────────

    /// Record the current value (or absence) of the named entities.
    pub fn snapshot<G, I>(&self, groups: G, items: I) -> Snapshot
    where
        G: IntoIterator<Item = GroupId>,
        I: IntoIterator<Item = ItemId>,
    {
        let mut snapshot = Snapshot::default();
        for id in groups {
            if !snapshot.groups.iter().any(|(g, _)| g == &id) {
                let value = self.groups.get(&id).cloned();
                snapshot.groups.push((id, value));
            }
        }
        for id in items {
            if !snapshot.items.iter().any(|(i, _)| i == &id) {
                let value = self.items.get(&id).cloned();
                snapshot.items.push((id, value));
            }
        }
        snapshot
    }
}

/// What [`Snapshot::restore`] could not put back verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Items left as they are because their recorded group is gone.
    pub kept: Vec<ItemId>,
    /// Items removed because the group they pointed at was removed.
    pub dropped: Vec<ItemId>,
    /// Positions rewritten to close gaps or collisions.
    pub renumbered: Vec<(ItemId, u32)>,
}

impl RestoreReport {
    /// True when the snapshot went back exactly as recorded.
    pub fn is_exact(&self) -> bool {
        self.kept.is_empty() && self.dropped.is_empty() && self.renumbered.is_empty()
    }

    /// Human-readable entity names, for logs and notifications.
    pub fn describe(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .kept
            .iter()
            .map(|id| format!("item {} (group deleted)", id))
            .collect();
        out.extend(self.dropped.iter().map(|id| format!("item {} (removed)", id)));
        out.extend(
            self.renumbered
                .iter()
                .map(|(id, pos)| format!("item {} (now at {})", id, pos)),
        );
        out
    }
}

/// Prior values of the entities one operation touches.
///
/// `None` records that the entity did not exist, so restoring removes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    groups: Vec<(GroupId, Option<Group>)>,
    items: Vec<(ItemId, Option<Item>)>,
}

impl Snapshot {
    /// Snapshot of the same entities as they stand in `state` now.
    pub fn recapture(&self, state: &BoardState) -> Snapshot {
        state.snapshot(
            self.groups.iter().map(|(id, _)| id.clone()),
            self.items.iter().map(|(id, _)| id.clone()),
        )
    }

    /// Put every recorded entity back to its recorded value, keeping both
    /// invariants intact when other operations changed the board meanwhile.
    ///
    /// An item whose recorded group no longer exists keeps its current
    /// value. Items left referencing a group the restore removed are
    /// dropped. Every group the restore touched is renumbered densely.
    pub fn restore(&self, state: &mut BoardState) -> RestoreReport {
        let mut report = RestoreReport::default();
        let mut touched: BTreeSet<GroupId> = BTreeSet::new();

        for (id, value) in &self.groups {
            match value {
                Some(group) => state.put_group(group.clone()),
                None => {
                    state.take_group(id);
                }
            }
        }
        for (id, value) in &self.items {
            if let Some(current) = state.item(id) {
                touched.insert(current.group_id.clone());
            }
            match value {
                Some(item) if !state.contains_group(&item.group_id) => {
                    report.kept.push(id.clone());
                }
                Some(item) => {
                    touched.insert(item.group_id.clone());
                    state.put_item(item.clone());
                }
                None => {
                    state.take_item(id);
                }
            }
        }

        let orphans: Vec<ItemId> = state
            .items
            .values()
            .filter(|item| !state.groups.contains_key(&item.group_id))
            .map(|item| item.id.clone())
            .collect();
        for id in orphans {
            state.take_item(&id);
            report.dropped.push(id);
        }

        for group_id in &touched {
            if state.contains_group(group_id) {
                report.renumbered.extend(state.renumber_group(group_id));
            }
        }
        report
    }

    /// Entity ids whose value differs between two snapshots of the same keys.
    pub fn diverging_entities(&self, other: &Snapshot) -> Vec<String> {
        let mut diverging = Vec::new();
        for ((id, a), (_, b)) in self.groups.iter().zip(&other.groups) {
            if a != b {
                diverging.push(format!("group {}", id));
            }
        }
        for ((id, a), (_, b)) in self.items.iter().zip(&other.items) {
            if a != b {
                diverging.push(format!("item {}", id));
            }
        }
        diverging
    }
}
