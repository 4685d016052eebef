use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::models::{Group, GroupId, Item, ItemId};

/// Kind of mutation a sync operation performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    MoveItem,
    CreateItem,
    DuplicateItem,
    UpdateItem,
    DeleteItem,
    CreateGroup,
    UpdateGroup,
    DeleteGroup,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MoveItem => "move item",
            Self::CreateItem => "create item",
            Self::DuplicateItem => "duplicate item",
            Self::UpdateItem => "update item",
            Self::DeleteItem => "delete item",
            Self::CreateGroup => "create group",
            Self::UpdateGroup => "update group",
            Self::DeleteGroup => "delete group",
        }
    }
}

/// Notifications for presentation code.
///
/// Local events fire when the optimistic change is applied; `WriteConfirmed`
/// and `WriteRolledBack` follow once the store answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BoardEvent {
    ItemCreated {
        item: Item,
    },
    ItemUpdated {
        item: Item,
    },
    ItemMoved {
        item_id: ItemId,
        from_group: GroupId,
        to_group: GroupId,
        position: u32,
    },
    ItemDeleted {
        item_id: ItemId,
    },
    GroupCreated {
        group: Group,
    },
    GroupUpdated {
        group: Group,
    },
    GroupDeleted {
        group_id: GroupId,
        item_ids: Vec<ItemId>,
    },
    WriteConfirmed {
        op_id: u64,
        op: OpKind,
    },
    /// The store rejected a write and the local change was reverted.
    WriteRolledBack {
        op_id: u64,
        op: OpKind,
        error: String,
        /// Entities whose newer local state the rollback replaced, or that
        /// it could not put back as recorded.
        #[serde(default)]
        overwritten: Vec<String>,
    },
}

impl BoardEvent {
    /// Message for a user-visible notification, if this event warrants one.
    pub fn notification(&self) -> Option<String> {
        match self {
            BoardEvent::WriteRolledBack {
                op,
                error,
                overwritten,
                ..
            } => {
                let mut message =
                    format!("Could not {}: {}. The change was undone.", op.as_str(), error);
                if !overwritten.is_empty() {
                    message.push_str(&format!(" Also reverted: {}.", overwritten.join(", ")));
                }
                Some(message)
            }
            _ => None,
        }
    }
}

/// Send an event to all subscribers.
pub fn broadcast_event(tx: &broadcast::Sender<BoardEvent>, event: BoardEvent) {
    // No receivers is fine.
    let _ = tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_event_produces_notification() {
        let event = BoardEvent::WriteRolledBack {
            op_id: 7,
            op: OpKind::MoveItem,
            error: "Store unavailable: timeout".into(),
            overwritten: Vec::new(),
        };
        let message = event.notification().unwrap();
        assert!(message.contains("move item"));
        assert!(message.contains("timeout"));
        assert!(!message.contains("Also reverted"));

        let confirmed = BoardEvent::WriteConfirmed {
            op_id: 7,
            op: OpKind::MoveItem,
        };
        assert!(confirmed.notification().is_none());
    }

    #[test]
    fn rollback_notification_names_overwritten_entities() {
        let event = BoardEvent::WriteRolledBack {
            op_id: 8,
            op: OpKind::UpdateItem,
            error: "Store unavailable: offline".into(),
            overwritten: vec!["item a1".into()],
        };
        let message = event.notification().unwrap();
        assert!(message.ends_with("Also reverted: item a1."));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = BoardEvent::ItemDeleted {
            item_id: ItemId::from("x"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ItemDeleted");
        assert_eq!(json["data"]["item_id"], "x");
    }

    #[test]
    fn broadcast_without_receivers_does_not_panic() {
        let (tx, rx) = broadcast::channel(4);
        drop(rx);
        broadcast_event(
            &tx,
            BoardEvent::ItemDeleted {
                item_id: ItemId::from("x"),
            },
        );
    }
}
