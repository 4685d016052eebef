use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Opaque group identifier (a board column or a pipeline stage).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

/// Opaque item identifier (a task or a deal).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

macro_rules! opaque_id {
    ($name:ident) => {
        impl $name {
            /// Fresh random identifier.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// First eight characters, for compact display.
            pub fn short(&self) -> &str {
                let end = self
                    .0
                    .char_indices()
                    .nth(8)
                    .map(|(i, _)| i)
                    .unwrap_or(self.0.len());
                &self.0[..end]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

opaque_id!(GroupId);
opaque_id!(ItemId);

/// Which screen a board instance backs. Both run the same engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardKind {
    #[default]
    TaskBoard,
    Pipeline,
}

impl BoardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskBoard => "task_board",
            Self::Pipeline => "pipeline",
        }
    }

    /// Display noun for a group on this kind of board.
    pub fn group_noun(&self) -> &'static str {
        match self {
            Self::TaskBoard => "column",
            Self::Pipeline => "stage",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub title: String,
    /// Left-to-right order; unique within a board.
    pub order_index: u32,
    #[serde(default)]
    pub accent_color: Option<String>,
}

/// Domain payload of an item. Opaque to the move logic; only the filter
/// engine reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFields {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Acting user that owns the item (task assignee or deal owner).
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Monetary value in minor currency units.
    #[serde(default)]
    pub value: Option<i64>,
    /// Display name of the related client or company.
    #[serde(default)]
    pub related_name: Option<String>,
}

impl ItemFields {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub group_id: GroupId,
    /// Dense, unique index within the owning group.
    pub position: u32,
    #[serde(flatten)]
    pub fields: ItemFields,
}

impl Item {
    pub fn title(&self) -> &str {
        &self.fields.title
    }
}

/// Payload for creating a group; the engine assigns id and order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGroup {
    pub title: String,
    #[serde(default)]
    pub accent_color: Option<String>,
}

/// Partial update for a stored item. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<ItemFields>,
}

impl ItemPatch {
    pub fn placement(group_id: GroupId, position: u32) -> Self {
        Self {
            group_id: Some(group_id),
            position: Some(position),
            fields: None,
        }
    }

    pub fn position(position: u32) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    pub fn fields(fields: ItemFields) -> Self {
        Self {
            fields: Some(fields),
            ..Self::default()
        }
    }

    pub fn apply_to(&self, item: &mut Item) {
        if let Some(group_id) = &self.group_id {
            item.group_id = group_id.clone();
        }
        if let Some(position) = self.position {
            item.position = position;
        }
        if let Some(fields) = &self.fields {
            item.fields = fields.clone();
        }
    }
}

/// Partial update for a stored group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// `Some(None)` clears the colour; on the wire that is an explicit `null`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "double_option"
    )]
    pub accent_color: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_index: Option<u32>,
}

impl GroupPatch {
    pub fn apply_to(&self, group: &mut Group) {
        if let Some(title) = &self.title {
            group.title = title.clone();
        }
        if let Some(color) = &self.accent_color {
            group.accent_color = color.clone();
        }
        if let Some(order_index) = self.order_index {
            group.order_index = order_index;
        }
    }
}

/// Keeps "absent" and "explicit null" apart for patch fields.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
