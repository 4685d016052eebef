//! Filter engine: projects the full item set down to the visible subset.
//!
//! Predicates are ANDed. Filtering never reorders, and an empty predicate
//! list is the identity.

use serde::{Deserialize, Serialize};

use super::models::{Item, Priority};

/// One independent visibility predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Predicate {
    /// Case-insensitive substring of title, a tag, or the related name.
    Text(String),
    /// Item is owned by this actor.
    OwnedBy(String),
    /// Exact priority.
    Priority(Priority),
    /// Value in minor units is at least this amount. Items without a value fail.
    MinValue(i64),
}

impl Predicate {
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            Predicate::Text(query) => text_matches(item, query),
            Predicate::OwnedBy(actor) => item.fields.assignee.as_deref() == Some(actor.as_str()),
            Predicate::Priority(priority) => item.fields.priority == Some(*priority),
            Predicate::MinValue(min) => item.fields.value.is_some_and(|v| v >= *min),
        }
    }
}

fn text_matches(item: &Item, query: &str) -> bool {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    let fields = &item.fields;
    fields.title.to_lowercase().contains(&needle)
        || fields
            .tags
            .iter()
            .any(|tag| tag.to_lowercase().contains(&needle))
        || fields
            .related_name
            .as_deref()
            .is_some_and(|name| name.to_lowercase().contains(&needle))
}

/// Filter controls as a presentation layer holds them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub mine_only: bool,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub min_value: Option<i64>,
}

impl FilterSet {
    /// Lower the controls to a predicate list.
    ///
    /// `mine_only` without an acting user yields no predicate; there is no
    /// identity to compare against.
    pub fn predicates(&self, actor: Option<&str>) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        if let Some(query) = self.query.as_deref()
            && !query.trim().is_empty()
        {
            predicates.push(Predicate::Text(query.to_string()));
        }
        if self.mine_only
            && let Some(actor) = actor
        {
            predicates.push(Predicate::OwnedBy(actor.to_string()));
        }
        if let Some(priority) = self.priority {
            predicates.push(Predicate::Priority(priority));
        }
        if let Some(min) = self.min_value {
            predicates.push(Predicate::MinValue(min));
        }
        predicates
    }

    pub fn is_active(&self) -> bool {
        self.query.as_deref().is_some_and(|q| !q.trim().is_empty())
            || self.mine_only
            || self.priority.is_some()
            || self.min_value.is_some()
    }
}

/// Items passing every predicate, in input order.
pub fn visible_items<'a, I>(items: I, predicates: &[Predicate]) -> Vec<&'a Item>
where
    I: IntoIterator<Item = &'a Item>,
{
    items
        .into_iter()
        .filter(|item| predicates.iter().all(|p| p.matches(item)))
        .collect()
}
