//! Past property states of an entity.
//!
//! Every update, property removal or soft delete retires the current state
//! into the entity's history, stamped with the interval it was valid for.
//! Both adapters keep the history next to the entity and answer
//! point-in-time reads through [`state_at`].

use chrono::{DateTime, Utc};
use kgraph_core::{Entity, PropertyMap};
use serde::{Deserialize, Serialize};

use crate::Result;

/// One retired state, valid over `[valid_from, valid_until)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PastState {
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub properties: PropertyMap,
}

/// Retired states, oldest first.
pub type History = Vec<PastState>;

/// Parse a stored history; a missing field is an empty history.
pub fn parse_history(text: Option<&str>) -> Result<History> {
    match text {
        Some(text) if !text.is_empty() => Ok(serde_json::from_str(text)?),
        _ => Ok(History::new()),
    }
}

pub fn history_from_json(value: Option<&serde_json::Value>) -> Result<History> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(History::new()),
        Some(value) => Ok(serde_json::from_value(value.clone())?),
    }
}

/// Close the current state of `entity` at `until`.
pub fn retire(history: &mut History, entity: &Entity, until: DateTime<Utc>) {
    history.push(PastState {
        valid_from: entity.updated_at,
        valid_until: until,
        properties: entity.properties.clone(),
    });
}

/// The state of `current` as it was at `at`.
///
/// `None` before creation and from the soft-delete instant onwards. The
/// returned entity's `updated_at` is the instant that state began.
pub fn state_at(
    current: &Entity,
    deleted_at: Option<DateTime<Utc>>,
    history: &[PastState],
    at: DateTime<Utc>,
) -> Option<Entity> {
    if at < current.created_at || deleted_at.is_some_and(|deleted| at >= deleted) {
        return None;
    }
    if at >= current.updated_at {
        return Some(current.clone());
    }
    history
        .iter()
        .rev()
        .find(|state| state.valid_from <= at && at < state.valid_until)
        .map(|state| Entity {
            id: current.id.clone(),
            kind: current.kind.clone(),
            properties: state.properties.clone(),
            created_at: current.created_at,
            updated_at: state.valid_from,
        })
}
