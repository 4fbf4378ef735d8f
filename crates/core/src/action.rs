use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::{EntityId, SpaceId, TripleId};
use crate::triple::Triple;

/// A single local edit intent over one triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Create(Triple),
    Delete(Triple),
    Edit { before: Triple, after: Triple },
}

/// Per-space ordered action logs.
pub type SpaceActions = BTreeMap<SpaceId, Vec<Action>>;

impl Action {
    /// Edit of `old` into `new`. `new` takes over `old`'s id so later squashing
    /// sees both as the same fact, and is pending until published again.
    pub fn edit(old: Triple, new: Triple) -> Self {
        let after = Triple {
            id: old.id.clone(),
            is_deleted: false,
            has_been_published: false,
            ..new
        };
        Self::Edit {
            before: old.tombstoned(),
            after,
        }
    }

    /// The id `delete_actions` matches on: the triple id, or `before.id` for edits.
    pub fn id(&self) -> &TripleId {
        match self {
            Self::Create(t) | Self::Delete(t) => &t.id,
            Self::Edit { before, .. } => &before.id,
        }
    }

    /// Triple describing the state after this action.
    pub fn triple(&self) -> &Triple {
        match self {
            Self::Create(t) | Self::Delete(t) => t,
            Self::Edit { after, .. } => after,
        }
    }

    pub fn space_id(&self) -> &SpaceId {
        &self.triple().space_id
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.triple().entity_id
    }

    pub fn attribute_id(&self) -> &EntityId {
        &self.triple().attribute_id
    }

    /// String name of the action type for storage/logging.
    pub fn op_type_name(&self) -> &'static str {
        match self {
            Self::Create(_) => "createTriple",
            Self::Delete(_) => "deleteTriple",
            Self::Edit { .. } => "editTriple",
        }
    }

    pub fn is_published(&self) -> bool {
        self.triple().has_been_published
    }

    /// Copy of this action with every carried triple flagged as published.
    pub fn mark_published(self) -> Self {
        match self {
            Self::Create(t) => Self::Create(t.published()),
            Self::Delete(t) => Self::Delete(t.published()),
            Self::Edit { before, after } => Self::Edit {
                before: before.published(),
                after: after.published(),
            },
        }
    }
}
