use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::{EntityId, SpaceId};
use crate::triple::Triple;
use crate::value::Value;

/// Wire operation consumed by the publish pipeline.
///
/// `SetTriple` never carries a `Value::Image`; images travel as entity references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    #[serde(rename = "SET_TRIPLE")]
    SetTriple {
        entity_id: EntityId,
        attribute_id: EntityId,
        value: Value,
    },
    #[serde(rename = "DELETE_TRIPLE")]
    DeleteTriple {
        entity_id: EntityId,
        attribute_id: EntityId,
    },
    #[serde(rename = "CREATE_RELATION")]
    CreateRelation {
        id: EntityId,
        type_id: EntityId,
        from_id: EntityId,
        to_id: EntityId,
        index: String,
    },
    #[serde(rename = "DELETE_RELATION")]
    DeleteRelation { id: EntityId },
}

impl Op {
    /// Entity the op writes to. Relation ops report the relation's own id.
    pub fn entity_id(&self) -> &EntityId {
        match self {
            Self::SetTriple { entity_id, .. } | Self::DeleteTriple { entity_id, .. } => entity_id,
            Self::CreateRelation { id, .. } | Self::DeleteRelation { id } => id,
        }
    }

    pub fn op_type_name(&self) -> &'static str {
        match self {
            Self::SetTriple { .. } => "SET_TRIPLE",
            Self::DeleteTriple { .. } => "DELETE_TRIPLE",
            Self::CreateRelation { .. } => "CREATE_RELATION",
            Self::DeleteRelation { .. } => "DELETE_RELATION",
        }
    }

    /// Rebuilds the triple a `SET_TRIPLE` op writes into `space_id`.
    pub fn to_triple(&self, space_id: &SpaceId) -> Option<Triple> {
        match self {
            Self::SetTriple {
                entity_id,
                attribute_id,
                value,
            } => Some(Triple::new(
                space_id.clone(),
                entity_id.clone(),
                attribute_id.clone(),
                value.clone(),
            )),
            _ => None,
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}
