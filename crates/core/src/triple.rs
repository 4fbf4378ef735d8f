use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, SpaceId, TripleId};
use crate::value::{Value, ValueType};

/// Grouping key used by squash and the derived views: one live fact per
/// `(entity, attribute)` pair.
pub type TripleKey = (EntityId, EntityId);

/// One entity–attribute–value fact inside a space.
///
/// `id` is assigned when the triple is first created and is carried unchanged
/// through every later edit of its value or attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    pub id: TripleId,
    pub space_id: SpaceId,
    pub entity_id: EntityId,
    pub entity_name: Option<String>,
    pub attribute_id: EntityId,
    pub attribute_name: Option<String>,
    pub value: Value,
    pub placeholder: bool,
    /// Local tombstone.
    pub is_deleted: bool,
    pub has_been_published: bool,
}

impl Triple {
    pub fn new(
        space_id: impl Into<SpaceId>,
        entity_id: impl Into<EntityId>,
        attribute_id: impl Into<EntityId>,
        value: Value,
    ) -> Self {
        let space_id = space_id.into();
        let entity_id = entity_id.into();
        let attribute_id = attribute_id.into();
        Self {
            id: TripleId::derive(&space_id, &entity_id, &attribute_id),
            space_id,
            entity_id,
            entity_name: None,
            attribute_id,
            attribute_name: None,
            value,
            placeholder: false,
            is_deleted: false,
            has_been_published: false,
        }
    }

    /// Blank triple with no attribute yet. Gets a unique id rather than a
    /// derived one so several blanks on one entity can coexist.
    pub fn empty(space_id: impl Into<SpaceId>, entity_id: impl Into<EntityId>, value_type: ValueType) -> Self {
        Self {
            id: TripleId::unique(),
            space_id: space_id.into(),
            entity_id: entity_id.into(),
            entity_name: None,
            attribute_id: EntityId::default(),
            attribute_name: None,
            value: Value::empty(value_type),
            placeholder: true,
            is_deleted: false,
            has_been_published: false,
        }
    }

    pub fn with_entity_name(mut self, name: impl Into<String>) -> Self {
        self.entity_name = Some(name.into());
        self
    }

    pub fn with_attribute_name(mut self, name: impl Into<String>) -> Self {
        self.attribute_name = Some(name.into());
        self
    }

    /// Same fact with a new value. The id is kept.
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self.placeholder = false;
        self
    }

    /// Same fact moved to another attribute. The id is kept.
    pub fn with_attribute(mut self, attribute_id: impl Into<EntityId>, name: Option<String>) -> Self {
        self.attribute_id = attribute_id.into();
        self.attribute_name = name;
        self.placeholder = false;
        self
    }

    pub fn tombstoned(mut self) -> Self {
        self.is_deleted = true;
        self
    }

    pub fn published(mut self) -> Self {
        self.has_been_published = true;
        self
    }

    pub fn key(&self) -> TripleKey {
        (self.entity_id.clone(), self.attribute_id.clone())
    }

    /// Id this triple's position would have if it were created fresh.
    pub fn derived_id(&self) -> TripleId {
        TripleId::derive(&self.space_id, &self.entity_id, &self.attribute_id)
    }

    pub fn is_attribute(&self, attribute_id: &str) -> bool {
        self.attribute_id.as_str() == attribute_id
    }
}
