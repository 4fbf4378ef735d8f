use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::EntityId;
use crate::system_ids;

/// Reference to another entity together with the name cached at read time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: EntityId,
    pub name: Option<String>,
}

impl EntityRef {
    pub fn new(id: impl Into<EntityId>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionItemEntity {
    pub id: EntityId,
    pub name: Option<String>,
    pub types: Vec<EntityRef>,
}

/// One ordered member of a collection. Position is defined by `index`, a
/// fractional-index string compared bytewise, never by array position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionItem {
    pub id: EntityId,
    pub collection_id: EntityId,
    pub entity: CollectionItemEntity,
    pub index: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Number(String),
    Url(String),
    /// ISO-8601 UTC timestamp.
    Time(String),
    Checkbox(String),
    Entity {
        id: EntityId,
        name: Option<String>,
    },
    /// App-local projection of an image entity. Published as an entity reference.
    Image {
        id: EntityId,
        image_value: String,
    },
    Collection {
        id: EntityId,
        items: Vec<CollectionItem>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Text,
    Number,
    Url,
    Time,
    Checkbox,
    Entity,
    Image,
    Collection,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Number => "NUMBER",
            Self::Url => "URL",
            Self::Time => "TIME",
            Self::Checkbox => "CHECKBOX",
            Self::Entity => "ENTITY",
            Self::Image => "IMAGE",
            Self::Collection => "COLLECTION",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "TEXT" => Ok(Self::Text),
            "NUMBER" => Ok(Self::Number),
            "URL" => Ok(Self::Url),
            "TIME" => Ok(Self::Time),
            "CHECKBOX" => Ok(Self::Checkbox),
            "ENTITY" => Ok(Self::Entity),
            "IMAGE" => Ok(Self::Image),
            "COLLECTION" => Ok(Self::Collection),
            _ => Err(CoreError::InvalidData(format!("unknown value type: {s}"))),
        }
    }

    /// Maps the system entity an attribute declares as its `VALUE_TYPE`.
    /// Unknown ids fall back to text, which is how attributes without a
    /// declared type are rendered.
    pub fn from_system_id(id: &str) -> Self {
        match id {
            system_ids::RELATION => Self::Entity,
            system_ids::DATE => Self::Time,
            system_ids::WEB_URL => Self::Url,
            system_ids::IMAGE => Self::Image,
            system_ids::CHECKBOX => Self::Checkbox,
            system_ids::NUMBER => Self::Number,
            system_ids::COLLECTION_TYPE => Self::Collection,
            _ => Self::Text,
        }
    }
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn entity(id: impl Into<EntityId>, name: Option<&str>) -> Self {
        Self::Entity {
            id: id.into(),
            name: name.map(str::to_string),
        }
    }

    /// Blank value of the given kind, as used for placeholder rows.
    pub fn empty(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Text => Self::Text(String::new()),
            ValueType::Number => Self::Number(String::new()),
            ValueType::Url => Self::Url(String::new()),
            ValueType::Time => Self::Time(String::new()),
            ValueType::Checkbox => Self::Checkbox(String::new()),
            ValueType::Entity => Self::Entity {
                id: EntityId::default(),
                name: None,
            },
            ValueType::Image => Self::Image {
                id: EntityId::generate(),
                image_value: String::new(),
            },
            ValueType::Collection => Self::Collection {
                id: EntityId::generate(),
                items: Vec::new(),
            },
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Text(_) => ValueType::Text,
            Self::Number(_) => ValueType::Number,
            Self::Url(_) => ValueType::Url,
            Self::Time(_) => ValueType::Time,
            Self::Checkbox(_) => ValueType::Checkbox,
            Self::Entity { .. } => ValueType::Entity,
            Self::Image { .. } => ValueType::Image,
            Self::Collection { .. } => ValueType::Collection,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_entity_id(&self) -> Option<&EntityId> {
        match self {
            Self::Entity { id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn as_entity_ref(&self) -> Option<EntityRef> {
        match self {
            Self::Entity { id, name } => Some(EntityRef {
                id: id.clone(),
                name: name.clone(),
            }),
            _ => None,
        }
    }

    /// Id of the entity this value points at, for entity-like variants.
    pub fn referenced_id(&self) -> Option<&EntityId> {
        match self {
            Self::Entity { id, .. } | Self::Image { id, .. } | Self::Collection { id, .. } => {
                Some(id)
            }
            _ => None,
        }
    }

    /// Comparable string payload of the value.
    pub fn raw(&self) -> &str {
        match self {
            Self::Text(s) | Self::Number(s) | Self::Url(s) | Self::Time(s) | Self::Checkbox(s) => s,
            Self::Entity { id, .. } | Self::Collection { id, .. } => id.as_str(),
            Self::Image { image_value, .. } => image_value,
        }
    }

    /// Overwrites the cached name of an entity reference. No-op for other variants.
    pub fn set_entity_name(&mut self, new_name: &str) {
        if let Self::Entity { name, .. } = self {
            *name = Some(new_name.to_string());
        }
    }
}
