use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use kgedit_core::{EntityId, SpaceId, Triple};

use crate::config::DEFAULT_PAGE_SIZE;
use crate::entity::Entity;
use crate::table::Column;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request aborted")]
    Aborted,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Cancellation flag shared between a query and whoever may supersede it.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    aborted: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// `Err(FetchError::Aborted)` once aborted. Remote sources call this
    /// between steps of a long fetch.
    pub fn check(&self) -> Result<(), FetchError> {
        if self.is_aborted() {
            Err(FetchError::Aborted)
        } else {
            Ok(())
        }
    }
}

/// Restriction on triples, applied remotely and again to the merged result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TripleFilter {
    EntityId(EntityId),
    AttributeId(EntityId),
    EntityName(String),
    AttributeName(String),
    /// Triples whose value references the entity.
    LinkedTo(EntityId),
    /// Triples whose entity-reference value carries this name.
    Value(String),
}

impl TripleFilter {
    pub fn matches(&self, triple: &Triple) -> bool {
        match self {
            Self::EntityId(id) => &triple.entity_id == id,
            Self::AttributeId(id) => &triple.attribute_id == id,
            Self::EntityName(name) => triple.entity_name.as_deref() == Some(name.as_str()),
            Self::AttributeName(name) => triple.attribute_name.as_deref() == Some(name.as_str()),
            Self::LinkedTo(id) => triple.value.as_entity_id() == Some(id),
            Self::Value(name) => triple
                .value
                .as_entity_ref()
                .is_some_and(|r| r.name.as_deref() == Some(name.as_str())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripleQuery {
    pub space: Option<SpaceId>,
    pub query: String,
    pub filters: Vec<TripleFilter>,
    pub first: usize,
    pub skip: usize,
}

impl Default for TripleQuery {
    fn default() -> Self {
        Self {
            space: None,
            query: String::new(),
            filters: Vec::new(),
            first: DEFAULT_PAGE_SIZE,
            skip: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityQuery {
    pub space: Option<SpaceId>,
    /// Case-insensitive name search.
    pub query: String,
    pub type_ids: Vec<EntityId>,
    pub first: usize,
    pub skip: usize,
}

impl Default for EntityQuery {
    fn default() -> Self {
        Self {
            space: None,
            query: String::new(),
            type_ids: Vec::new(),
            first: DEFAULT_PAGE_SIZE,
            skip: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowQuery {
    pub space_id: SpaceId,
    /// Table filter string, as built by `create_filter_string`.
    pub filter: String,
    pub first: usize,
    pub skip: usize,
}

impl RowQuery {
    pub fn new(space_id: impl Into<SpaceId>, filter: impl Into<String>) -> Self {
        Self {
            space_id: space_id.into(),
            filter: filter.into(),
            first: DEFAULT_PAGE_SIZE,
            skip: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnQuery {
    pub space_id: SpaceId,
    pub type_ids: Vec<EntityId>,
}

/// Read side of the published graph.
///
/// Implementations may block. Every call receives the signal of the query
/// it serves and should return `FetchError::Aborted` promptly once it fires.
pub trait RemoteSource: Send + Sync {
    fn fetch_triples(&self, query: &TripleQuery, signal: &AbortSignal) -> Result<Vec<Triple>, FetchError>;

    fn fetch_entity(&self, id: &EntityId, signal: &AbortSignal) -> Result<Option<Entity>, FetchError>;

    fn fetch_entities(&self, query: &EntityQuery, signal: &AbortSignal) -> Result<Vec<Entity>, FetchError>;

    fn fetch_table_row_entities(&self, query: &RowQuery, signal: &AbortSignal) -> Result<Vec<Entity>, FetchError>;

    fn fetch_columns(&self, query: &ColumnQuery, signal: &AbortSignal) -> Result<Vec<Column>, FetchError>;
}
