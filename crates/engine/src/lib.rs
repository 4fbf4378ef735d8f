pub mod action_store;
pub mod collection;
pub mod config;
pub mod data_source;
pub mod entity;
pub mod error;
pub mod merge;
pub mod publish;
pub mod relation;
pub mod remote;
pub mod squash;
pub mod table;

pub use action_store::{ActionStore, LogSnapshot, SubscriptionId};
pub use collection::Collection;
pub use config::EngineConfig;
pub use data_source::{Fetched, MergedDataSource, QueryKey};
pub use entity::Entity;
pub use error::EngineError;
pub use merge::{merge, with_local_names, RenameOverlay};
pub use publish::UnstagedChanges;
pub use relation::{Relation, RenderableType, ToEntityRef};
pub use remote::{
    AbortSignal, ColumnQuery, EntityQuery, FetchError, RemoteSource, RowQuery, TripleFilter, TripleQuery,
};
pub use squash::{squash, squash_changes};
pub use table::{Cell, Column, Row};

use std::sync::Arc;

use tracing::info;

use kgedit_core::{Op, SpaceId};

use crate::publish::prepare_actions_for_publishing;

/// Local editing session: the action log, the merged read path over a
/// remote source, and the publish hand-off.
pub struct Engine {
    config: EngineConfig,
    store: Arc<ActionStore>,
    source: MergedDataSource,
}

impl Engine {
    pub fn new(config: EngineConfig, store: Arc<ActionStore>, remote: Arc<dyn RemoteSource>) -> Self {
        let source = MergedDataSource::new(remote, Arc::clone(&store));
        Self { config, store, source }
    }

    /// Opens the configured action log and hydrates it.
    pub fn open(config: EngineConfig, remote: Arc<dyn RemoteSource>) -> Result<Self, EngineError> {
        let store = Arc::new(ActionStore::open_with_config(&config)?);
        info!(
            database = ?config.database_path,
            actions = store.all_actions().len(),
            "opened engine"
        );
        Ok(Self::new(config, store, remote))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ActionStore> {
        &self.store
    }

    pub fn source(&self) -> &MergedDataSource {
        &self.source
    }

    /// Name search over entities, paged by the configured page size.
    pub fn entity_query(&self, query: impl Into<String>) -> EntityQuery {
        EntityQuery {
            query: query.into(),
            first: self.config.page_size,
            ..EntityQuery::default()
        }
    }

    /// Table rows of `space_id` under `filter`, paged by the configured page size.
    pub fn row_query(&self, space_id: impl Into<SpaceId>, filter: impl Into<String>) -> RowQuery {
        RowQuery {
            first: self.config.page_size,
            ..RowQuery::new(space_id, filter)
        }
    }

    /// Ops that would publish the pending edits of `space_id`.
    pub fn pending_ops(&self, space_id: &SpaceId) -> Vec<Op> {
        self.staged_ops(space_id, &UnstagedChanges::default())
    }

    /// Ops for the pending edits of `space_id`, leaving out the positions in
    /// `unstaged`.
    pub fn staged_ops(&self, space_id: &SpaceId, unstaged: &UnstagedChanges) -> Vec<Op> {
        let (staged, _) = unstaged.split(self.store.actions_for_space(space_id));
        prepare_actions_for_publishing(&staged, space_id)
    }

    /// Hands the pending ops of `space_id` to `send`. When it succeeds the
    /// space's actions are marked published and the ops are returned.
    pub fn publish<E>(&self, space_id: &SpaceId, send: impl FnOnce(&[Op]) -> Result<(), E>) -> Result<Vec<Op>, E> {
        self.publish_staged(space_id, &UnstagedChanges::default(), send)
    }

    /// Like [`Engine::publish`], but edits at the positions in `unstaged`
    /// are neither sent nor marked published.
    pub fn publish_staged<E>(
        &self,
        space_id: &SpaceId,
        unstaged: &UnstagedChanges,
        send: impl FnOnce(&[Op]) -> Result<(), E>,
    ) -> Result<Vec<Op>, E> {
        let ops = self.staged_ops(space_id, unstaged);
        if ops.is_empty() {
            return Ok(ops);
        }
        send(&ops)?;
        self.store.mark_staged_published(space_id, unstaged);
        info!(space = %space_id, ops = ops.len(), held = unstaged.len(), "published space");
        Ok(ops)
    }
}
