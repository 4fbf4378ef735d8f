use kgedit_core::{Action, SpaceActions, SpaceId};

use crate::error::StorageError;

/// Summary row for one persisted space log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceRecord {
    pub space_id: SpaceId,
    pub action_count: usize,
    /// Unix milliseconds of the last write.
    pub updated_at: i64,
}

/// Durable home of the local action log, keyed by space.
///
/// Implementations store only what they are given; callers decide which
/// actions are worth keeping across restarts.
pub trait ActionPersistence: Send {
    /// Replaces the stored log of `space_id`. An empty slice removes the space.
    fn save_space(&self, space_id: &SpaceId, actions: &[Action]) -> Result<(), StorageError>;

    fn load_space(&self, space_id: &SpaceId) -> Result<Vec<Action>, StorageError>;

    fn load_all(&self) -> Result<SpaceActions, StorageError>;

    fn list_spaces(&self) -> Result<Vec<SpaceRecord>, StorageError>;

    fn delete_space(&self, space_id: &SpaceId) -> Result<(), StorageError>;

    fn delete_all(&self) -> Result<(), StorageError>;
}
