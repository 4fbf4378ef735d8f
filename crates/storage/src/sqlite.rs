use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use kgedit_core::{Action, SpaceActions, SpaceId};

use crate::error::StorageError;
use crate::traits::{ActionPersistence, SpaceRecord};

fn encode_actions(actions: &[Action]) -> Result<Vec<u8>, StorageError> {
    rmp_serde::to_vec(actions).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode_actions(bytes: &[u8], space_id: &str) -> Result<Vec<Action>, StorageError> {
    rmp_serde::from_slice(bytes)
        .map_err(|e| StorageError::Serialization(format!("space {space_id}: {e}")))
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

impl ActionPersistence for SqliteStorage {
    fn save_space(&self, space_id: &SpaceId, actions: &[Action]) -> Result<(), StorageError> {
        if actions.is_empty() {
            return self.delete_space(space_id);
        }
        let bytes = encode_actions(actions)?;
        self.conn.execute(
            "INSERT INTO space_actions (space_id, actions, action_count) VALUES (?1, ?2, ?3)
             ON CONFLICT(space_id) DO UPDATE SET actions = excluded.actions, action_count = excluded.action_count, updated_at = excluded.updated_at",
            rusqlite::params![space_id.as_str(), bytes, actions.len() as i64],
        )?;
        debug!(space = %space_id, count = actions.len(), "saved space actions");
        Ok(())
    }

    fn load_space(&self, space_id: &SpaceId) -> Result<Vec<Action>, StorageError> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT actions FROM space_actions WHERE space_id = ?1",
                rusqlite::params![space_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match bytes {
            Some(bytes) => decode_actions(&bytes, space_id.as_str()),
            None => Ok(Vec::new()),
        }
    }

    fn load_all(&self) -> Result<SpaceActions, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT space_id, actions FROM space_actions ORDER BY space_id")?;
        let rows = stmt.query_map([], |row| {
            let space_id: String = row.get(0)?;
            let bytes: Vec<u8> = row.get(1)?;
            Ok((space_id, bytes))
        })?;

        let mut result = SpaceActions::new();
        for row in rows {
            let (space_id, bytes) = row?;
            let actions = decode_actions(&bytes, &space_id)?;
            result.insert(SpaceId::from(space_id), actions);
        }
        debug!(spaces = result.len(), "loaded persisted actions");
        Ok(result)
    }

    fn list_spaces(&self) -> Result<Vec<SpaceRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT space_id, action_count, updated_at FROM space_actions ORDER BY space_id",
        )?;
        let rows = stmt.query_map([], |row| {
            let space_id: String = row.get(0)?;
            let action_count: i64 = row.get(1)?;
            let updated_at: i64 = row.get(2)?;
            Ok((space_id, action_count, updated_at))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (space_id, action_count, updated_at) = row?;
            let action_count = usize::try_from(action_count).map_err(|_| {
                StorageError::Serialization(format!("negative action count for {space_id}"))
            })?;
            result.push(SpaceRecord {
                space_id: SpaceId::from(space_id),
                action_count,
                updated_at,
            });
        }
        Ok(result)
    }

    fn delete_space(&self, space_id: &SpaceId) -> Result<(), StorageError> {
        self.conn.execute(
            "DELETE FROM space_actions WHERE space_id = ?1",
            rusqlite::params![space_id.as_str()],
        )?;
        Ok(())
    }

    fn delete_all(&self) -> Result<(), StorageError> {
        self.conn.execute("DELETE FROM space_actions", [])?;
        Ok(())
    }
}
