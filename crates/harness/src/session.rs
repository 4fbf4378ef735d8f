use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;

use kgedit_core::{Op, SpaceId, Triple};
use kgedit_engine::{ActionStore, Engine, EngineConfig, EngineError, MergedDataSource, UnstagedChanges};

use crate::remote::TestRemote;

/// An engine wired to a [`TestRemote`].
pub struct TestSession {
    pub engine: Engine,
    pub remote: Arc<TestRemote>,
}

impl TestSession {
    /// In-memory log over an empty remote.
    pub fn new() -> Self {
        Self::with_remote(Arc::new(TestRemote::new()))
    }

    pub fn with_remote(remote: Arc<TestRemote>) -> Self {
        let engine = Engine::new(EngineConfig::default(), Arc::new(ActionStore::in_memory()), remote.clone());
        Self { engine, remote }
    }

    /// Session whose log lives in SQLite at `path`.
    pub fn on_disk(path: impl AsRef<Path>, remote: Arc<TestRemote>) -> Result<Self, EngineError> {
        let config = EngineConfig {
            database_path: Some(path.as_ref().to_path_buf()),
            ..EngineConfig::default()
        };
        let engine = Engine::open(config, remote.clone())?;
        Ok(Self { engine, remote })
    }

    pub fn store(&self) -> &Arc<ActionStore> {
        self.engine.store()
    }

    pub fn source(&self) -> &MergedDataSource {
        self.engine.source()
    }

    pub fn create(&self, triples: impl IntoIterator<Item = Triple>) {
        for triple in triples {
            self.store().create(triple);
        }
    }

    /// Publishes the pending edits of `space` straight into the remote.
    pub fn publish(&self, space: &str) -> Vec<Op> {
        self.publish_staged(space, &UnstagedChanges::default())
    }

    /// Publishes the pending edits of `space` outside `unstaged`.
    pub fn publish_staged(&self, space: &str, unstaged: &UnstagedChanges) -> Vec<Op> {
        let space_id = SpaceId::from(space);
        let published = self.engine.publish_staged(&space_id, unstaged, |ops| {
            self.remote.apply_ops(&space_id, ops);
            Ok::<(), Infallible>(())
        });
        match published {
            Ok(ops) => ops,
            Err(never) => match never {},
        }
    }
}

impl Default for TestSession {
    fn default() -> Self {
        Self::new()
    }
}
