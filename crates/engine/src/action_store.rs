use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use kgedit_core::{Action, EntityId, SpaceActions, SpaceId, Triple, TripleId};
use kgedit_storage::{ActionPersistence, SqliteStorage};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::publish::UnstagedChanges;
use crate::squash::{squash_changes, unpublished};

pub type SubscriptionId = u64;

type Listener = Arc<dyn Fn(u64) + Send + Sync>;

/// Views derived from one version of the log.
#[derive(Debug, Clone, Default)]
pub struct LogSnapshot {
    pub version: u64,
    pub actions: SpaceActions,
    /// Every action of every space, spaces in id order.
    pub all_actions: Vec<Action>,
    /// Spaces whose unpublished actions still add up to at least one change.
    pub spaces_with_unpublished_changes: Vec<SpaceId>,
    /// Latest triple per entity and attribute. Deletes appear as tombstones.
    pub actions_by_entity_id: BTreeMap<EntityId, BTreeMap<EntityId, Triple>>,
}

impl LogSnapshot {
    fn build(version: u64, actions: &SpaceActions) -> Self {
        let all_actions: Vec<Action> = actions.values().flatten().cloned().collect();

        let spaces_with_unpublished_changes = actions
            .iter()
            .filter(|(_, log)| !squash_changes(&unpublished(log)).is_empty())
            .map(|(space, _)| space.clone())
            .collect();

        let mut actions_by_entity_id: BTreeMap<EntityId, BTreeMap<EntityId, Triple>> = BTreeMap::new();
        for action in &all_actions {
            let triple = match action {
                Action::Delete(t) => t.clone().tombstoned(),
                other => other.triple().clone(),
            };
            actions_by_entity_id
                .entry(triple.entity_id.clone())
                .or_default()
                .insert(triple.attribute_id.clone(), triple);
        }

        Self {
            version,
            actions: actions.clone(),
            all_actions,
            spaces_with_unpublished_changes,
            actions_by_entity_id,
        }
    }

    pub fn actions_for_space(&self, space_id: &SpaceId) -> &[Action] {
        self.actions.get(space_id).map(Vec::as_slice).unwrap_or_default()
    }
}

struct Inner {
    actions: SpaceActions,
    persistence: Option<Box<dyn ActionPersistence>>,
    persist_published: bool,
    version: u64,
    snapshot: Option<Arc<LogSnapshot>>,
}

impl Inner {
    fn persist_space(&self, space_id: &SpaceId) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let log = self.actions.get(space_id).map(Vec::as_slice).unwrap_or_default();
        let kept = if self.persist_published {
            log.to_vec()
        } else {
            unpublished(log)
        };
        if let Err(e) = persistence.save_space(space_id, &kept) {
            warn!(space = %space_id, error = %e, "failed to persist space actions");
        }
    }

    fn persist_all(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        if let Err(e) = persistence.delete_all() {
            warn!(error = %e, "failed to clear persisted actions");
        }
        for space_id in self.actions.keys() {
            self.persist_space(space_id);
        }
    }

    fn append(&mut self, action: Action) -> SpaceId {
        let space_id = action.space_id().clone();
        self.actions.entry(space_id.clone()).or_default().push(action);
        space_id
    }

    fn bump(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}

/// Local, per-space log of edit intents.
///
/// Shared between readers and writers behind an `Arc`. Every mutation bumps
/// the version, writes the touched spaces through to persistence and then
/// notifies subscribers. Persistence failures are logged, never returned.
pub struct ActionStore {
    inner: Mutex<Inner>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
}

impl ActionStore {
    pub fn new(persistence: Option<Box<dyn ActionPersistence>>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                actions: SpaceActions::new(),
                persistence,
                persist_published: false,
                version: 0,
                snapshot: None,
            }),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Store hydrated from whatever `persistence` already holds.
    pub fn open(persistence: Box<dyn ActionPersistence>) -> Result<Self, EngineError> {
        let actions = persistence.load_all()?;
        debug!(spaces = actions.len(), "hydrated action store");
        let store = Self::new(Some(persistence));
        store.lock().actions = actions;
        Ok(store)
    }

    /// Opens SQLite at the configured path, or in memory when none is set.
    pub fn open_with_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let storage = match &config.database_path {
            Some(path) => SqliteStorage::open(path)?,
            None => SqliteStorage::open_in_memory()?,
        };
        let store = Self::open(Box::new(storage))?;
        store.lock().persist_published = config.persist_published;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, version: u64) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(version);
        }
    }

    fn commit(&self, mut inner: MutexGuard<'_, Inner>) {
        let version = inner.bump();
        drop(inner);
        self.notify(version);
    }

    fn push(&self, action: Action) {
        let mut inner = self.lock();
        let space_id = inner.append(action);
        inner.persist_space(&space_id);
        self.commit(inner);
    }

    pub fn create(&self, triple: Triple) {
        self.push(Action::Create(Triple {
            is_deleted: false,
            has_been_published: false,
            ..triple
        }));
    }

    /// Records `triple` as the new state of `old_triple`. The new triple
    /// keeps `old_triple`'s id.
    pub fn update(&self, triple: Triple, old_triple: Triple) {
        self.push(Action::edit(old_triple, triple));
    }

    pub fn remove(&self, triple: Triple) {
        self.push(Action::Delete(Triple {
            has_been_published: false,
            ..triple.tombstoned()
        }));
    }

    /// Replaces the whole log.
    pub fn restore(&self, actions: SpaceActions) {
        let mut inner = self.lock();
        inner.actions = actions;
        inner.persist_all();
        self.commit(inner);
    }

    /// Clears one space, or every space when `space_id` is `None`.
    pub fn clear(&self, space_id: Option<&SpaceId>) {
        let mut inner = self.lock();
        match space_id {
            Some(space_id) => {
                inner.actions.remove(space_id);
                inner.persist_space(space_id);
            }
            None => {
                inner.actions.clear();
                if let Some(persistence) = &inner.persistence
                    && let Err(e) = persistence.delete_all()
                {
                    warn!(error = %e, "failed to clear persisted actions");
                }
            }
        }
        self.commit(inner);
    }

    /// Drops the actions of `space_id` whose id is listed.
    pub fn delete_actions(&self, space_id: &SpaceId, action_ids: &[TripleId]) {
        let ids: HashSet<&TripleId> = action_ids.iter().collect();
        let mut inner = self.lock();
        if let Some(log) = inner.actions.get_mut(space_id) {
            log.retain(|a| !ids.contains(a.id()));
            if log.is_empty() {
                inner.actions.remove(space_id);
            }
        }
        inner.persist_space(space_id);
        self.commit(inner);
    }

    /// Appends each batch to its space, in order.
    pub fn add_actions_to_spaces(&self, batches: SpaceActions) {
        let mut inner = self.lock();
        for (space_id, actions) in batches {
            if actions.is_empty() {
                continue;
            }
            inner.actions.entry(space_id.clone()).or_default().extend(actions);
            inner.persist_space(&space_id);
        }
        self.commit(inner);
    }

    pub fn add_actions(&self, space_id: &SpaceId, actions: Vec<Action>) {
        let mut batch = SpaceActions::new();
        batch.insert(space_id.clone(), actions);
        self.add_actions_to_spaces(batch);
    }

    /// Flags every action of `space_id` as published.
    pub fn mark_published(&self, space_id: &SpaceId) {
        self.mark_staged_published(space_id, &UnstagedChanges::default());
    }

    /// Flags the actions of `space_id` outside `unstaged` as published. Held
    /// actions stay pending and move behind the published ones.
    pub fn mark_staged_published(&self, space_id: &SpaceId, unstaged: &UnstagedChanges) {
        let mut inner = self.lock();
        if let Some(log) = inner.actions.get_mut(space_id) {
            let (staged, held) = unstaged.split(log.drain(..).collect());
            log.extend(staged.into_iter().map(Action::mark_published));
            log.extend(held);
        }
        inner.persist_space(space_id);
        self.commit(inner);
    }

    pub fn actions_for_space(&self, space_id: &SpaceId) -> Vec<Action> {
        self.lock().actions.get(space_id).cloned().unwrap_or_default()
    }

    pub fn all_actions(&self) -> Vec<Action> {
        self.lock().actions.values().flatten().cloned().collect()
    }

    pub fn version(&self) -> u64 {
        self.lock().version
    }

    /// Derived views of the current log, built once per version.
    pub fn snapshot(&self) -> Arc<LogSnapshot> {
        let mut inner = self.lock();
        if let Some(snapshot) = &inner.snapshot
            && snapshot.version == inner.version
        {
            return Arc::clone(snapshot);
        }
        let snapshot = Arc::new(LogSnapshot::build(inner.version, &inner.actions));
        inner.snapshot = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// Registers `listener`, called with the new version after every mutation.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }
}
