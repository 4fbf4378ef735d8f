use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use kgedit_core::filter::parse_filter_string;
use kgedit_core::{system_ids, EntityId, Op, SpaceId, Triple, Value, ValueType};
use kgedit_engine::entity::{entities_from_triples, entity_from_triples};
use kgedit_engine::table::matches_filters;
use kgedit_engine::{
    AbortSignal, Column, ColumnQuery, Entity, EntityQuery, FetchError, RemoteSource, RowQuery, TripleQuery,
};

const POLL: Duration = Duration::from_millis(5);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn published(triple: Triple) -> Triple {
    Triple {
        id: triple.derived_id(),
        has_been_published: true,
        placeholder: false,
        ..triple
    }
}

fn page<T>(items: Vec<T>, skip: usize, first: usize) -> Vec<T> {
    items.into_iter().skip(skip).take(first).collect()
}

/// In-memory stand-in for the published graph.
///
/// Fetches can be held open with [`TestRemote::hold`] to exercise
/// superseding and cancellation, or failed with [`TestRemote::fail_with`].
#[derive(Default)]
pub struct TestRemote {
    triples: Mutex<Vec<Triple>>,
    failure: Mutex<Option<String>>,
    held: Mutex<bool>,
    released: Condvar,
    fetches: AtomicUsize,
    waiting: AtomicUsize,
}

impl TestRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_triples(triples: Vec<Triple>) -> Self {
        let remote = Self::new();
        remote.insert(triples);
        remote
    }

    /// Adds published triples. Multi-valued attributes such as `TYPES` may
    /// hold several triples at one position.
    pub fn insert(&self, triples: Vec<Triple>) {
        lock(&self.triples).extend(triples.into_iter().map(published));
    }

    /// Writes `triple` over whatever sits at its position.
    fn set(&self, triple: Triple) {
        let triple = published(triple);
        let mut stored = lock(&self.triples);
        stored.retain(|t| t.id != triple.id);
        stored.push(triple);
    }

    pub fn triples(&self) -> Vec<Triple> {
        lock(&self.triples).clone()
    }

    /// Applies published ops to the graph, as the indexer would.
    pub fn apply_ops(&self, space_id: &SpaceId, ops: &[Op]) {
        debug!(space = %space_id, ops = ops.len(), "applying published ops");
        for op in ops {
            match op {
                Op::SetTriple { .. } => {
                    if let Some(triple) = op.to_triple(space_id) {
                        self.set(triple);
                    }
                }
                Op::DeleteTriple {
                    entity_id,
                    attribute_id,
                } => lock(&self.triples).retain(|t| {
                    !(&t.space_id == space_id && &t.entity_id == entity_id && &t.attribute_id == attribute_id)
                }),
                Op::CreateRelation {
                    id,
                    type_id,
                    from_id,
                    to_id,
                    index,
                } => self.insert(vec![
                    Triple::new(
                        space_id.clone(),
                        id.clone(),
                        system_ids::TYPES,
                        Value::entity(system_ids::RELATION_TYPE, None),
                    ),
                    Triple::new(
                        space_id.clone(),
                        id.clone(),
                        system_ids::RELATION_TYPE_ATTRIBUTE,
                        Value::entity(type_id.clone(), None),
                    ),
                    Triple::new(
                        space_id.clone(),
                        id.clone(),
                        system_ids::RELATION_FROM_ATTRIBUTE,
                        Value::entity(from_id.clone(), None),
                    ),
                    Triple::new(
                        space_id.clone(),
                        id.clone(),
                        system_ids::RELATION_TO_ATTRIBUTE,
                        Value::entity(to_id.clone(), None),
                    ),
                    Triple::new(space_id.clone(), id.clone(), system_ids::RELATION_INDEX, Value::text(index.clone())),
                ]),
                Op::DeleteRelation { id } => {
                    lock(&self.triples).retain(|t| !(&t.space_id == space_id && &t.entity_id == id))
                }
            }
        }
    }

    /// Makes every later fetch fail with a transport error, or succeed again.
    pub fn fail_with(&self, reason: Option<&str>) {
        *lock(&self.failure) = reason.map(str::to_string);
    }

    /// Blocks fetches until [`TestRemote::release`] or until their signal fires.
    pub fn hold(&self) {
        *lock(&self.held) = true;
    }

    pub fn release(&self) {
        *lock(&self.held) = false;
        self.released.notify_all();
    }

    /// Number of fetches currently blocked by [`TestRemote::hold`].
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Blocks until `count` fetches are held, or gives up after `timeout`.
    pub fn wait_for_waiting(&self, count: usize, timeout: Duration) -> bool {
        let mut waited = Duration::ZERO;
        while self.waiting() < count {
            if waited >= timeout {
                return false;
            }
            std::thread::sleep(POLL);
            waited += POLL;
        }
        true
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn enter(&self, signal: &AbortSignal) -> Result<(), FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut held = lock(&self.held);
        if *held {
            self.waiting.fetch_add(1, Ordering::SeqCst);
            while *held && !signal.is_aborted() {
                held = self
                    .released
                    .wait_timeout(held, POLL)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
            self.waiting.fetch_sub(1, Ordering::SeqCst);
        }
        drop(held);
        signal.check()?;
        match lock(&self.failure).as_ref() {
            Some(reason) => Err(FetchError::Transport(reason.clone())),
            None => Ok(()),
        }
    }

    fn entities(&self) -> Vec<Entity> {
        entities_from_triples(&self.triples())
    }
}

impl RemoteSource for TestRemote {
    fn fetch_triples(&self, query: &TripleQuery, signal: &AbortSignal) -> Result<Vec<Triple>, FetchError> {
        self.enter(signal)?;
        let needle = query.query.to_lowercase();
        let matching: Vec<Triple> = self
            .triples()
            .into_iter()
            .filter(|t| query.space.as_ref().is_none_or(|space| &t.space_id == space))
            .filter(|t| query.filters.iter().all(|f| f.matches(t)))
            .filter(|t| {
                needle.is_empty()
                    || t.entity_name
                        .as_deref()
                        .is_some_and(|name| name.to_lowercase().contains(&needle))
            })
            .collect();
        Ok(page(matching, query.skip, query.first))
    }

    fn fetch_entity(&self, id: &EntityId, signal: &AbortSignal) -> Result<Option<Entity>, FetchError> {
        self.enter(signal)?;
        Ok(entity_from_triples(id, &self.triples()))
    }

    fn fetch_entities(&self, query: &EntityQuery, signal: &AbortSignal) -> Result<Vec<Entity>, FetchError> {
        self.enter(signal)?;
        let needle = query.query.to_lowercase();
        let matching: Vec<Entity> = self
            .entities()
            .into_iter()
            .filter(|e| {
                e.name
                    .as_deref()
                    .is_some_and(|name| name.to_lowercase().contains(&needle))
            })
            .filter(|e| query.type_ids.is_empty() || e.types.iter().any(|t| query.type_ids.contains(&t.id)))
            .filter(|e| {
                query
                    .space
                    .as_ref()
                    .is_none_or(|space| e.name_triple_spaces.contains(space))
            })
            .collect();
        Ok(page(matching, query.skip, query.first))
    }

    fn fetch_table_row_entities(&self, query: &RowQuery, signal: &AbortSignal) -> Result<Vec<Entity>, FetchError> {
        self.enter(signal)?;
        let parsed = parse_filter_string(&query.filter).map_err(|e| FetchError::Transport(e.to_string()))?;
        let Some(type_id) = parsed.type_id else {
            return Ok(Vec::new());
        };
        let matching: Vec<Entity> = self
            .entities()
            .into_iter()
            .filter(|e| e.has_type(&type_id) && matches_filters(e, &parsed.clauses))
            .collect();
        Ok(page(matching, query.skip, query.first))
    }

    fn fetch_columns(&self, query: &ColumnQuery, signal: &AbortSignal) -> Result<Vec<Column>, FetchError> {
        self.enter(signal)?;
        let mut columns = vec![Column::name_column()];
        let Some(type_id) = query.type_ids.first() else {
            return Ok(columns);
        };

        let triples = self.triples();
        let value_types: HashMap<&EntityId, ValueType> = triples
            .iter()
            .filter(|t| t.is_attribute(system_ids::VALUE_TYPE))
            .filter_map(|t| {
                t.value
                    .as_entity_id()
                    .map(|id| (&t.entity_id, ValueType::from_system_id(id.as_str())))
            })
            .collect();

        for t in triples
            .iter()
            .filter(|t| &t.entity_id == type_id && t.is_attribute(system_ids::ATTRIBUTES))
        {
            let Some(attribute) = t.value.as_entity_ref() else {
                continue;
            };
            if columns.iter().any(|c| c.id == attribute.id) {
                continue;
            }
            let value_type = value_types.get(&attribute.id).copied().unwrap_or(ValueType::Text);
            columns.push(Column::new(attribute.id, attribute.name, value_type));
        }
        Ok(columns)
    }
}
