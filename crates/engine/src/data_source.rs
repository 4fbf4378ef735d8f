use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, warn};

use kgedit_core::filter::{parse_filter_string, FilterClause};
use kgedit_core::{system_ids, EntityId, SpaceId, Triple};

use crate::action_store::ActionStore;
use crate::collection::resolve_collection_values;
use crate::entity::{entities_from_triples, merge_actions_with_entities, merge_entity, Entity};
use crate::merge::{merge, with_local_names, RenameOverlay};
use crate::relation::{relations_for_entity, relations_from_triples, Relation};
use crate::remote::{
    AbortSignal, ColumnQuery, EntityQuery, FetchError, RemoteSource, RowQuery, TripleFilter, TripleQuery,
};
use crate::squash::squash;
use crate::table::{columns_from_local_changes, matches_filters, rows_from_entities, Column, Row};

/// Result of one read through the merged data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<T> {
    /// Freshly fetched and merged.
    Ready(T),
    /// The read was superseded or cancelled; this is the last value resolved
    /// for the same query.
    Retained(T),
    /// The read was superseded or cancelled before anything was resolved.
    Pending,
}

impl<T> Fetched<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Ready(v) | Self::Retained(v) => Some(v),
            Self::Pending => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Ready(v) | Self::Retained(v) => Some(v),
            Self::Pending => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Identity of a read: the method plus its full argument set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn new(method: &str, args: &impl Serialize) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(method.as_bytes());
        hasher.update(&[0]);
        match rmp_serde::to_vec(args) {
            Ok(bytes) => {
                hasher.update(&bytes);
            }
            Err(e) => warn!(method, error = %e, "query arguments did not serialize"),
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

struct InFlight {
    token: u64,
    signal: AbortSignal,
}

type Resolved = Arc<dyn Any + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reads remote data with the local action log layered on top.
///
/// Each read supersedes an in-flight read with the same [`QueryKey`]. The
/// local log is read after the remote fetch returns, so edits made while a
/// fetch is pending are part of the merged result.
pub struct MergedDataSource {
    remote: Arc<dyn RemoteSource>,
    store: Arc<ActionStore>,
    in_flight: Mutex<HashMap<QueryKey, InFlight>>,
    resolved: Mutex<HashMap<QueryKey, Resolved>>,
    next_token: AtomicU64,
}

impl MergedDataSource {
    pub fn new(remote: Arc<dyn RemoteSource>, store: Arc<ActionStore>) -> Self {
        Self {
            remote,
            store,
            in_flight: Mutex::new(HashMap::new()),
            resolved: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    pub fn store(&self) -> &Arc<ActionStore> {
        &self.store
    }

    fn begin(&self, key: &QueryKey) -> (u64, AbortSignal) {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let signal = AbortSignal::new();
        let previous = lock(&self.in_flight).insert(
            key.clone(),
            InFlight {
                token,
                signal: signal.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.signal.abort();
            debug!(key = key.as_str(), superseded = previous.token, token, "superseded in-flight query");
        }
        (token, signal)
    }

    fn finish(&self, key: &QueryKey, token: u64) {
        let mut in_flight = lock(&self.in_flight);
        if in_flight.get(key).is_some_and(|f| f.token == token) {
            in_flight.remove(key);
        }
    }

    fn retained<T>(&self, key: &QueryKey) -> Fetched<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        lock(&self.resolved)
            .get(key)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
            .map_or(Fetched::Pending, Fetched::Retained)
    }

    /// Runs `read` under a fresh signal for `key`, superseding any read in
    /// flight for the same key.
    fn run<T, F>(&self, key: QueryKey, read: F) -> Fetched<T>
    where
        T: Clone + Default + Send + Sync + 'static,
        F: FnOnce(&AbortSignal) -> Result<T, FetchError>,
    {
        let (token, signal) = self.begin(&key);
        let outcome = read(&signal);
        self.finish(&key, token);

        match outcome {
            Err(FetchError::Aborted) => self.retained(&key),
            _ if signal.is_aborted() => self.retained(&key),
            Ok(value) => {
                lock(&self.resolved).insert(key, Arc::new(value.clone()));
                Fetched::Ready(value)
            }
            Err(FetchError::Transport(reason)) => {
                warn!(key = key.as_str(), %reason, "remote fetch failed");
                Fetched::Ready(T::default())
            }
        }
    }

    /// Aborts the read in flight for `key`, if any.
    pub fn cancel(&self, key: &QueryKey) {
        if let Some(in_flight) = lock(&self.in_flight).remove(key) {
            in_flight.signal.abort();
        }
    }

    pub fn cancel_all(&self) {
        for (_, in_flight) in lock(&self.in_flight).drain() {
            in_flight.signal.abort();
        }
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    pub fn triples_key(query: &TripleQuery) -> QueryKey {
        QueryKey::new("fetch_triples", query)
    }

    pub fn entities_key(query: &EntityQuery) -> QueryKey {
        QueryKey::new("fetch_entities", query)
    }

    pub fn entity_key(id: &EntityId) -> QueryKey {
        QueryKey::new("fetch_entity", id)
    }

    pub fn columns_key(query: &ColumnQuery) -> QueryKey {
        QueryKey::new("columns", query)
    }

    pub fn rows_key(query: &RowQuery, columns: &[Column], selected_type: Option<&EntityId>) -> QueryKey {
        let column_ids: Vec<&EntityId> = columns.iter().map(|c| &c.id).collect();
        QueryKey::new("rows", &(query, column_ids, selected_type))
    }

    pub fn relations_key(entity_id: &EntityId, space: Option<&SpaceId>) -> QueryKey {
        QueryKey::new("relations", &(entity_id, space))
    }

    /// Remote triples of `query.space` with that space's local actions
    /// applied. The query's triple filters are applied to the merged result.
    /// Without a space the remote triples are returned as fetched.
    ///
    /// Local names are taken from every space, so a rename made elsewhere
    /// still reaches the triples of `query.space`.
    pub fn fetch_triples(&self, query: &TripleQuery) -> Fetched<Vec<Triple>> {
        self.run(Self::triples_key(query), |signal| {
            let network = self.remote.fetch_triples(query, signal)?;
            let overlay = RenameOverlay::from_actions(&self.store.all_actions());
            let Some(space) = &query.space else {
                return Ok(overlay.apply(network));
            };

            let actions = self.store.actions_for_space(space);
            let merged = overlay.apply(merge(&squash(&actions), &network));
            let triples = merged
                .into_iter()
                .filter(|t| !t.is_deleted)
                .filter(|t| query.filters.iter().all(|f| f.matches(t)))
                .collect();
            Ok(resolve_collection_values(triples))
        })
    }

    /// Entities matching the query. Network entities with local actions
    /// applied come first, then entities that only exist locally.
    ///
    /// Entities touched by a local action are held to the query's name and
    /// type filter. Untouched network entities are kept as the remote matched
    /// them, with local names applied.
    pub fn fetch_entities(&self, query: &EntityQuery) -> Fetched<Vec<Entity>> {
        self.run(Self::entities_key(query), |signal| {
            let network = self.remote.fetch_entities(query, signal)?;
            let actions = self.store.all_actions();
            let touched: HashSet<&EntityId> = actions.iter().map(|a| a.entity_id()).collect();
            let needle = query.query.to_lowercase();

            let matches = |e: &Entity| {
                let Some(name) = &e.name else {
                    return false;
                };
                if !query.type_ids.is_empty() && !e.types.iter().any(|t| query.type_ids.contains(&t.id)) {
                    return false;
                }
                name.to_lowercase().contains(&needle)
            };

            Ok(merge_actions_with_entities(&actions, &network)
                .into_iter()
                .filter(|e| !touched.contains(&e.id) || matches(e))
                .collect())
        })
    }

    /// One entity with local actions and local names applied. `None` when
    /// neither the network nor the local log knows it.
    pub fn fetch_entity(&self, id: &EntityId) -> Fetched<Option<Entity>> {
        self.run(Self::entity_key(id), |signal| {
            let network = self.remote.fetch_entity(id, signal)?;
            let actions = self.store.all_actions();
            let remote = network.map(|e| e.triples).unwrap_or_default();
            Ok(merge_entity(&actions, id, &remote))
        })
    }

    /// Table columns with local schema edits to the first queried type.
    pub fn columns(&self, query: &ColumnQuery) -> Fetched<Vec<Column>> {
        self.run(Self::columns_key(query), |signal| {
            let server = self.remote.fetch_columns(query, signal)?;
            let actions = self.store.all_actions();
            let local = with_local_names(&actions, squash(&actions));
            Ok(columns_from_local_changes(&local, &server, query.type_ids.first()))
        })
    }

    /// Table rows of `selected_type`.
    ///
    /// Entities given the type locally are fetched in full, so rows show all
    /// of their attributes and not only the ones edited locally. Server rows
    /// of entities that were changed locally are replaced by their merged
    /// version. Local rows are held to the table's filter clauses.
    pub fn rows(&self, query: &RowQuery, columns: &[Column], selected_type: Option<&EntityId>) -> Fetched<Vec<Row>> {
        self.run(Self::rows_key(query, columns, selected_type), |signal| {
            let server_rows = self.remote.fetch_table_row_entities(query, signal)?;
            let clauses = table_clauses(&query.filter);
            let has_selected_type = |e: &Entity| selected_type.is_none_or(|type_id| e.has_type(type_id));

            let actions = self.store.all_actions();
            let local_entities = entities_from_triples(&with_local_names(&actions, squash(&actions)));
            let retyped_ids: Vec<&EntityId> = local_entities
                .iter()
                .filter(|e| selected_type.is_some_and(|type_id| e.has_type(type_id)))
                .map(|e| &e.id)
                .collect();

            let mut retyped: Vec<Entity> = Vec::new();
            for id in retyped_ids {
                let Some(remote) = self.remote.fetch_entity(id, signal)? else {
                    continue;
                };
                if let Some(entity) = merge_entity(&actions, id, &remote.triples)
                    && matches_filters(&entity, &clauses)
                {
                    retyped.push(entity);
                }
            }
            let retyped_ids: HashSet<&EntityId> = retyped.iter().map(|e| &e.id).collect();

            let server_entities = {
                let triples: Vec<Triple> = server_rows.iter().flat_map(|e| e.triples.iter().cloned()).collect();
                entities_from_triples(&with_local_names(&actions, triples))
            };
            // Entities touched locally, whether or not they still belong in the table.
            let local_ids: HashSet<&EntityId> = actions.iter().map(|a| a.entity_id()).collect();
            let touched: Vec<Entity> = merge_actions_with_entities(&actions, &server_entities)
                .into_iter()
                .filter(|e| local_ids.contains(&e.id) && !retyped_ids.contains(&e.id))
                .collect();
            let changed_ids: HashSet<EntityId> = touched.iter().map(|e| e.id.clone()).collect();

            let mut entities: Vec<Entity> = touched
                .into_iter()
                .filter(|e| has_selected_type(e) && matches_filters(e, &clauses))
                .collect();
            entities.extend(retyped.iter().cloned());
            entities.extend(
                server_entities
                    .iter()
                    .filter(|e| !changed_ids.contains(&e.id) && !retyped_ids.contains(&e.id))
                    .cloned(),
            );
            entities.retain(|e| has_selected_type(e));

            Ok(rows_from_entities(&entities, columns))
        })
    }

    /// Relations from `entity_id`: remote relation entities resolved through
    /// their `FROM` triples, merged with locally created, edited and deleted
    /// relations.
    pub fn relations(&self, entity_id: &EntityId, space: Option<&SpaceId>) -> Fetched<Vec<Relation>> {
        self.run(Self::relations_key(entity_id, space), |signal| {
            let query = TripleQuery {
                space: space.cloned(),
                filters: vec![
                    TripleFilter::AttributeId(system_ids::RELATION_FROM_ATTRIBUTE.into()),
                    TripleFilter::LinkedTo(entity_id.clone()),
                ],
                ..TripleQuery::default()
            };
            let mut remote_triples: Vec<Triple> = Vec::new();
            for from_triple in self.remote.fetch_triples(&query, signal)? {
                if let Some(relation) = self.remote.fetch_entity(&from_triple.entity_id, signal)? {
                    remote_triples.extend(relation.triples);
                }
            }
            let mut target_names = RenameOverlay::default();
            for target in remote_relation_targets(&remote_triples) {
                if let Some(entity) = self.remote.fetch_entity(&target, signal)? {
                    if let Some(name) = &entity.name {
                        target_names.insert(entity.id.clone(), name.clone());
                    }
                    remote_triples.extend(entity.triples);
                }
            }

            let actions = self.store.all_actions();
            let local_names = RenameOverlay::from_actions(&actions);
            let remote = relations_from_triples(&local_names.apply(target_names.apply(remote_triples)));
            let local = local_names.apply(squash(&actions));
            Ok(relations_for_entity(entity_id, &local, &remote))
        })
    }
}

/// Filter clauses of a table filter string. A string that does not parse
/// restricts nothing locally.
fn table_clauses(filter: &str) -> Vec<FilterClause> {
    if filter.is_empty() {
        return Vec::new();
    }
    match parse_filter_string(filter) {
        Ok(parsed) => parsed.clauses,
        Err(e) => {
            warn!(error = %e, "ignoring unparsable table filter");
            Vec::new()
        }
    }
}

/// `TO` targets of the given relation triples, fetched so image targets can
/// resolve their url.
fn remote_relation_targets(triples: &[Triple]) -> Vec<EntityId> {
    let mut targets: Vec<EntityId> = Vec::new();
    for t in triples {
        if t.is_attribute(system_ids::RELATION_TO_ATTRIBUTE)
            && let Some(id) = t.value.as_entity_id()
            && !targets.contains(id)
        {
            targets.push(id.clone());
        }
    }
    targets
}
