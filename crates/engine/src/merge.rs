use std::collections::{HashMap, HashSet};

use tracing::trace;

use kgedit_core::{Action, EntityId, Triple, TripleId};

/// Combines squashed local triples with remote triples. Local wins.
///
/// A remote triple is dropped when its recomputed position id, or its own id,
/// is already held locally, including by a local tombstone. Admitted remote
/// triples are flagged as published and never as placeholders. The result is
/// admitted remote followed by local; callers should group by
/// `(entity, attribute)` rather than rely on position.
pub fn merge(local: &[Triple], remote: &[Triple]) -> Vec<Triple> {
    let local_ids: HashSet<&TripleId> = local.iter().map(|t| &t.id).collect();

    let mut merged: Vec<Triple> = remote
        .iter()
        .filter(|t| !local_ids.contains(&t.derived_id()) && !local_ids.contains(&t.id))
        .map(|t| Triple {
            has_been_published: true,
            placeholder: false,
            ..t.clone()
        })
        .collect();
    let admitted = merged.len();
    merged.extend(local.iter().cloned());

    trace!(
        local = local.len(),
        remote = remote.len(),
        admitted,
        "merged triples"
    );
    merged
}

/// Locally assigned entity names, applied over every triple that shows the
/// entity as its subject, its attribute, or an entity-reference value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameOverlay {
    names: HashMap<EntityId, String>,
}

impl RenameOverlay {
    /// Names carried by created and edited triples, later actions winning.
    /// Deletes do not contribute.
    pub fn from_actions(actions: &[Action]) -> Self {
        let mut overlay = Self::default();
        for action in actions {
            match action {
                Action::Create(t) | Action::Edit { after: t, .. } => overlay.record(t),
                Action::Delete(_) => {}
            }
        }
        overlay
    }

    fn record(&mut self, triple: &Triple) {
        if let Some(name) = triple.entity_name.as_deref()
            && !name.is_empty()
        {
            self.insert(triple.entity_id.clone(), name.to_string());
        }
    }

    pub fn insert(&mut self, entity_id: EntityId, name: String) {
        if !name.is_empty() {
            self.names.insert(entity_id, name);
        }
    }

    pub fn get(&self, entity_id: &EntityId) -> Option<&str> {
        self.names.get(entity_id).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn apply_to(&self, triple: &mut Triple) {
        if let Some(name) = self.names.get(&triple.entity_id) {
            triple.entity_name = Some(name.clone());
        }
        if let Some(name) = self.names.get(&triple.attribute_id) {
            triple.attribute_name = Some(name.clone());
        }
        let renamed = triple
            .value
            .as_entity_id()
            .and_then(|id| self.names.get(id))
            .cloned();
        if let Some(name) = renamed {
            triple.value.set_entity_name(&name);
        }
    }

    pub fn apply(&self, mut triples: Vec<Triple>) -> Vec<Triple> {
        if self.is_empty() {
            return triples;
        }
        for triple in &mut triples {
            self.apply_to(triple);
        }
        triples
    }
}

pub fn with_local_names(actions: &[Action], triples: Vec<Triple>) -> Vec<Triple> {
    RenameOverlay::from_actions(actions).apply(triples)
}
