use std::collections::HashMap;

use kgedit_core::{system_ids, Action, EntityId, EntityRef, SpaceId, Triple, Value};

use crate::merge::{merge, RenameOverlay};
use crate::squash::squash;

/// Read model of one entity, rebuilt from its triples on every read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub id: EntityId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub name_triple_spaces: Vec<SpaceId>,
    pub types: Vec<EntityRef>,
    pub avatar: Option<String>,
    pub cover: Option<String>,
    pub triples: Vec<Triple>,
}

impl Entity {
    /// Materializes `id` from triples already grouped for it. Tombstones are skipped.
    pub fn from_triples(id: EntityId, triples: Vec<Triple>) -> Self {
        let triples: Vec<Triple> = triples.into_iter().filter(|t| !t.is_deleted).collect();
        let space_hint = triples.first().map(|t| t.space_id.clone());
        Self {
            id,
            name: name(&triples),
            description: description(&triples),
            name_triple_spaces: triples
                .iter()
                .filter(|t| t.is_attribute(system_ids::NAME))
                .map(|t| t.space_id.clone())
                .collect(),
            types: types(&triples, space_hint.as_ref()),
            avatar: image_url(&triples, system_ids::AVATAR_ATTRIBUTE),
            cover: image_url(&triples, system_ids::COVER_ATTRIBUTE),
            triples,
        }
    }

    pub fn has_type(&self, type_id: &EntityId) -> bool {
        self.types.iter().any(|t| &t.id == type_id)
    }
}

/// First `NAME` triple's text. A non-text name value is treated as absent.
pub fn name(triples: &[Triple]) -> Option<String> {
    triples
        .iter()
        .find(|t| t.is_attribute(system_ids::NAME))
        .and_then(|t| t.value.as_text())
        .map(str::to_string)
}

pub fn description(triples: &[Triple]) -> Option<String> {
    triples
        .iter()
        .find(|t| {
            t.is_attribute(system_ids::DESCRIPTION)
                || t.attribute_name.as_deref() == Some(system_ids::DESCRIPTION)
        })
        .and_then(|t| t.value.as_text())
        .map(str::to_string)
}

/// Entity-reference values of the `TYPES` triples.
///
/// Shared system entities can carry type triples from several spaces. When
/// there is more than one, only those in `current_space` are kept, which can
/// leave none.
pub fn types(triples: &[Triple], current_space: Option<&SpaceId>) -> Vec<EntityRef> {
    let type_triples: Vec<&Triple> = triples
        .iter()
        .filter(|t| t.is_attribute(system_ids::TYPES))
        .collect();
    let several = type_triples.len() > 1;

    type_triples
        .into_iter()
        .filter(|t| match current_space {
            Some(space) if several => &t.space_id == space,
            _ => true,
        })
        .filter_map(|t| t.value.as_entity_ref())
        .collect()
}

fn image_url(triples: &[Triple], attribute_id: &str) -> Option<String> {
    let triple = triples.iter().find(|t| t.is_attribute(attribute_id))?;
    match &triple.value {
        Value::Image { image_value, .. } if !image_value.is_empty() => Some(image_value.clone()),
        Value::Url(url) if !url.is_empty() => Some(url.clone()),
        _ => None,
    }
}

/// Groups triples by entity, in first-seen order, and materializes each group.
/// Groups made only of tombstones produce no entity.
pub fn entities_from_triples(triples: &[Triple]) -> Vec<Entity> {
    let mut order: Vec<EntityId> = Vec::new();
    let mut groups: HashMap<EntityId, Vec<Triple>> = HashMap::new();
    for triple in triples.iter().filter(|t| !t.is_deleted) {
        groups
            .entry(triple.entity_id.clone())
            .or_insert_with(|| {
                order.push(triple.entity_id.clone());
                Vec::new()
            })
            .push(triple.clone());
    }
    order
        .into_iter()
        .filter_map(|id| {
            let group = groups.remove(&id)?;
            Some(Entity::from_triples(id, group))
        })
        .collect()
}

pub fn entity_from_triples(id: &EntityId, triples: &[Triple]) -> Option<Entity> {
    let own: Vec<Triple> = triples
        .iter()
        .filter(|t| &t.entity_id == id && !t.is_deleted)
        .cloned()
        .collect();
    if own.is_empty() {
        return None;
    }
    Some(Entity::from_triples(id.clone(), own))
}

/// Actions whose resulting triple belongs to `entity_id`.
pub fn actions_for_entity(actions: &[Action], entity_id: &EntityId) -> Vec<Action> {
    actions
        .iter()
        .filter(|a| a.entity_id() == entity_id)
        .cloned()
        .collect()
}

/// Entity built from local actions alone, with local names applied.
pub fn entity_from_actions(all_actions: &[Action], entity_id: &EntityId) -> Option<Entity> {
    merge_entity(all_actions, entity_id, &[])
}

/// Local actions for `entity_id` layered over its remote triples.
pub fn merge_entity(all_actions: &[Action], entity_id: &EntityId, remote: &[Triple]) -> Option<Entity> {
    let local = squash(&actions_for_entity(all_actions, entity_id));
    let merged = merge(&local, remote);
    let renamed = RenameOverlay::from_actions(all_actions).apply(merged);
    entity_from_triples(entity_id, &renamed)
}

/// Applies local edits to a list of remote entities. Entities that only
/// exist locally are appended after the remote ones.
pub fn merge_actions_with_entities(all_actions: &[Action], network: &[Entity]) -> Vec<Entity> {
    let overlay = RenameOverlay::from_actions(all_actions);
    let local = squash(all_actions);

    let mut remote: Vec<Triple> = Vec::new();
    for entity in network {
        remote.extend(entity.triples.iter().cloned());
    }
    let merged = overlay.apply(merge(&local, &remote));

    let mut by_entity: HashMap<EntityId, Vec<Triple>> = HashMap::new();
    for triple in merged.into_iter().filter(|t| !t.is_deleted) {
        by_entity.entry(triple.entity_id.clone()).or_default().push(triple);
    }

    let mut result = Vec::new();
    for entity in network {
        if let Some(triples) = by_entity.remove(&entity.id) {
            result.push(Entity::from_triples(entity.id.clone(), triples));
        }
    }
    let mut local_only: Vec<EntityId> = Vec::new();
    for triple in &local {
        if by_entity.contains_key(&triple.entity_id) && !local_only.contains(&triple.entity_id) {
            local_only.push(triple.entity_id.clone());
        }
    }
    for id in local_only {
        if let Some(triples) = by_entity.remove(&id) {
            result.push(Entity::from_triples(id, triples));
        }
    }
    result
}
