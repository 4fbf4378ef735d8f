use std::collections::HashMap;

use kgedit_core::{
    system_ids, CollectionItem, CollectionItemEntity, EntityId, Triple, Value,
};

use crate::entity::{name, types};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub id: EntityId,
    pub name: Option<String>,
    pub items: Vec<CollectionItem>,
}

/// Live triples grouped by entity, entities in first-seen order.
struct LiveGroups<'a> {
    order: Vec<&'a EntityId>,
    groups: HashMap<&'a EntityId, Vec<&'a Triple>>,
}

impl<'a> LiveGroups<'a> {
    fn new(triples: &'a [Triple]) -> Self {
        let mut order = Vec::new();
        let mut groups: HashMap<&'a EntityId, Vec<&'a Triple>> = HashMap::new();
        for triple in triples.iter().filter(|t| !t.is_deleted) {
            groups
                .entry(&triple.entity_id)
                .or_insert_with(|| {
                    order.push(&triple.entity_id);
                    Vec::new()
                })
                .push(triple);
        }
        Self { order, groups }
    }

    fn get(&self, entity_id: &EntityId) -> &[&'a Triple] {
        self.groups.get(entity_id).map(Vec::as_slice).unwrap_or_default()
    }

    fn owned(&self, entity_id: &EntityId) -> Vec<Triple> {
        self.get(entity_id).iter().map(|t| (*t).clone()).collect()
    }

    /// Entities with a live `TYPES` triple pointing at `type_id`.
    fn typed(&self, type_id: &str) -> Vec<&'a EntityId> {
        self.order
            .iter()
            .copied()
            .filter(|id| has_type(self.get(id), type_id))
            .collect()
    }
}

fn attribute_value<'a>(group: &[&'a Triple], attribute: &str) -> Option<&'a Value> {
    group
        .iter()
        .find(|t| t.is_attribute(attribute))
        .map(|t| &t.value)
}

fn has_type(group: &[&Triple], type_id: &str) -> bool {
    group.iter().any(|t| {
        t.is_attribute(system_ids::TYPES)
            && t.value.as_entity_id().map(EntityId::as_str) == Some(type_id)
    })
}

/// Builds the item stored on `item_id`, or `None` when any of its
/// collection, entity or index triples is missing.
fn item_from_group(item_id: &EntityId, groups: &LiveGroups<'_>) -> Option<CollectionItem> {
    let group = groups.get(item_id);
    let collection_id = attribute_value(group, system_ids::COLLECTION_ITEM_COLLECTION_ID_REFERENCE_ATTRIBUTE)?
        .referenced_id()?
        .clone();
    let value = attribute_value(group, system_ids::COLLECTION_ITEM_ENTITY_REFERENCE)?.clone();
    let index = attribute_value(group, system_ids::COLLECTION_ITEM_INDEX)?
        .raw()
        .to_string();

    let target_id = value.referenced_id()?.clone();
    let target = groups.owned(&target_id);
    let target_name = match &value {
        Value::Entity { name: Some(n), .. } => Some(n.clone()),
        _ => name(&target),
    };
    let space_hint = target.first().map(|t| t.space_id.clone());

    Some(CollectionItem {
        id: item_id.clone(),
        collection_id,
        entity: CollectionItemEntity {
            id: target_id,
            name: target_name,
            types: types(&target, space_hint.as_ref()),
        },
        index,
        value,
    })
}

fn items_from_groups(groups: &LiveGroups<'_>) -> Vec<CollectionItem> {
    let mut items: Vec<CollectionItem> = groups
        .typed(system_ids::COLLECTION_ITEM_TYPE)
        .into_iter()
        .filter_map(|id| item_from_group(id, groups))
        .collect();
    sort_items(&mut items);
    items
}

/// All well-formed collection items in `triples`, ordered by fractional
/// index with the item id breaking ties.
pub fn collection_items_from_triples(triples: &[Triple]) -> Vec<CollectionItem> {
    items_from_groups(&LiveGroups::new(triples))
}

pub fn sort_items(items: &mut [CollectionItem]) {
    items.sort_by(|a, b| {
        a.index
            .as_bytes()
            .cmp(b.index.as_bytes())
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Items of one collection as a `Value::Collection`.
pub fn collection_value(collection_id: &EntityId, triples: &[Triple]) -> Value {
    let items = collection_items_from_triples(triples)
        .into_iter()
        .filter(|item| &item.collection_id == collection_id)
        .collect();
    Value::Collection {
        id: collection_id.clone(),
        items,
    }
}

/// Entities typed as collections, each with its ordered items.
pub fn collections_from_triples(triples: &[Triple]) -> Vec<Collection> {
    let groups = LiveGroups::new(triples);
    let mut by_collection: HashMap<EntityId, Vec<CollectionItem>> = HashMap::new();
    for item in items_from_groups(&groups) {
        by_collection
            .entry(item.collection_id.clone())
            .or_default()
            .push(item);
    }

    groups
        .typed(system_ids::COLLECTION_TYPE)
        .into_iter()
        .map(|id| Collection {
            id: id.clone(),
            name: name(&groups.owned(id)),
            items: by_collection.remove(id).unwrap_or_default(),
        })
        .collect()
}

/// Fills every `Value::Collection` in `triples` with the items found in the
/// same triple set. Collections whose items are absent resolve to an empty list.
pub fn resolve_collection_values(triples: Vec<Triple>) -> Vec<Triple> {
    if !triples
        .iter()
        .any(|t| matches!(t.value, Value::Collection { .. }))
    {
        return triples;
    }
    let items = collection_items_from_triples(&triples);
    triples
        .into_iter()
        .map(|mut t| {
            if let Value::Collection { id, items: slot } = &mut t.value {
                *slot = items
                    .iter()
                    .filter(|item| &item.collection_id == id)
                    .cloned()
                    .collect();
            }
            t
        })
        .collect()
}
