use std::collections::{HashMap, HashSet};

use kgedit_core::{system_ids, EntityId, EntityRef, Triple, Value};

/// Attributes that make up a relation entity. Besides the `TYPES -> RELATION_TYPE`
/// marker, all four companions must be present for the relation to exist.
pub const RELATION_COMPANIONS: [&str; 4] = [
    system_ids::RELATION_TYPE_ATTRIBUTE,
    system_ids::RELATION_FROM_ATTRIBUTE,
    system_ids::RELATION_TO_ATTRIBUTE,
    system_ids::RELATION_INDEX,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderableType {
    Default,
    Image,
}

impl RenderableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Image => "IMAGE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToEntityRef {
    pub id: EntityId,
    pub name: Option<String>,
    pub renderable_type: RenderableType,
    /// Image url for image targets, otherwise the target's name.
    pub value: Option<String>,
}

/// A typed, ordered edge between two entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub id: EntityId,
    pub type_of: EntityRef,
    /// Fractional index, ordered bytewise.
    pub index: String,
    pub from_entity: EntityRef,
    pub to_entity: ToEntityRef,
}

/// The `TYPES -> RELATION_TYPE` triple that marks an entity as a relation.
pub fn is_relation_marker(triple: &Triple) -> bool {
    triple.is_attribute(system_ids::TYPES)
        && triple.value.as_entity_id().map(EntityId::as_str) == Some(system_ids::RELATION_TYPE)
}

pub fn is_relation_companion(triple: &Triple) -> bool {
    is_relation_marker(triple)
        || RELATION_COMPANIONS
            .iter()
            .any(|attribute| triple.is_attribute(attribute))
}

fn entity_ref(value: &Value) -> EntityRef {
    match value {
        Value::Entity { id, name } => EntityRef {
            id: id.clone(),
            name: name.clone(),
        },
        other => EntityRef {
            id: EntityId::from(other.raw()),
            name: None,
        },
    }
}

fn to_entity_ref(value: &Value, image_urls: &HashMap<EntityId, String>) -> ToEntityRef {
    match value {
        Value::Image { id, image_value } => ToEntityRef {
            id: id.clone(),
            name: None,
            renderable_type: RenderableType::Image,
            value: Some(image_value.clone()),
        },
        other => {
            let target = entity_ref(other);
            match image_urls.get(&target.id) {
                Some(url) => ToEntityRef {
                    id: target.id,
                    name: target.name,
                    renderable_type: RenderableType::Image,
                    value: Some(url.clone()),
                },
                None => ToEntityRef {
                    value: target.name.clone(),
                    id: target.id,
                    name: target.name,
                    renderable_type: RenderableType::Default,
                },
            }
        }
    }
}

/// Urls of entities typed as images within `triples`.
fn image_urls(triples: &[Triple]) -> HashMap<EntityId, String> {
    let image_entities: HashSet<&EntityId> = triples
        .iter()
        .filter(|t| {
            !t.is_deleted
                && t.is_attribute(system_ids::TYPES)
                && t.value.as_entity_id().map(EntityId::as_str) == Some(system_ids::IMAGE_TYPE)
        })
        .map(|t| &t.entity_id)
        .collect();

    triples
        .iter()
        .filter(|t| {
            !t.is_deleted
                && t.is_attribute(system_ids::IMAGE_URL_ATTRIBUTE)
                && image_entities.contains(&t.entity_id)
        })
        .map(|t| (t.entity_id.clone(), t.value.raw().to_string()))
        .collect()
}

fn find<'a>(group: &[&'a Triple], attribute: &str) -> Option<&'a Triple> {
    group.iter().copied().find(|t| t.is_attribute(attribute))
}

fn relation_from_group(
    id: EntityId,
    group: &[&Triple],
    image_urls: &HashMap<EntityId, String>,
) -> Option<Relation> {
    let type_of = find(group, system_ids::RELATION_TYPE_ATTRIBUTE)?;
    let from = find(group, system_ids::RELATION_FROM_ATTRIBUTE)?;
    let to = find(group, system_ids::RELATION_TO_ATTRIBUTE)?;
    let index = find(group, system_ids::RELATION_INDEX)?;
    Some(Relation {
        id,
        type_of: entity_ref(&type_of.value),
        index: index.value.raw().to_string(),
        from_entity: entity_ref(&from.value),
        to_entity: to_entity_ref(&to.value, image_urls),
    })
}

/// Well-formed relations encoded in `triples`, in first-seen order.
///
/// Relation entities missing a companion triple, or whose marker is
/// tombstoned, are left out without error.
pub fn relations_from_triples(triples: &[Triple]) -> Vec<Relation> {
    let live: Vec<&Triple> = triples.iter().filter(|t| !t.is_deleted).collect();
    let mut order: Vec<&EntityId> = Vec::new();
    let mut relation_ids: HashSet<&EntityId> = HashSet::new();
    for &triple in &live {
        if is_relation_marker(triple) && relation_ids.insert(&triple.entity_id) {
            order.push(&triple.entity_id);
        }
    }

    let mut groups: HashMap<&EntityId, Vec<&Triple>> = HashMap::new();
    for &triple in &live {
        if relation_ids.contains(&triple.entity_id) {
            groups.entry(&triple.entity_id).or_default().push(triple);
        }
    }

    let urls = image_urls(triples);
    order
        .into_iter()
        .filter_map(|id| {
            let group = groups.get(id)?;
            relation_from_group(id.clone(), group, &urls)
        })
        .collect()
}

/// Relations shown on `entity_id`'s page: locally created relations from the
/// entity, then remote relations not deleted locally, with local companion
/// edits applied over them.
pub fn relations_for_entity(
    entity_id: &EntityId,
    local_triples: &[Triple],
    remote_relations: &[Relation],
) -> Vec<Relation> {
    let created: Vec<Relation> = relations_from_triples(local_triples)
        .into_iter()
        .filter(|r| &r.from_entity.id == entity_id)
        .collect();
    let created_ids: HashSet<&EntityId> = created.iter().map(|r| &r.id).collect();

    let deleted: HashSet<&EntityId> = local_triples
        .iter()
        .filter(|t| t.is_deleted && is_relation_marker(t))
        .map(|t| &t.entity_id)
        .collect();

    let urls = image_urls(local_triples);
    let remote: Vec<Relation> = remote_relations
        .iter()
        .filter(|r| {
            &r.from_entity.id == entity_id && !deleted.contains(&r.id) && !created_ids.contains(&r.id)
        })
        .map(|r| overlay_local_companions(r, local_triples, &urls))
        .collect();

    let mut result = created;
    result.extend(remote);
    result
}

fn overlay_local_companions(
    relation: &Relation,
    local_triples: &[Triple],
    image_urls: &HashMap<EntityId, String>,
) -> Relation {
    let group: Vec<&Triple> = local_triples
        .iter()
        .filter(|t| !t.is_deleted && t.entity_id == relation.id)
        .collect();
    let mut result = relation.clone();

    if let Some(t) = find(&group, system_ids::RELATION_TYPE_ATTRIBUTE) {
        result.type_of = merged_ref(&t.value, &relation.type_of);
    }
    if let Some(t) = find(&group, system_ids::RELATION_INDEX) {
        result.index = t.value.raw().to_string();
    }
    if let Some(t) = find(&group, system_ids::RELATION_FROM_ATTRIBUTE) {
        result.from_entity = merged_ref(&t.value, &relation.from_entity);
    }
    if let Some(t) = find(&group, system_ids::RELATION_TO_ATTRIBUTE) {
        let mut to = to_entity_ref(&t.value, image_urls);
        if to.name.is_none() && to.id == relation.to_entity.id {
            to.name = relation.to_entity.name.clone();
            if to.renderable_type == RenderableType::Default {
                to.value = to.name.clone();
            }
        }
        result.to_entity = to;
    }
    result
}

/// Local reference, keeping the remote name when the local value has none.
fn merged_ref(local: &Value, remote: &EntityRef) -> EntityRef {
    let mut merged = entity_ref(local);
    if merged.name.is_none() && merged.id == remote.id {
        merged.name = remote.name.clone();
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relation_triples(id: &str, from: &str, to: &str) -> Vec<Triple> {
        vec![
            Triple::new("s", id, system_ids::TYPES, Value::entity(system_ids::RELATION_TYPE, Some("Relation"))),
            Triple::new("s", id, system_ids::RELATION_TYPE_ATTRIBUTE, Value::entity("friend-of", Some("Friend of"))),
            Triple::new("s", id, system_ids::RELATION_FROM_ATTRIBUTE, Value::entity(from, Some("From"))),
            Triple::new("s", id, system_ids::RELATION_TO_ATTRIBUTE, Value::entity(to, Some("To"))),
            Triple::new("s", id, system_ids::RELATION_INDEX, Value::text("a0")),
        ]
    }

    #[test]
    fn complete_group_is_a_relation() {
        let relations = relations_from_triples(&relation_triples("r1", "alice", "bob"));
        assert_eq!(relations.len(), 1);
        let r = &relations[0];
        assert_eq!(r.id.as_str(), "r1");
        assert_eq!(r.type_of.id.as_str(), "friend-of");
        assert_eq!(r.from_entity.id.as_str(), "alice");
        assert_eq!(r.to_entity.id.as_str(), "bob");
        assert_eq!(r.to_entity.renderable_type, RenderableType::Default);
        assert_eq!(r.index, "a0");
    }

    #[test]
    fn missing_to_drops_relation() {
        let triples: Vec<Triple> = relation_triples("r1", "alice", "bob")
            .into_iter()
            .filter(|t| !t.is_attribute(system_ids::RELATION_TO_ATTRIBUTE))
            .collect();
        assert!(relations_from_triples(&triples).is_empty());
    }

    #[test]
    fn tombstoned_marker_drops_relation() {
        let mut triples = relation_triples("r1", "alice", "bob");
        triples[0].is_deleted = true;
        assert!(relations_from_triples(&triples).is_empty());
    }

    #[test]
    fn image_targets_render_as_images() {
        let mut triples = relation_triples("r1", "alice", "img");
        triples.push(Triple::new("s", "img", system_ids::TYPES, Value::entity(system_ids::IMAGE_TYPE, None)));
        triples.push(Triple::new("s", "img", system_ids::IMAGE_URL_ATTRIBUTE, Value::Url("ipfs://pic".into())));
        let relations = relations_from_triples(&triples);
        assert_eq!(relations[0].to_entity.renderable_type, RenderableType::Image);
        assert_eq!(relations[0].to_entity.value.as_deref(), Some("ipfs://pic"));
    }

    #[test]
    fn every_locally_deleted_relation_is_hidden() {
        let remote: Vec<Relation> = ["r1", "r2", "r3"]
            .iter()
            .flat_map(|id| relations_from_triples(&relation_triples(id, "alice", "bob")))
            .collect();
        let local: Vec<Triple> = ["r1", "r2"]
            .iter()
            .map(|id| relation_triples(id, "alice", "bob").remove(0).tombstoned())
            .collect();

        let visible = relations_for_entity(&"alice".into(), &local, &remote);
        let ids: Vec<&str> = visible.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r3"]);
    }

    #[test]
    fn local_relations_come_first_and_filter_by_source() {
        let remote = relations_from_triples(&relation_triples("remote", "alice", "bob"));
        let mut local = relation_triples("local", "alice", "carol");
        local.extend(relation_triples("elsewhere", "dave", "carol"));

        let visible = relations_for_entity(&"alice".into(), &local, &remote);
        let ids: Vec<&str> = visible.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["local", "remote"]);
    }

    #[test]
    fn local_companion_edits_override_remote() {
        let remote = relations_from_triples(&relation_triples("r1", "alice", "bob"));
        let local = vec![
            Triple::new("s", "r1", system_ids::RELATION_INDEX, Value::text("b5")),
            Triple::new("s", "r1", system_ids::RELATION_TO_ATTRIBUTE, Value::entity("carol", None)),
        ];
        let visible = relations_for_entity(&"alice".into(), &local, &remote);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].index, "b5");
        assert_eq!(visible[0].to_entity.id.as_str(), "carol");
        assert_eq!(visible[0].type_of.name.as_deref(), Some("Friend of"));
    }
}
