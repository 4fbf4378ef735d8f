use std::collections::{HashMap, HashSet};

use tracing::debug;

use kgedit_core::{system_ids, Action, EntityId, Op, SpaceId, Triple, Value};

use crate::relation::{is_relation_companion, is_relation_marker};
use crate::squash::{squash_changes, unpublished};

/// Values as the publish pipeline expects them. Images and collections are
/// entities on the wire and travel as references.
fn wire_value(value: &Value) -> Value {
    match value {
        Value::Image { id, .. } | Value::Collection { id, .. } => Value::Entity {
            id: id.clone(),
            name: None,
        },
        other => other.clone(),
    }
}

fn referenced(group: &[&Triple], attribute: &str) -> Option<EntityId> {
    group
        .iter()
        .find(|t| t.is_attribute(attribute))
        .and_then(|t| t.value.referenced_id())
        .cloned()
}

fn create_relation_op(id: &EntityId, group: &[&Triple]) -> Option<Op> {
    if !group.iter().any(|t| is_relation_marker(t)) {
        return None;
    }
    let index = group
        .iter()
        .find(|t| t.is_attribute(system_ids::RELATION_INDEX))?
        .value
        .raw()
        .to_string();
    Some(Op::CreateRelation {
        id: id.clone(),
        type_id: referenced(group, system_ids::RELATION_TYPE_ATTRIBUTE)?,
        from_id: referenced(group, system_ids::RELATION_FROM_ATTRIBUTE)?,
        to_id: referenced(group, system_ids::RELATION_TO_ATTRIBUTE)?,
        index,
    })
}

/// Translates net local triples of `space_id` into publish ops.
///
/// Published triples, triples of other spaces and placeholders that never
/// got an attribute are skipped. A relation created locally in full is sent
/// as one `CREATE_RELATION` in place of its marker and companion triples; a
/// deleted relation marker becomes `DELETE_RELATION` and swallows the
/// deletes of its companions. Everything else maps one triple to one op, in
/// input order.
pub fn prepare_for_publishing(triples: &[Triple], space_id: &SpaceId) -> Vec<Op> {
    let pending: Vec<&Triple> = triples
        .iter()
        .filter(|t| &t.space_id == space_id && !t.has_been_published && !t.attribute_id.is_empty())
        .collect();

    let mut live_groups: HashMap<&EntityId, Vec<&Triple>> = HashMap::new();
    for &t in pending.iter().filter(|t| !t.is_deleted) {
        live_groups.entry(&t.entity_id).or_default().push(t);
    }
    let created: HashMap<&EntityId, Op> = live_groups
        .iter()
        .filter_map(|(&id, group)| create_relation_op(id, group).map(|op| (id, op)))
        .collect();
    let deleted: HashSet<&EntityId> = pending
        .iter()
        .filter(|t| t.is_deleted && is_relation_marker(t))
        .map(|t| &t.entity_id)
        .collect();

    let mut emitted: HashSet<&EntityId> = HashSet::new();
    let mut ops = Vec::with_capacity(pending.len());
    for &t in &pending {
        let relation_op = if !t.is_deleted && created.contains_key(&t.entity_id) && is_relation_companion(t) {
            created.get(&t.entity_id).cloned()
        } else if t.is_deleted && deleted.contains(&t.entity_id) && is_relation_companion(t) {
            Some(Op::DeleteRelation {
                id: t.entity_id.clone(),
            })
        } else {
            None
        };

        match relation_op {
            Some(op) => {
                if emitted.insert(&t.entity_id) {
                    ops.push(op);
                }
            }
            None if t.is_deleted => ops.push(Op::DeleteTriple {
                entity_id: t.entity_id.clone(),
                attribute_id: t.attribute_id.clone(),
            }),
            None => ops.push(Op::SetTriple {
                entity_id: t.entity_id.clone(),
                attribute_id: t.attribute_id.clone(),
                value: wire_value(&t.value),
            }),
        }
    }

    debug!(space = %space_id, triples = pending.len(), ops = ops.len(), "prepared ops for publishing");
    ops
}

/// Ops for the unpublished part of a space's action log.
pub fn prepare_actions_for_publishing(actions: &[Action], space_id: &SpaceId) -> Vec<Op> {
    prepare_for_publishing(&squash_changes(&unpublished(actions)), space_id)
}

/// `(entity, attribute)` positions held back from a publish. Their actions
/// stay in the log as pending edits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnstagedChanges(HashSet<(EntityId, EntityId)>);

impl UnstagedChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity_id: impl Into<EntityId>, attribute_id: impl Into<EntityId>) {
        self.0.insert((entity_id.into(), attribute_id.into()));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Edits are held back by the position they replace.
    pub fn holds(&self, action: &Action) -> bool {
        if self.0.is_empty() {
            return false;
        }
        let triple = match action {
            Action::Edit { before, .. } => before,
            other => other.triple(),
        };
        self.0
            .contains(&(triple.entity_id.clone(), triple.attribute_id.clone()))
    }

    /// Splits a log into `(staged, unstaged)`, each in log order.
    pub fn split(&self, actions: Vec<Action>) -> (Vec<Action>, Vec<Action>) {
        actions.into_iter().partition(|a| !self.holds(a))
    }
}

impl<E: Into<EntityId>, A: Into<EntityId>> FromIterator<(E, A)> for UnstagedChanges {
    fn from_iter<I: IntoIterator<Item = (E, A)>>(iter: I) -> Self {
        let mut unstaged = Self::new();
        for (entity_id, attribute_id) in iter {
            unstaged.insert(entity_id, attribute_id);
        }
        unstaged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relation(id: &str, from: &str, to: &str) -> Vec<Triple> {
        vec![
            Triple::new("s", id, system_ids::TYPES, Value::entity(system_ids::RELATION_TYPE, None)),
            Triple::new("s", id, system_ids::RELATION_TYPE_ATTRIBUTE, Value::entity("friend-of", None)),
            Triple::new("s", id, system_ids::RELATION_FROM_ATTRIBUTE, Value::entity(from, None)),
            Triple::new("s", id, system_ids::RELATION_TO_ATTRIBUTE, Value::entity(to, None)),
            Triple::new("s", id, system_ids::RELATION_INDEX, Value::text("a0")),
        ]
    }

    #[test]
    fn sets_and_deletes() {
        let space = SpaceId::from("s");
        let triples = vec![
            Triple::new("s", "e1", system_ids::NAME, Value::text("Alice")),
            Triple::new("s", "e1", system_ids::DESCRIPTION, Value::text("gone")).tombstoned(),
        ];
        let ops = prepare_for_publishing(&triples, &space);
        assert_eq!(
            ops,
            vec![
                Op::SetTriple {
                    entity_id: "e1".into(),
                    attribute_id: system_ids::NAME.into(),
                    value: Value::text("Alice"),
                },
                Op::DeleteTriple {
                    entity_id: "e1".into(),
                    attribute_id: system_ids::DESCRIPTION.into(),
                },
            ]
        );
    }

    #[test]
    fn skips_published_foreign_and_unfinished_triples() {
        let space = SpaceId::from("s");
        let mut blank = Triple::empty("s", "e1", kgedit_core::ValueType::Text);
        blank.placeholder = false;
        let triples = vec![
            Triple::new("s", "e1", system_ids::NAME, Value::text("Old")).published(),
            Triple::new("other", "e1", system_ids::NAME, Value::text("Elsewhere")),
            blank,
        ];
        assert!(prepare_for_publishing(&triples, &space).is_empty());
    }

    #[test]
    fn images_travel_as_entity_references() {
        let triple = Triple::new(
            "s",
            "e1",
            system_ids::AVATAR_ATTRIBUTE,
            Value::Image {
                id: "img".into(),
                image_value: "ipfs://x".into(),
            },
        );
        let ops = prepare_for_publishing(&[triple], &"s".into());
        match &ops[0] {
            Op::SetTriple { value, .. } => assert_eq!(value, &Value::entity("img", None)),
            other => panic!("expected set, got {other:?}"),
        }
    }

    #[test]
    fn complete_relations_become_one_create() {
        let mut triples = relation("r1", "alice", "bob");
        triples.push(Triple::new("s", "r1", system_ids::NAME, Value::text("Friendship")));

        let ops = prepare_for_publishing(&triples, &"s".into());
        assert_eq!(ops.len(), 2);
        assert_eq!(
            ops[0],
            Op::CreateRelation {
                id: "r1".into(),
                type_id: "friend-of".into(),
                from_id: "alice".into(),
                to_id: "bob".into(),
                index: "a0".into(),
            }
        );
        assert_eq!(ops[1].op_type_name(), "SET_TRIPLE");
    }

    #[test]
    fn partial_relation_edits_stay_triples() {
        let triples: Vec<Triple> = relation("r1", "alice", "bob")
            .into_iter()
            .filter(|t| t.is_attribute(system_ids::RELATION_TO_ATTRIBUTE))
            .collect();
        let ops = prepare_for_publishing(&triples, &"s".into());
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op_type_name(), "SET_TRIPLE");
    }

    #[test]
    fn deleted_relations_become_one_delete() {
        let triples: Vec<Triple> = relation("r1", "alice", "bob")
            .into_iter()
            .map(Triple::tombstoned)
            .collect();
        let ops = prepare_for_publishing(&triples, &"s".into());
        assert_eq!(ops, vec![Op::DeleteRelation { id: "r1".into() }]);
    }

    #[test]
    fn unstaged_positions_are_held_back() {
        let space = SpaceId::from("s");
        let name = Triple::new("s", "e1", system_ids::NAME, Value::text("Alice"));
        let draft = Triple::new("s", "e1", system_ids::DESCRIPTION, Value::text("draft"));
        let moved = Triple::new("s", "e1", "bio", Value::text("draft"));
        let actions = vec![
            Action::Create(name.clone()),
            Action::Create(draft.clone()),
            Action::edit(draft.clone(), moved),
        ];

        let unstaged: UnstagedChanges = [("e1", system_ids::DESCRIPTION)].into_iter().collect();
        let (staged, held) = unstaged.split(actions.clone());
        assert_eq!(staged, vec![Action::Create(name)]);
        assert_eq!(held.len(), 2);

        let ops = prepare_actions_for_publishing(&staged, &space);
        assert_eq!(ops.len(), 1);
        assert!(!UnstagedChanges::new().holds(&actions[1]));
    }

    #[test]
    fn actions_are_netted_before_publishing() {
        let space = SpaceId::from("s");
        let alice = Triple::new("s", "e1", system_ids::NAME, Value::text("Alice"));
        let temp = Triple::new("s", "e2", system_ids::NAME, Value::text("Temp"));
        let actions = vec![
            Action::Create(alice.clone()),
            Action::edit(alice.clone(), alice.clone().with_value(Value::text("Alicia"))),
            Action::Create(temp.clone()),
            Action::Delete(temp.tombstoned()),
            Action::Create(Triple::new("s", "e3", system_ids::NAME, Value::text("Done"))).mark_published(),
        ];

        let ops = prepare_actions_for_publishing(&actions, &space);
        assert_eq!(ops.len(), 1);
        assert_eq!(
            ops[0].to_triple(&space).map(|t| t.value),
            Some(Value::text("Alicia"))
        );
    }
}
