//! Triple builders for scenario tests.

use kgedit_core::{system_ids, Triple, Value};

pub fn name(space: &str, entity: &str, name: &str) -> Triple {
    Triple::new(space, entity, system_ids::NAME, Value::text(name))
        .with_entity_name(name)
        .with_attribute_name("Name")
}

pub fn description(space: &str, entity: &str, text: &str) -> Triple {
    Triple::new(space, entity, system_ids::DESCRIPTION, Value::text(text)).with_attribute_name("Description")
}

pub fn type_of(space: &str, entity: &str, type_id: &str, type_name: &str) -> Triple {
    Triple::new(space, entity, system_ids::TYPES, Value::entity(type_id, Some(type_name))).with_attribute_name("Types")
}

pub fn attribute(space: &str, entity: &str, attribute: &str, value: Value) -> Triple {
    Triple::new(space, entity, attribute, value)
}

/// Type entity with the given `(attribute id, name)` schema.
pub fn schema(space: &str, type_id: &str, type_name: &str, attributes: &[(&str, &str)]) -> Vec<Triple> {
    let mut triples = vec![name(space, type_id, type_name), type_of(space, type_id, system_ids::SCHEMA_TYPE, "Type")];
    for (id, attribute_name) in attributes {
        triples.push(Triple::new(
            space,
            type_id,
            system_ids::ATTRIBUTES,
            Value::entity(*id, Some(*attribute_name)),
        ));
        triples.push(name(space, id, attribute_name));
    }
    triples
}

/// Marker and companion triples of a relation `from -> to`.
pub fn relation(space: &str, id: &str, type_id: &str, from: &str, to: &str, index: &str) -> Vec<Triple> {
    vec![
        Triple::new(space, id, system_ids::TYPES, Value::entity(system_ids::RELATION_TYPE, None)),
        Triple::new(space, id, system_ids::RELATION_TYPE_ATTRIBUTE, Value::entity(type_id, None)),
        Triple::new(space, id, system_ids::RELATION_FROM_ATTRIBUTE, Value::entity(from, None)),
        Triple::new(space, id, system_ids::RELATION_TO_ATTRIBUTE, Value::entity(to, None)),
        Triple::new(space, id, system_ids::RELATION_INDEX, Value::text(index)),
    ]
}
