use std::collections::HashSet;

use kgedit_core::filter::FilterClause;
use kgedit_core::{system_ids, EntityId, Triple, Value, ValueType};

use crate::entity::Entity;

/// One attribute shown as a table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub id: EntityId,
    pub name: Option<String>,
    pub value_type: ValueType,
}

impl Column {
    pub fn new(id: impl Into<EntityId>, name: Option<String>, value_type: ValueType) -> Self {
        Self {
            id: id.into(),
            name,
            value_type,
        }
    }

    /// The leading name column every table has.
    pub fn name_column() -> Self {
        Self::new(system_ids::NAME, Some("Name".to_string()), ValueType::Text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub column_id: EntityId,
    pub triples: Vec<Triple>,
}

impl Cell {
    pub fn value(&self) -> Option<&Value> {
        self.triples.first().map(|t| &t.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub entity_id: EntityId,
    pub name: Option<String>,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn cell(&self, column_id: &str) -> Option<&Cell> {
        self.cells.iter().find(|c| c.column_id.as_str() == column_id)
    }
}

fn local_attribute_name(local: &[Triple], attribute_id: &EntityId) -> Option<String> {
    local
        .iter()
        .find(|t| !t.is_deleted && &t.entity_id == attribute_id && t.is_attribute(system_ids::NAME))
        .and_then(|t| t.value.as_text())
        .map(str::to_string)
}

fn local_value_type(local: &[Triple], attribute_id: &EntityId) -> Option<ValueType> {
    local
        .iter()
        .find(|t| !t.is_deleted && &t.entity_id == attribute_id && t.is_attribute(system_ids::VALUE_TYPE))
        .and_then(|t| t.value.as_entity_id())
        .map(|id| ValueType::from_system_id(id.as_str()))
}

/// Columns of `selected_type` with local schema edits applied.
///
/// Attributes added to the type locally are appended after the server
/// columns, attributes removed locally are dropped, and local renames or
/// value-type changes of an attribute entity override the server's.
pub fn columns_from_local_changes(
    local: &[Triple],
    server_columns: &[Column],
    selected_type: Option<&EntityId>,
) -> Vec<Column> {
    let schema: Vec<&Triple> = match selected_type {
        Some(type_id) => local
            .iter()
            .filter(|t| &t.entity_id == type_id && t.is_attribute(system_ids::ATTRIBUTES))
            .collect(),
        None => Vec::new(),
    };
    let removed: HashSet<&EntityId> = schema
        .iter()
        .filter(|t| t.is_deleted)
        .filter_map(|t| t.value.as_entity_id())
        .collect();

    let mut columns: Vec<Column> = server_columns
        .iter()
        .filter(|c| !removed.contains(&c.id))
        .cloned()
        .collect();

    for triple in schema.iter().filter(|t| !t.is_deleted) {
        let Some(attribute) = triple.value.as_entity_ref() else {
            continue;
        };
        if columns.iter().any(|c| c.id == attribute.id) {
            continue;
        }
        columns.push(Column::new(attribute.id, attribute.name, ValueType::Text));
    }

    for column in &mut columns {
        if let Some(name) = local_attribute_name(local, &column.id) {
            column.name = Some(name);
        }
        if let Some(value_type) = local_value_type(local, &column.id) {
            column.value_type = value_type;
        }
    }
    columns
}

/// Whether `entity` passes every clause. Clause semantics follow the filter
/// string the indexer evaluates: name and text clauses match a
/// case-insensitive prefix, entity clauses match the referenced id and the
/// space clause matches any space holding the entity's name.
pub fn matches_filters(entity: &Entity, clauses: &[FilterClause]) -> bool {
    clauses.iter().all(|clause| matches_clause(entity, clause))
}

fn starts_with_nocase(haystack: &str, prefix: &str) -> bool {
    haystack.to_lowercase().starts_with(&prefix.to_lowercase())
}

fn matches_clause(entity: &Entity, clause: &FilterClause) -> bool {
    let column = clause.column_id.as_str();
    match clause.value_type {
        ValueType::Text if column == system_ids::NAME => entity
            .name
            .as_deref()
            .is_some_and(|name| starts_with_nocase(name, &clause.value)),
        ValueType::Text if column == system_ids::SPACE => entity
            .name_triple_spaces
            .iter()
            .any(|space| space.as_str() == clause.value),
        ValueType::Entity => entity.triples.iter().any(|t| {
            t.is_attribute(column) && t.value.as_entity_id().map(EntityId::as_str) == Some(clause.value.as_str())
        }),
        ValueType::Text => entity.triples.iter().any(|t| {
            t.is_attribute(column)
                && t.value
                    .as_text()
                    .is_some_and(|text| starts_with_nocase(text, &clause.value))
        }),
        // Clauses the filter string cannot carry never restrict rows.
        _ => true,
    }
}

/// One row per entity, one cell per column. The name column is filled from
/// the entity's name triple like any other attribute.
pub fn rows_from_entities(entities: &[Entity], columns: &[Column]) -> Vec<Row> {
    entities
        .iter()
        .map(|entity| Row {
            entity_id: entity.id.clone(),
            name: entity.name.clone(),
            cells: columns
                .iter()
                .map(|column| Cell {
                    column_id: column.id.clone(),
                    triples: entity
                        .triples
                        .iter()
                        .filter(|t| t.attribute_id == column.id)
                        .cloned()
                        .collect(),
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::entities_from_triples;

    fn attribute_of(type_id: &str, attribute: &str, name: &str) -> Triple {
        Triple::new("s", type_id, system_ids::ATTRIBUTES, Value::entity(attribute, Some(name)))
    }

    #[test]
    fn local_attributes_become_columns() {
        let server = vec![Column::name_column(), Column::new("age", Some("Age".into()), ValueType::Number)];
        let local = vec![
            attribute_of("person", "email", "Email"),
            attribute_of("person", "age", "Age").tombstoned(),
            Triple::new("s", "email", system_ids::VALUE_TYPE, Value::entity(system_ids::WEB_URL, None)),
            Triple::new("s", system_ids::NAME, system_ids::NAME, Value::text("Title")),
        ];

        let columns = columns_from_local_changes(&local, &server, Some(&"person".into()));
        let ids: Vec<&str> = columns.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![system_ids::NAME, "email"]);
        assert_eq!(columns[0].name.as_deref(), Some("Title"));
        assert_eq!(columns[1].value_type, ValueType::Url);
    }

    #[test]
    fn no_selected_type_keeps_server_columns() {
        let server = vec![Column::name_column()];
        let local = vec![attribute_of("person", "email", "Email")];
        assert_eq!(columns_from_local_changes(&local, &server, None), server);
    }

    #[test]
    fn filters_use_prefix_and_reference_matching() {
        let entities = entities_from_triples(&[
            Triple::new("s", "e1", system_ids::NAME, Value::text("Bitcoin")),
            Triple::new("s", "e1", "tag", Value::entity("crypto", None)),
            Triple::new("s", "e1", "ticker", Value::text("BTC")),
        ]);
        let e = &entities[0];

        assert!(matches_filters(e, &[]));
        assert!(matches_filters(e, &[FilterClause::new(system_ids::NAME, "bit", ValueType::Text)]));
        assert!(matches_filters(e, &[FilterClause::new(system_ids::SPACE, "s", ValueType::Text)]));
        assert!(matches_filters(
            e,
            &[
                FilterClause::new("tag", "crypto", ValueType::Entity),
                FilterClause::new("ticker", "bt", ValueType::Text),
            ]
        ));
        assert!(!matches_filters(
            e,
            &[
                FilterClause::new("tag", "crypto", ValueType::Entity),
                FilterClause::new("ticker", "eth", ValueType::Text),
            ]
        ));
    }

    #[test]
    fn rows_have_one_cell_per_column() {
        let entities = entities_from_triples(&[
            Triple::new("s", "e1", system_ids::NAME, Value::text("Alice")),
            Triple::new("s", "e1", "age", Value::Number("30".into())),
        ]);
        let columns = vec![
            Column::name_column(),
            Column::new("age", None, ValueType::Number),
            Column::new("email", None, ValueType::Url),
        ];

        let rows = rows_from_entities(&entities, &columns);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells.len(), 3);
        assert_eq!(rows[0].cell(system_ids::NAME).and_then(Cell::value), Some(&Value::text("Alice")));
        assert!(rows[0].cell("email").is_some_and(|c| c.triples.is_empty()));
    }
}
