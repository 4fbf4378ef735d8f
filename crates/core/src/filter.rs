//! Table block filter strings.
//!
//! A table block stores its filters as the GraphQL `where` fragment sent to
//! the indexer, e.g.
//!
//! ```text
//! {and: [{typeIds_contains_nocase: ["T"]}, {name_starts_with_nocase: "Bit"}, {entityOf_: {attribute: "A", entityValue: "E"}}]}
//! ```
//!
//! [`create_filter_string`] and [`parse_filter_string`] convert between that
//! string and a list of [`FilterClause`]s. For the supported clause kinds the
//! conversion is lossless and order preserving.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::EntityId;
use crate::system_ids;
use crate::value::ValueType;

const TYPE_KEY: &str = "typeIds_contains_nocase";
const NAME_KEY: &str = "name_starts_with_nocase";
const ENTITY_OF_KEY: &str = "entityOf_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterClause {
    pub column_id: EntityId,
    pub value: String,
    pub value_type: ValueType,
}

impl FilterClause {
    pub fn new(column_id: impl Into<EntityId>, value: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            column_id: column_id.into(),
            value: value.into(),
            value_type,
        }
    }

    /// Whether the clause can be expressed in a filter string at all. Only
    /// text and entity clauses are.
    pub fn is_supported(&self) -> bool {
        matches!(self.value_type, ValueType::Text | ValueType::Entity)
    }

    fn to_fragment(&self) -> Option<String> {
        let column = self.column_id.as_str();
        match self.value_type {
            ValueType::Text if column == system_ids::NAME => {
                Some(format!("{NAME_KEY}: {}", quote(&self.value)))
            }
            ValueType::Text if column == system_ids::SPACE => {
                Some(format!("{ENTITY_OF_KEY}: {{space: {}}}", quote(&self.value)))
            }
            ValueType::Entity => Some(format!(
                "{ENTITY_OF_KEY}: {{attribute: {}, entityValue: {}}}",
                quote(column),
                quote(&self.value)
            )),
            ValueType::Text => Some(format!(
                "{ENTITY_OF_KEY}: {{attribute: {}, stringValue_starts_with_nocase: {}}}",
                quote(column),
                quote(&self.value)
            )),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedFilter {
    pub type_id: Option<EntityId>,
    pub clauses: Vec<FilterClause>,
}

/// Builds the filter string for a table of `type_id`. Without a type there is
/// nothing to query and the result is empty. Unsupported clauses are skipped.
pub fn create_filter_string(filters: &[FilterClause], type_id: Option<&EntityId>) -> String {
    let Some(type_id) = type_id else {
        return String::new();
    };
    let type_clause = format!("{TYPE_KEY}: [{}]", quote(type_id.as_str()));
    let fragments: Vec<String> = filters.iter().filter_map(FilterClause::to_fragment).collect();

    match fragments.as_slice() {
        [] => format!("{{{type_clause}}}"),
        [single] => format!("{{{type_clause}, {single}}}"),
        many => {
            let wrapped: Vec<String> = many.iter().map(|f| format!("{{{f}}}")).collect();
            format!("{{and: [{{{type_clause}}}, {}]}}", wrapped.join(", "))
        }
    }
}

/// Parses a filter string back into its type id and clauses, in order.
/// Unknown keys are ignored; malformed syntax is an error.
pub fn parse_filter_string(input: &str) -> Result<ParsedFilter, CoreError> {
    let mut parser = Parser { src: input, pos: 0 };
    parser.skip_ws();
    if parser.at_end() {
        return Ok(ParsedFilter::default());
    }
    let root = parser.parse_node()?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.error("trailing input"));
    }

    let Node::Object(entries) = root else {
        return Err(CoreError::FilterParse {
            offset: 0,
            reason: "expected an object".into(),
        });
    };

    let mut parsed = ParsedFilter::default();
    match field(&entries, "and") {
        Some(Node::List(items)) => {
            for item in items {
                if let Node::Object(inner) = item {
                    read_entries(inner, &mut parsed);
                }
            }
        }
        _ => read_entries(&entries, &mut parsed),
    }
    Ok(parsed)
}

fn read_entries(entries: &[(String, Node)], out: &mut ParsedFilter) {
    for (key, node) in entries {
        match (key.as_str(), node) {
            (TYPE_KEY, Node::List(items)) => {
                if let Some(Node::Str(id)) = items.first() {
                    out.type_id = Some(EntityId::from(id.as_str()));
                }
            }
            (NAME_KEY, Node::Str(value)) => out.clauses.push(FilterClause::new(
                system_ids::NAME,
                value.as_str(),
                ValueType::Text,
            )),
            (ENTITY_OF_KEY, Node::Object(inner)) => {
                if let Some(clause) = entity_of_clause(inner) {
                    out.clauses.push(clause);
                }
            }
            _ => {}
        }
    }
}

fn entity_of_clause(entries: &[(String, Node)]) -> Option<FilterClause> {
    if let Some(space) = string_field(entries, "space") {
        return Some(FilterClause::new(system_ids::SPACE, space, ValueType::Text));
    }
    let attribute = string_field(entries, "attribute")?;
    if let Some(entity) = string_field(entries, "entityValue") {
        return Some(FilterClause::new(attribute, entity, ValueType::Entity));
    }
    string_field(entries, "stringValue_starts_with_nocase")
        .map(|text| FilterClause::new(attribute, text, ValueType::Text))
}

fn field<'n>(entries: &'n [(String, Node)], key: &str) -> Option<&'n Node> {
    entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

fn string_field<'n>(entries: &'n [(String, Node)], key: &str) -> Option<&'n str> {
    match field(entries, key)? {
        Node::Str(s) => Some(s),
        _ => None,
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Object(Vec<(String, Node)>),
    List(Vec<Node>),
    Str(String),
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> CoreError {
        CoreError::FilterParse {
            offset: self.pos,
            reason: reason.to_string(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn expect(&mut self, want: char) -> Result<(), CoreError> {
        self.skip_ws();
        match self.bump() {
            Some(c) if c == want => Ok(()),
            _ => Err(self.error(&format!("expected '{want}'"))),
        }
    }

    fn parse_node(&mut self) -> Result<Node, CoreError> {
        self.skip_ws();
        match self.peek() {
            Some('{') => self.parse_object(),
            Some('[') => self.parse_list(),
            Some('"') => self.parse_string().map(Node::Str),
            _ => Err(self.error("expected object, list or string")),
        }
    }

    fn parse_object(&mut self) -> Result<Node, CoreError> {
        self.expect('{')?;
        let mut entries = Vec::new();
        self.skip_ws();
        if self.peek() == Some('}') {
            self.bump();
            return Ok(Node::Object(entries));
        }
        loop {
            let key = self.parse_key()?;
            self.expect(':')?;
            let value = self.parse_node()?;
            entries.push((key, value));
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Node::Object(entries)),
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn parse_list(&mut self) -> Result<Node, CoreError> {
        self.expect('[')?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(']') {
            self.bump();
            return Ok(Node::List(items));
        }
        loop {
            items.push(self.parse_node()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(']') => return Ok(Node::List(items)),
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
    }

    fn parse_key(&mut self) -> Result<String, CoreError> {
        self.skip_ws();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }
        if self.pos == start {
            return Err(self.error("expected key"));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn parse_string(&mut self) -> Result<String, CoreError> {
        self.expect('"')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some(c) => out.push(c),
                    None => return Err(self.error("dangling escape")),
                },
                Some('"') => return Ok(out),
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn type_id() -> EntityId {
        EntityId::from("type-id")
    }

    #[test]
    fn no_type_means_no_query() {
        assert_eq!(create_filter_string(&[], None), "");
        assert_eq!(parse_filter_string("").unwrap(), ParsedFilter::default());
    }

    #[test]
    fn type_only() {
        let s = create_filter_string(&[], Some(&type_id()));
        assert_eq!(s, r#"{typeIds_contains_nocase: ["type-id"]}"#);
        let parsed = parse_filter_string(&s).unwrap();
        assert_eq!(parsed.type_id, Some(type_id()));
        assert!(parsed.clauses.is_empty());
    }

    #[test]
    fn single_clause_is_inlined() {
        let filters = [FilterClause::new(system_ids::NAME, "Bit", ValueType::Text)];
        let s = create_filter_string(&filters, Some(&type_id()));
        assert_eq!(
            s,
            r#"{typeIds_contains_nocase: ["type-id"], name_starts_with_nocase: "Bit"}"#
        );
        assert_eq!(parse_filter_string(&s).unwrap().clauses, filters);
    }

    #[test]
    fn multiple_clauses_round_trip_in_order() {
        let filters = vec![
            FilterClause::new("attr-a", "entity-1", ValueType::Entity),
            FilterClause::new(system_ids::SPACE, "0xSpace", ValueType::Text),
            FilterClause::new("attr-b", "Value 1", ValueType::Text),
            FilterClause::new(system_ids::NAME, "id 1", ValueType::Text),
        ];
        let s = create_filter_string(&filters, Some(&type_id()));
        assert!(s.starts_with(r#"{and: [{typeIds_contains_nocase: ["type-id"]}, {entityOf_: {attribute: "attr-a", entityValue: "entity-1"}}"#));

        let parsed = parse_filter_string(&s).unwrap();
        assert_eq!(parsed.type_id, Some(type_id()));
        assert_eq!(parsed.clauses, filters);
    }

    #[test]
    fn quotes_and_backslashes_survive() {
        let filters = vec![
            FilterClause::new("attr", r#"say "hi" \o/"#, ValueType::Text),
            FilterClause::new(system_ids::NAME, "plain", ValueType::Text),
        ];
        let s = create_filter_string(&filters, Some(&type_id()));
        assert_eq!(parse_filter_string(&s).unwrap().clauses, filters);
    }

    #[test]
    fn unsupported_clauses_are_dropped() {
        let filters = [
            FilterClause::new("attr", "42", ValueType::Number),
            FilterClause::new(system_ids::NAME, "Bit", ValueType::Text),
        ];
        assert!(!filters[0].is_supported());
        assert!(filters[1].is_supported());
        let s = create_filter_string(&filters, Some(&type_id()));
        assert_eq!(
            parse_filter_string(&s).unwrap().clauses,
            vec![filters[1].clone()]
        );

        let only_unsupported = [FilterClause::new("attr", "42", ValueType::Number)];
        assert_eq!(
            create_filter_string(&only_unsupported, Some(&type_id())),
            r#"{typeIds_contains_nocase: ["type-id"]}"#
        );
    }

    #[test]
    fn tolerates_whitespace_and_unknown_keys() {
        let s = r#"{ and: [ { typeIds_contains_nocase: [ "T" ] } , { version_gt: "3" }, { entityOf_ : { attribute : "a", entityValue : "b" } } ] }"#;
        let parsed = parse_filter_string(s).unwrap();
        assert_eq!(parsed.type_id, Some(EntityId::from("T")));
        assert_eq!(parsed.clauses, vec![FilterClause::new("a", "b", ValueType::Entity)]);
    }

    #[test]
    fn malformed_input_reports_offset() {
        match parse_filter_string(r#"{typeIds_contains_nocase: ["T"]"#) {
            Err(CoreError::FilterParse { offset, .. }) => assert_eq!(offset, 31),
            other => panic!("expected parse error, got {other:?}"),
        }
        assert!(parse_filter_string(r#"{name_starts_with_nocase: "x}"#).is_err());
        assert!(parse_filter_string(r#"["T"]"#).is_err());
    }

    const TEXT: &str = "[a-zA-Z0-9 _\"\\\\-]{0,10}";
    const ID: &str = "[a-z0-9-]{1,8}";

    fn supported_clause() -> impl Strategy<Value = FilterClause> {
        prop_oneof![
            TEXT.prop_map(|v| FilterClause::new(system_ids::NAME, v, ValueType::Text)),
            TEXT.prop_map(|v| FilterClause::new(system_ids::SPACE, v, ValueType::Text)),
            (ID, TEXT).prop_map(|(a, v)| FilterClause::new(a, v, ValueType::Entity)),
            (ID, TEXT).prop_map(|(a, v)| FilterClause::new(a, v, ValueType::Text)),
        ]
    }

    proptest! {
        #[test]
        fn supported_clauses_round_trip(
            type_id in ID,
            filters in prop::collection::vec(supported_clause(), 0..5),
        ) {
            let type_id = EntityId::from(type_id.as_str());
            let parsed = parse_filter_string(&create_filter_string(&filters, Some(&type_id))).unwrap();
            prop_assert_eq!(parsed, ParsedFilter { type_id: Some(type_id), clauses: filters });
        }
    }
}
