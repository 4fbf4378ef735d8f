use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use proptest::prelude::*;

use kgedit_core::{system_ids, Action, EntityId, SpaceId, Triple, TripleId, Value};
use kgedit_engine::entity::entities_from_triples;
use kgedit_engine::relation::relations_from_triples;
use kgedit_engine::squash::squash;
use kgedit_engine::{merge, with_local_names, EntityQuery, Fetched, TripleQuery};
use kgedit_harness::fixtures::{description, name, relation, type_of};
use kgedit_harness::{init_tracing, TestRemote, TestSession};

fn ready<T>(fetched: Fetched<T>) -> Result<T, Box<dyn std::error::Error>> {
    match fetched {
        Fetched::Ready(value) => Ok(value),
        Fetched::Retained(_) => Err("read was superseded".into()),
        Fetched::Pending => Err("read is pending".into()),
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn created_triple_is_visible_with_empty_remote() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let session = TestSession::new();
    session.create([name("s", "alice", "Alice")]);

    let query = TripleQuery {
        space: Some("s".into()),
        ..TripleQuery::default()
    };
    let triples = ready(session.source().fetch_triples(&query))?;
    assert_eq!(triples.len(), 1);
    assert_eq!(triples[0].value, Value::text("Alice"));
    assert!(!triples[0].has_been_published);

    let entity = ready(session.source().fetch_entity(&"alice".into()))?.ok_or("entity missing")?;
    assert_eq!(entity.name.as_deref(), Some("Alice"));
    Ok(())
}

#[test]
fn local_edit_shadows_remote_value() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let remote = Arc::new(TestRemote::with_triples(vec![name("s", "e1", "Alice")]));
    let session = TestSession::with_remote(remote.clone());

    let published = remote.triples().remove(0);
    session.store().update(name("s", "e1", "Bob"), published);

    let query = TripleQuery {
        space: Some("s".into()),
        ..TripleQuery::default()
    };
    let triples = ready(session.source().fetch_triples(&query))?;
    assert_eq!(triples.len(), 1);
    assert_eq!(triples[0].value, Value::text("Bob"));
    assert_eq!(triples[0].entity_name.as_deref(), Some("Bob"));

    let entity = ready(session.source().fetch_entity(&"e1".into()))?.ok_or("entity missing")?;
    assert_eq!(entity.name.as_deref(), Some("Bob"));
    assert_eq!(entity.triples.len(), 1);
    Ok(())
}

#[test]
fn local_only_entity_is_listed() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let remote = Arc::new(TestRemote::with_triples(vec![name("s", "remote", "Alpha")]));
    let session = TestSession::with_remote(remote);
    session.create([name("s", "local", "Alder"), type_of("s", "local", "tree", "Tree")]);

    let all = ready(session.source().fetch_entities(&EntityQuery {
        query: "al".into(),
        ..EntityQuery::default()
    }))?;
    let ids: Vec<&str> = all.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["remote", "local"]);

    let trees = ready(session.source().fetch_entities(&EntityQuery {
        type_ids: vec!["tree".into()],
        ..EntityQuery::default()
    }))?;
    assert_eq!(trees.len(), 1);
    assert_eq!(trees[0].id.as_str(), "local");
    Ok(())
}

#[test]
fn unknown_entity_is_none() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let session = TestSession::new();
    session.create([name("s", "alice", "Alice")]);
    assert!(ready(session.source().fetch_entity(&"Banana".into()))?.is_none());
    Ok(())
}

#[test]
fn relation_without_target_is_absent() -> Result<(), Box<dyn std::error::Error>> {
    let mut triples = relation("s", "r1", "friend-of", "alice", "bob", "a0");
    triples.retain(|t| !t.is_attribute(system_ids::RELATION_TO_ATTRIBUTE));
    assert!(relations_from_triples(&triples).is_empty());

    let complete = relation("s", "r2", "friend-of", "alice", "bob", "a0");
    assert_eq!(relations_from_triples(&complete).len(), 1);
    Ok(())
}

// ============================================================================
// Local edits across reads
// ============================================================================

#[test]
fn removed_remote_entity_is_not_listed() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let remote = Arc::new(TestRemote::with_triples(vec![name("s", "e1", "Alice")]));
    let session = TestSession::with_remote(remote.clone());
    session.store().remove(remote.triples().remove(0));

    let all = ready(session.source().fetch_entities(&EntityQuery::default()))?;
    assert!(all.is_empty(), "removed entity listed: {all:?}");
    Ok(())
}

#[test]
fn renamed_entity_leaves_stale_searches() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let remote = Arc::new(TestRemote::with_triples(vec![
        name("s", "e1", "Alice"),
        name("s", "e2", "Alina"),
    ]));
    let session = TestSession::with_remote(remote.clone());
    let alice = remote
        .triples()
        .into_iter()
        .find(|t| t.entity_id.as_str() == "e1")
        .ok_or("alice missing")?;
    session.store().update(name("s", "e1", "Bob"), alice);

    let stale = ready(session.source().fetch_entities(&EntityQuery {
        query: "ali".into(),
        ..EntityQuery::default()
    }))?;
    let ids: Vec<&str> = stale.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["e2"]);

    let fresh = ready(session.source().fetch_entities(&EntityQuery {
        query: "bo".into(),
        ..EntityQuery::default()
    }))?;
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].name.as_deref(), Some("Bob"));
    Ok(())
}

#[test]
fn renamed_type_reaches_triples_of_other_spaces() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let remote = Arc::new(TestRemote::with_triples(vec![type_of("b", "alice", "person", "Person")]));
    let session = TestSession::with_remote(remote);
    session.create([name("a", "person", "Human")]);

    let query = TripleQuery {
        space: Some("b".into()),
        ..TripleQuery::default()
    };
    let triples = ready(session.source().fetch_triples(&query))?;
    assert_eq!(triples.len(), 1);
    assert_eq!(triples[0].value, Value::entity("person", Some("Human")));
    Ok(())
}

#[test]
fn untouched_entity_shows_renamed_type() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let remote = Arc::new(TestRemote::with_triples(vec![
        name("b", "alice", "Alice"),
        type_of("b", "alice", "person", "Person"),
    ]));
    let session = TestSession::with_remote(remote);
    session.create([name("a", "person", "Human")]);

    let alice = ready(session.source().fetch_entity(&"alice".into()))?.ok_or("entity missing")?;
    assert_eq!(alice.name.as_deref(), Some("Alice"));
    let type_names: Vec<Option<&str>> = alice.types.iter().map(|t| t.name.as_deref()).collect();
    assert_eq!(type_names, vec![Some("Human")]);

    let listed = ready(session.source().fetch_entities(&EntityQuery {
        query: "alice".into(),
        ..EntityQuery::default()
    }))?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].types[0].name.as_deref(), Some("Human"));
    Ok(())
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn edited_triple_keeps_its_id() -> Result<(), Box<dyn std::error::Error>> {
    let session = TestSession::new();
    let original = name("s", "e1", "Alice");
    session.store().create(original.clone());
    session.store().update(
        Triple::new("s", "e1", system_ids::DESCRIPTION, Value::text("moved")),
        original.clone(),
    );
    session.store().update(name("s", "e1", "Carol"), original.clone());

    for action in session.store().actions_for_space(&"s".into()).iter().skip(1) {
        assert_eq!(action.id(), &original.id);
        assert_eq!(action.triple().id, original.id);
    }
    Ok(())
}

#[test]
fn merge_adds_only_new_remote_triples() -> Result<(), Box<dyn std::error::Error>> {
    let actions = vec![
        Action::Create(name("s", "a", "A")),
        Action::Create(description("s", "a", "local")),
    ];
    let local = squash(&actions);
    let remote = vec![
        description("s", "a", "remote").published(),
        name("s", "b", "B").published(),
    ];

    let merged = merge(&local, &remote);
    assert_eq!(merged.len(), 3);
    let descriptions: Vec<&Triple> = merged
        .iter()
        .filter(|t| t.is_attribute(system_ids::DESCRIPTION))
        .collect();
    assert_eq!(descriptions.len(), 1);
    assert_eq!(descriptions[0].value, Value::text("local"));
    assert!(merged.iter().any(|t| t.entity_id.as_str() == "b" && t.has_been_published));

    assert_eq!(merge(&merged, &remote), merged);
    Ok(())
}

#[test]
fn tombstone_hides_remote_everywhere() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let remote = Arc::new(TestRemote::with_triples(vec![
        name("s", "e1", "Alice"),
        description("s", "e1", "About Alice"),
    ]));
    let session = TestSession::with_remote(remote.clone());
    let published_description = remote
        .triples()
        .into_iter()
        .find(|t| t.is_attribute(system_ids::DESCRIPTION))
        .ok_or("description missing")?;
    session.store().remove(published_description);

    let entity = ready(session.source().fetch_entity(&"e1".into()))?.ok_or("entity missing")?;
    assert_eq!(entity.description, None);
    assert_eq!(entity.triples.len(), 1);

    let query = TripleQuery {
        space: Some("s".into()),
        ..TripleQuery::default()
    };
    let triples = ready(session.source().fetch_triples(&query))?;
    assert!(triples.iter().all(|t| !t.is_attribute(system_ids::DESCRIPTION)));
    Ok(())
}

#[test]
fn renames_reach_other_spaces_deterministically() -> Result<(), Box<dyn std::error::Error>> {
    let actions = vec![
        Action::Create(name("home", "person", "Human")),
        Action::Create(name("home", "person", "Person")),
    ];
    let elsewhere = vec![
        type_of("other", "alice", "person", "Old name"),
        Triple::new("other", "person", system_ids::DESCRIPTION, Value::text("d")).with_entity_name("Old name"),
        Triple::new("other", "bob", "person", Value::text("x")).with_attribute_name("Old name"),
    ];

    let once = with_local_names(&actions, elsewhere.clone());
    let twice = with_local_names(&actions, elsewhere);
    assert_eq!(once, twice);
    assert_eq!(once[0].value, Value::entity("person", Some("Person")));
    assert_eq!(once[1].entity_name.as_deref(), Some("Person"));
    assert_eq!(once[2].attribute_name.as_deref(), Some("Person"));

    let entities = entities_from_triples(&once);
    assert_eq!(entities[0].types[0].name.as_deref(), Some("Person"));
    Ok(())
}

fn triple_in(space: &'static str) -> impl Strategy<Value = Triple> {
    (
        prop::sample::select(vec!["e1", "e2", "e3"]),
        prop::sample::select(vec![system_ids::NAME, system_ids::DESCRIPTION, "age"]),
        "[a-z]{0,6}",
    )
        .prop_map(move |(entity, attribute, text)| Triple::new(space, entity, attribute, Value::text(text)))
}

fn local_action() -> impl Strategy<Value = Action> {
    (triple_in("s"), any::<bool>()).prop_map(|(triple, delete)| {
        if delete {
            Action::Delete(triple.tombstoned())
        } else {
            Action::Create(triple)
        }
    })
}

fn rename() -> impl Strategy<Value = Triple> {
    (
        prop::sample::select(vec!["a", "b"]),
        prop::sample::select(vec!["e1", "e2", "person"]),
        "[A-Z][a-z]{0,5}",
    )
        .prop_map(|(space, entity, text)| name(space, entity, &text))
}

proptest! {
    #[test]
    fn merge_is_idempotent_additive_and_local_first(
        actions in prop::collection::vec(local_action(), 0..12),
        remote in prop::collection::vec(triple_in("s"), 0..12),
    ) {
        let local = squash(&actions);
        let remote: Vec<Triple> = remote.into_iter().map(Triple::published).collect();
        let merged = merge(&local, &remote);

        prop_assert_eq!(&merge(&merged, &remote), &merged);

        let local_ids: HashSet<&TripleId> = local.iter().map(|t| &t.id).collect();
        let admitted = remote.iter().filter(|t| !local_ids.contains(&t.id)).count();
        prop_assert_eq!(merged.len(), local.len() + admitted);

        for held in &local {
            let same_id: Vec<&Triple> = merged.iter().filter(|t| t.id == held.id).collect();
            prop_assert_eq!(same_id, vec![held]);
        }
    }

    #[test]
    fn renames_from_every_space_reach_fetched_triples(renames in prop::collection::vec(rename(), 1..8)) {
        let remote = Arc::new(TestRemote::with_triples(vec![
            type_of("c", "alice", "person", "Person"),
            Triple::new("c", "alice", "e1", Value::entity("e2", Some("Old"))),
        ]));
        let session = TestSession::with_remote(remote);
        session.create(renames);

        let mut latest: HashMap<EntityId, String> = HashMap::new();
        for action in session.store().all_actions() {
            if let Some(name) = &action.triple().entity_name {
                latest.insert(action.entity_id().clone(), name.clone());
            }
        }

        let query = TripleQuery {
            space: Some("c".into()),
            ..TripleQuery::default()
        };
        let first = session.source().fetch_triples(&query);
        prop_assert!(first.is_ready());
        let triples = first.into_value().unwrap_or_default();
        prop_assert_eq!(triples.len(), 2);

        for triple in &triples {
            if let Some(target) = triple.value.as_entity_ref()
                && let Some(expected) = latest.get(&target.id)
            {
                prop_assert_eq!(target.name.as_ref(), Some(expected));
            }
            if let Some(expected) = latest.get(&triple.attribute_id) {
                prop_assert_eq!(triple.attribute_name.as_ref(), Some(expected));
            }
        }

        let again = session.source().fetch_triples(&query).into_value().unwrap_or_default();
        prop_assert_eq!(again, triples);
    }
}

#[test]
fn squash_follows_edits_across_attributes() -> Result<(), Box<dyn std::error::Error>> {
    let original = name("s", "e1", "Alice");
    let moved = Triple::new("s", "e1", system_ids::DESCRIPTION, Value::text("Alice"));
    let actions = vec![
        Action::Create(original.clone()),
        Action::edit(original.clone(), moved),
    ];
    let squashed = squash(&actions);
    assert_eq!(squashed.len(), 1);
    assert!(squashed[0].is_attribute(system_ids::DESCRIPTION));
    assert_eq!(squashed[0].id, original.id);
    let derived = TripleId::derive(
        &SpaceId::from("s"),
        &EntityId::from("e1"),
        &EntityId::from(system_ids::DESCRIPTION),
    );
    assert_ne!(squashed[0].id, derived);
    Ok(())
}
