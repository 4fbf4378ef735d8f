use std::collections::{HashMap, HashSet};

use kgedit_core::{Action, Triple, TripleId, TripleKey};

/// Collapses an action log to one current triple per `(entity, attribute)`.
///
/// Later actions win. Deleted positions stay in the output as tombstones so
/// that a merge can keep the remote copy from reappearing; use
/// [`squash_live`] for the visible set. Output order is first-seen key order.
pub fn squash(actions: &[Action]) -> Vec<Triple> {
    let mut state = SquashState::default();
    for action in actions {
        match action {
            Action::Create(t) => state.upsert(Triple {
                is_deleted: false,
                ..t.clone()
            }),
            Action::Delete(t) => state.upsert(t.clone().tombstoned()),
            Action::Edit { before, after } => {
                if before.key() != after.key() {
                    state.current.remove(&before.key());
                }
                state.upsert(Triple {
                    is_deleted: false,
                    ..after.clone()
                });
            }
        }
    }
    state.finish()
}

#[derive(Default)]
struct SquashState {
    order: Vec<TripleKey>,
    seen: HashSet<TripleKey>,
    current: HashMap<TripleKey, Triple>,
}

impl SquashState {
    fn upsert(&mut self, triple: Triple) {
        let key = triple.key();
        if self.seen.insert(key.clone()) {
            self.order.push(key.clone());
        }
        self.current.insert(key, triple);
    }

    fn finish(mut self) -> Vec<Triple> {
        self.order
            .into_iter()
            .filter_map(|key| self.current.remove(&key))
            .collect()
    }
}

/// [`squash`] without tombstones.
pub fn squash_live(actions: &[Action]) -> Vec<Triple> {
    squash(actions).into_iter().filter(|t| !t.is_deleted).collect()
}

pub fn unpublished(actions: &[Action]) -> Vec<Action> {
    actions.iter().filter(|a| !a.is_published()).cloned().collect()
}

struct FirstLast<'a> {
    first: &'a Action,
    last: &'a Action,
}

/// First and last action touching each triple id, in first-seen order.
fn first_and_last(actions: &[Action]) -> Vec<FirstLast<'_>> {
    let mut order: Vec<&TripleId> = Vec::new();
    let mut pairs: HashMap<&TripleId, FirstLast<'_>> = HashMap::new();
    for action in actions {
        let id = action.id();
        match pairs.get_mut(id) {
            Some(pair) => pair.last = action,
            None => {
                order.push(id);
                pairs.insert(
                    id,
                    FirstLast {
                        first: action,
                        last: action,
                    },
                );
            }
        }
    }
    order.into_iter().filter_map(|id| pairs.remove(id)).collect()
}

fn same_value(a: &Triple, b: &Triple) -> bool {
    a.value.value_type() == b.value.value_type() && a.value.raw() == b.value.raw()
}

/// Net effect of an action log per triple, ready for publishing.
///
/// Pairs that cancel out produce nothing: create then delete, delete then an
/// identical create, or a chain of edits that returns to the starting value.
/// Deletions come back as tombstoned triples.
pub fn squash_changes(actions: &[Action]) -> Vec<Triple> {
    first_and_last(actions)
        .into_iter()
        .filter_map(|FirstLast { first, last }| match (first, last) {
            (Action::Create(_), Action::Edit { after, .. }) => Some(after.clone()),
            (Action::Create(_), Action::Delete(_)) => None,
            (Action::Delete(before), Action::Create(after)) if same_value(before, after) => None,
            (Action::Edit { before, .. }, Action::Edit { after, .. }) if same_value(before, after) => {
                None
            }
            (_, Action::Delete(t)) => Some(t.clone().tombstoned()),
            (_, Action::Create(t)) => Some(Triple {
                is_deleted: false,
                ..t.clone()
            }),
            (_, Action::Edit { after, .. }) => Some(after.clone()),
        })
        .collect()
}

/// Number of user-visible changes in an action log.
pub fn change_count(actions: &[Action]) -> usize {
    first_and_last(actions)
        .into_iter()
        .map(|FirstLast { first, last }| match (first, last) {
            (Action::Create(_), Action::Delete(_)) => 0,
            (Action::Edit { before, .. }, Action::Edit { after, .. }) => {
                usize::from(!same_value(before, after))
            }
            _ => 1,
        })
        .sum()
}
