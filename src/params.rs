//! Tolerant path-directed rewriting of configuration trees
//!
//! Module configuration arrives as an arbitrarily nested JSON tree in which
//! some values are resource references (a registered API response standing in
//! for an identifier) and some are human-friendly names that must be rewritten
//! to canonical identifiers. A reference path (an ordered list of field
//! names) says where in the tree a transformation applies; sequences
//! encountered along the way fan out, so one path covers repeated
//! sub-structures.
//!
//! Absent optional branches are the common case, not an error: every
//! operation reports a [`Descent`] outcome and callers are free to ignore it.

use serde_json::{Map, Value};

/// Outcome of one path-directed traversal.
///
/// The two not-found causes are distinguished so tests and diagnostics can
/// tell an absent key from a scalar standing where a container was expected.
/// Neither is an error; an untouched tree is a normal configuration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descent {
    /// The terminal rewrite ran (for a sequence: on at least one element, or
    /// vacuously on an empty one).
    Applied,
    /// A path segment named a key the enclosing mapping does not have.
    KeyAbsent,
    /// A path segment landed on a value that is neither a mapping nor a
    /// sequence.
    NotIndexable,
}

impl Descent {
    pub fn applied(&self) -> bool {
        matches!(self, Descent::Applied)
    }
}

fn merge_all(outcomes: impl Iterator<Item = Descent>) -> Descent {
    let mut last = Descent::Applied;
    let mut any_applied = false;
    for outcome in outcomes {
        match outcome {
            Descent::Applied => any_applied = true,
            other => last = other,
        }
    }
    if any_applied {
        Descent::Applied
    } else {
        last
    }
}

/// Read-only descent: the value at `path`, or `None` when any segment is
/// missing or not a mapping.
pub fn navigate<'a>(source: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = source;
    for key in path {
        current = current.as_object()?.get(*key)?;
    }
    Some(current)
}

/// Resolve resource-reference placeholders at `path`.
///
/// The value at the final segment is expected to be a record (an earlier API
/// response); it is replaced by its `field` member. A sequence at the final
/// segment fans out, each element resolved independently. Placeholders whose
/// record lacks `field`, and paths into absent branches, are left unresolved.
pub fn extract_field_at_path(path: &[&str], field: &str, root: &mut Value) -> Descent {
    descend(root, path, &|slot, _enclosing| extract_terminal(slot, field))
}

/// Rewrite the value at `path` through `callback`.
///
/// The callback receives the current value and the mapping that encloses it,
/// and returns the canonical replacement; the rule is the caller's (typically
/// name-to-self-link canonicalization, where the rule depends on resource
/// type). Descent and fan-out behave exactly as in [`extract_field_at_path`].
pub fn rewrite_at_path_with_callback<F>(path: &[&str], callback: F, root: &mut Value) -> Descent
where
    F: Fn(&Value, &Map<String, Value>) -> Value,
{
    descend(root, path, &|slot, enclosing| {
        callback_terminal(slot, enclosing, &callback)
    })
}

/// Shared traversal: consume `path` one mapping key at a time, fanning out
/// over sequences, and hand the final slot plus its enclosing mapping to
/// `terminal`.
fn descend(
    root: &mut Value,
    path: &[&str],
    terminal: &dyn Fn(&mut Value, &Map<String, Value>) -> Descent,
) -> Descent {
    let Some((key, rest)) = path.split_first() else {
        return Descent::Applied;
    };

    match root {
        Value::Object(map) => {
            if rest.is_empty() {
                // Snapshot the enclosing mapping before taking the slot
                // mutably; callbacks observe the pre-rewrite neighborhood.
                let enclosing = map.clone();
                match map.get_mut(*key) {
                    Some(slot) => terminal(slot, &enclosing),
                    None => Descent::KeyAbsent,
                }
            } else {
                match map.get_mut(*key) {
                    Some(next) => descend(next, rest, terminal),
                    None => Descent::KeyAbsent,
                }
            }
        }
        Value::Array(items) => merge_all(items.iter_mut().map(|item| descend(item, path, terminal))),
        _ => Descent::NotIndexable,
    }
}

fn extract_terminal(slot: &mut Value, field: &str) -> Descent {
    match slot {
        Value::Object(record) => match record.get(field) {
            Some(value) => {
                let value = value.clone();
                *slot = value;
                Descent::Applied
            }
            None => Descent::KeyAbsent,
        },
        Value::Array(items) => {
            merge_all(items.iter_mut().map(|item| extract_terminal(item, field)))
        }
        _ => Descent::NotIndexable,
    }
}

fn callback_terminal(
    slot: &mut Value,
    enclosing: &Map<String, Value>,
    callback: &dyn Fn(&Value, &Map<String, Value>) -> Value,
) -> Descent {
    match slot {
        Value::Array(items) => merge_all(
            items
                .iter_mut()
                .map(|item| callback_terminal(item, enclosing, callback)),
        ),
        current => {
            *current = callback(current, enclosing);
            Descent::Applied
        }
    }
}
