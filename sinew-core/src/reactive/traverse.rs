//! Deep traversal for deep watchers.
//!
//! Touches every container reachable from a value so the active watcher
//! subscribes to all of them, and to every intercepted key along the way,
//! without the getter reading them explicitly.

use std::collections::HashSet;

use super::dependency::DependencyId;
use crate::value::Value;

/// Subscribe the active watcher to everything reachable from `value`.
///
/// Each container is visited once per call, so self-referential graphs
/// terminate. Unobserved containers are not descended into.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    visit(value, &mut seen);
}

fn visit(value: &Value, seen: &mut HashSet<DependencyId>) {
    let Some(dependency) = value.dependency() else {
        return;
    };
    if !seen.insert(dependency.id()) {
        return;
    }
    dependency.depend();

    match value {
        Value::Record(record) => {
            for key in record.keys_untracked() {
                visit(&record.get(&key), seen);
            }
        }
        Value::Sequence(sequence) => {
            for item in sequence.snapshot() {
                visit(&item, seen);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::observe;
    use crate::reactive::watcher::{Getter, WatchOptions, Watcher};
    use crate::value::{Record, Sequence};

    #[test]
    fn traverse_outside_a_watcher_is_harmless() {
        let record = Record::new().with("a", 1);
        observe(&Value::from(record.clone()));

        traverse(&Value::from(record.clone()));
        assert_eq!(record.dependency().unwrap().subscriber_count(), 0);
    }

    #[test]
    fn traverse_reaches_nested_keys() {
        let leaf = Record::new().with("x", 1);
        let list: Sequence = vec![Value::from(leaf.clone())].into_iter().collect();
        let root = Record::new().with("list", list.clone());
        observe(&Value::from(root.clone()));

        let root_value = Value::from(root.clone());
        let watcher = Watcher::new(
            &root_value,
            Getter::reader(|target: &Value| {
                traverse(target);
                Value::Null
            }),
            None,
            WatchOptions::default(),
        );

        assert!(root.dependency().unwrap().has_subscriber(&watcher));
        assert!(list.dependency().unwrap().has_subscriber(&watcher));
        assert!(leaf.dependency().unwrap().has_subscriber(&watcher));
        assert!(leaf.dependency_of("x").unwrap().has_subscriber(&watcher));
    }

    #[test]
    fn traverse_terminates_on_cycles() {
        let record = Record::new();
        let list = Sequence::new();
        list.push(record.clone());
        record.set("self", list.clone());
        observe(&Value::from(record.clone()));

        let watcher = Watcher::new(
            &Value::from(record.clone()),
            Getter::reader(|target: &Value| {
                traverse(target);
                Value::Null
            }),
            None,
            WatchOptions::default(),
        );

        assert!(list.dependency().unwrap().has_subscriber(&watcher));
    }
}
