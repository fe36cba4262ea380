//! Integration Tests for the Reactive Core
//!
//! These tests drive observe / watch / set / unset end to end over real
//! record and sequence graphs.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;

use sinew_core::reactive::ActiveTarget;
use sinew_core::{
    ignore, observe, set, unset, watch, Accessor, Getter, Property, Record, Sequence, Value,
    WatchOptions, Watcher,
};

fn num(value: &Value) -> f64 {
    value.as_number().unwrap_or(0.0)
}

/// A callback that counts how often it runs.
fn counter() -> (Arc<AtomicI32>, impl Fn(&Value, &Value) + Send + Sync + 'static) {
    let hits = Arc::new(AtomicI32::new(0));
    let hits_clone = hits.clone();
    (hits, move |_: &Value, _: &Value| {
        hits_clone.fetch_add(1, Ordering::SeqCst);
    })
}

fn sum_of(keys: &'static [&'static str]) -> Getter {
    Getter::reader(move |o| Value::from(keys.iter().map(|key| num(&o.get(key))).sum::<f64>()))
}

/// Observing twice returns the same value and attaches nothing new.
#[test]
fn observe_is_idempotent() {
    let record = Record::new().with("a", 1);
    let value = Value::from(record.clone());

    let first = observe(&value);
    let registry = first.as_container().and_then(|c| c.registry()).unwrap();
    let dependency = record.dependency().unwrap();

    let second = observe(&first);

    assert!(second.same(&value));
    assert!(second.as_container().unwrap().registry().unwrap().ptr_eq(&registry));
    assert!(record.dependency().unwrap().ptr_eq(&dependency));
}

/// A write that changes a read value fires the callback once with (new, old).
#[test]
fn write_notifies_with_new_and_old() {
    let state = Record::new().with("a", 1).with("b", 2);
    let root = observe(&Value::from(state.clone()));

    let calls = Arc::new(Mutex::new(Vec::new()));
    let log = calls.clone();
    let watcher = watch(
        &root,
        sum_of(&["a", "b"]),
        move |new, old| log.lock().push((num(new), num(old))),
        WatchOptions::default(),
    );
    assert_eq!(watcher.value(), Value::from(3));

    state.set("a", 5);

    assert_eq!(*calls.lock(), vec![(7.0, 3.0)]);
    assert_eq!(watcher.value(), Value::from(7));
}

/// Writing the value a property already holds notifies nobody.
#[test]
fn unchanged_write_is_suppressed() {
    let state = Record::new().with("a", 1).with("b", 2);
    let root = observe(&Value::from(state.clone()));
    let (hits, callback) = counter();
    watch(&root, sum_of(&["a", "b"]), callback, WatchOptions::default());

    state.set("a", 5);
    state.set("a", 5);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // A re-evaluation that yields an identical scalar is suppressed too.
    let (sign_hits, sign_callback) = counter();
    watch(
        &root,
        Getter::reader(|o| Value::from(num(&o.get("a")) > 0.0)),
        sign_callback,
        WatchOptions::default(),
    );
    state.set("a", 6);
    assert_eq!(sign_hits.load(Ordering::SeqCst), 0);
}

/// A computed property does not run its getter until read.
#[test]
fn computed_is_lazy_and_memoized() {
    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let state = Record::new().with("a", 1).with("b", 2).with_computed("sum", move |o| {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        Value::from(num(&o.get("a")) + num(&o.get("b")))
    });
    observe(&Value::from(state.clone()));

    state.set("a", 5);
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    assert_eq!(state.get("sum"), Value::from(7));
    assert_eq!(state.get("sum"), Value::from(7));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    state.set("b", 10);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(state.computed_watcher("sum").unwrap().is_dirty());

    assert_eq!(state.get("sum"), Value::from(15));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// A watcher that reads a computed property is invalidated by the
/// computed's own sources.
#[test]
fn computed_dependencies_propagate_to_readers() {
    let state = Record::new()
        .with("a", 1)
        .with_computed("double", |o| Value::from(num(&o.get("a")) * 2.0));
    let root = observe(&Value::from(state.clone()));

    let calls = Arc::new(Mutex::new(Vec::new()));
    let log = calls.clone();
    let watcher = watch(
        &root,
        "double",
        move |new, old| log.lock().push((num(new), num(old))),
        WatchOptions::default(),
    );
    assert_eq!(watcher.value(), Value::from(2));
    assert!(state.dependency_of("a").unwrap().has_subscriber(&watcher));

    state.set("a", 2);

    assert_eq!(*calls.lock(), vec![(4.0, 2.0)]);
}

/// A computed defined with a setter delegates writes to it.
#[test]
fn computed_setter_writes_through() {
    let state = Record::new()
        .with("first", "Ada")
        .with("last", "Lovelace")
        .with_property(
            "full",
            Property::Computed(
                Accessor::new(|o| {
                    let first = o.get("first");
                    let last = o.get("last");
                    Value::from(format!(
                        "{} {}",
                        first.as_str().unwrap_or_default(),
                        last.as_str().unwrap_or_default()
                    ))
                })
                .with_setter(|o, value| {
                    if let Some((first, last)) = value.as_str().and_then(|s| s.split_once(' ')) {
                        o.set("first", first);
                        o.set("last", last);
                    }
                }),
            ),
        );
    let root = observe(&Value::from(state.clone()));
    let (hits, callback) = counter();
    watch(&root, "full", callback, WatchOptions::default());

    state.set("full", "Grace Hopper");

    assert_eq!(state.get("first"), Value::from("Grace"));
    assert_eq!(state.get("full"), Value::from("Grace Hopper"));
    // One notification per source write.
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

/// Switching branches drops the subscription to the branch no longer read.
#[test]
fn conditional_reads_are_pruned() {
    let state = Record::new().with("cond", true).with("a", 1).with("b", 2);
    let root = observe(&Value::from(state.clone()));
    let (hits, callback) = counter();
    let watcher = watch(
        &root,
        Getter::reader(|o| {
            if o.get("cond").as_bool().unwrap_or(false) {
                o.get("a")
            } else {
                o.get("b")
            }
        }),
        callback,
        WatchOptions::default(),
    );
    assert!(!state.dependency_of("b").unwrap().has_subscriber(&watcher));

    state.set("cond", false);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(state.dependency_of("a").unwrap().subscriber_count(), 0);
    assert_eq!(watcher.dependency_count(), 2);

    state.set("a", 100);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    state.set("b", 3);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

/// Adding and removing keys notifies watchers of the container.
#[test]
fn membership_changes_notify_container_watchers() {
    let state = Record::new().with("a", 1);
    let root = observe(&Value::from(state.clone()));

    let (deep_hits, deep_callback) = counter();
    watch(&root, "", deep_callback, WatchOptions::deep());

    let keys = Arc::new(Mutex::new(Vec::new()));
    let log = keys.clone();
    watch(
        &root,
        Getter::reader(|o| Value::from(o.as_record().map(Record::keys).unwrap_or_default())),
        move |new, _| log.lock().push(new.as_sequence().map_or(0, |s| s.len())),
        WatchOptions::default(),
    );

    set(&root, "c", 10).unwrap();
    assert_eq!(deep_hits.load(Ordering::SeqCst), 1);
    assert_eq!(*keys.lock(), vec![2]);

    // The new key is reactive from now on.
    state.set("c", 11);
    assert_eq!(deep_hits.load(Ordering::SeqCst), 2);

    unset(&root, "c");
    assert_eq!(deep_hits.load(Ordering::SeqCst), 3);
    assert_eq!(*keys.lock(), vec![2, 1]);

    // Removing a key that is not there changes nothing.
    unset(&root, "c");
    assert_eq!(deep_hits.load(Ordering::SeqCst), 3);
}

/// An ignored watcher never hears about anything again.
#[test]
fn ignored_watcher_stays_silent() {
    let state = Record::new().with("a", 1);
    let root = observe(&Value::from(state.clone()));
    let (hits, callback) = counter();
    let watcher = watch(&root, "a", callback, WatchOptions::default());

    state.set("a", 2);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    ignore(&watcher);
    ignore(&watcher);
    assert!(!watcher.is_active());
    assert_eq!(watcher.dependency_count(), 0);
    assert_eq!(state.dependency_of("a").unwrap().subscriber_count(), 0);

    state.set("a", 3);
    set(&root, "b", 1).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

/// Deep watchers see nested writes that shallow watchers miss.
#[test]
fn deep_watch_tracks_nested_writes() {
    let nested = Record::new().with("x", 1);
    let state = Record::new().with("nested", nested.clone());
    let root = observe(&Value::from(state.clone()));

    let (shallow_hits, shallow_callback) = counter();
    watch(&root, "nested", shallow_callback, WatchOptions::default());

    let calls = Arc::new(Mutex::new(Vec::new()));
    let log = calls.clone();
    watch(
        &root,
        "nested",
        move |new, old| log.lock().push(new.same(old)),
        WatchOptions::deep(),
    );

    nested.set("x", 2);

    assert_eq!(shallow_hits.load(Ordering::SeqCst), 0);
    // Same container on both sides: the change happened in place.
    assert_eq!(*calls.lock(), vec![true]);
}

/// Pushing onto a sequence held by a property re-runs its readers.
#[test]
fn sequence_mutation_notifies_readers() {
    let items = Sequence::new();
    let state = Record::new().with("items", items.clone());
    let root = observe(&Value::from(state.clone()));

    let lengths = Arc::new(Mutex::new(Vec::new()));
    let log = lengths.clone();
    watch(
        &root,
        Getter::reader(|o| Value::from(o.get("items").as_sequence().map_or(0, |s| s.len()))),
        move |new, _| log.lock().push(num(new)),
        WatchOptions::default(),
    );

    items.push(1);
    items.push(Record::new().with("y", 1));
    items.pop();
    items.set(0, 1);

    assert_eq!(*lengths.lock(), vec![1.0, 2.0, 1.0]);
}

/// An element pushed after observation joins the graph.
#[test]
fn pushed_elements_are_instrumented() {
    let items = Sequence::new();
    let root = observe(&Value::from(Record::new().with("items", items.clone())));
    let (hits, callback) = counter();
    watch(&root, "items", callback, WatchOptions::deep());

    let child = Record::new().with("y", 1);
    items.push(child.clone());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(child.is_observed());

    child.set("y", 2);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

/// Two eager watchers feeding one reader: a single write reaches the
/// reader once per path.
#[test]
fn diamond_notifies_at_least_once_per_path() {
    let state = Record::new().with("c", 1).with("a", 0).with("b", 0);
    let root = observe(&Value::from(state.clone()));

    for key in ["a", "b"] {
        let sink = state.clone();
        watch(
            &root,
            "c",
            move |new, _| sink.set(key, new.clone()),
            WatchOptions::default(),
        );
    }
    let (hits, callback) = counter();
    let reader = watch(&root, sum_of(&["a", "b"]), callback, WatchOptions::default());

    state.set("c", 2);

    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(reader.value(), Value::from(4));
}

/// Watcher callbacks run in creation order.
#[test]
fn subscribers_run_in_registration_order() {
    let state = Record::new().with("a", 1);
    let root = observe(&Value::from(state.clone()));
    let order = Arc::new(Mutex::new(Vec::new()));

    let watchers: Vec<Watcher> = (0..3)
        .map(|n| {
            let log = order.clone();
            watch(&root, "a", move |_, _| log.lock().push(n), WatchOptions::default())
        })
        .collect();

    state.set("a", 2);
    assert_eq!(*order.lock(), vec![0, 1, 2]);

    let registry = root.as_container().and_then(|c| c.registry()).unwrap();
    assert_eq!(registry.len(), 3);
    assert!(registry.watchers()[2].ptr_eq(&watchers[2]));
}

/// A panicking getter leaves the active-target stack clean.
#[test]
fn panicking_getter_unwinds_the_stack() {
    let state = Record::new().with("a", 1);
    let root = observe(&Value::from(state.clone()));
    watch(
        &root,
        Getter::reader(|o| {
            if o.get("a") == Value::from(99) {
                panic!("getter failed");
            }
            o.get("a")
        }),
        |_, _| {},
        WatchOptions::default(),
    );

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| state.set("a", 99)));
    assert!(result.is_err());
    assert_eq!(ActiveTarget::depth(), 0);

    // Tracking still works afterwards.
    let (hits, callback) = counter();
    watch(&root, "a", callback, WatchOptions::default());
    state.set("a", 3);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

/// Frozen containers are never instrumented, even inside an observed graph.
#[test]
fn frozen_containers_pass_through() {
    let frozen = Record::new().with("x", 1);
    frozen.freeze();
    let state = Record::new().with("frozen", frozen.clone()).with("a", 1);
    let root = observe(&Value::from(state.clone()));

    assert!(state.is_observed());
    assert!(!frozen.is_observed());
    assert!(frozen.dependency_of("x").is_none());

    let (hits, callback) = counter();
    watch(&root, "frozen.x", callback, WatchOptions::default());
    frozen.set("x", 2);
    assert_eq!(frozen.get("x"), Value::from(1));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

/// Bookkeeping never shows up when a graph is serialized.
#[test]
fn serialization_hides_bookkeeping() {
    let text = r#"{"a":1,"list":[1,2.5,{"b":true}],"name":"sinew"}"#;
    let root = Value::from_json_str(text).unwrap();
    observe(&root);
    let (_hits, callback) = counter();
    watch(&root, "list", callback, WatchOptions::deep());

    assert_eq!(serde_json::to_string(&root).unwrap(), text);

    let record = root.as_record().unwrap();
    record.set("gone", Value::Undefined);
    assert_eq!(root.to_json(), serde_json::from_str::<serde_json::Value>(text).unwrap());
}

/// Path getters resolve through records and sequences, and missing paths
/// read as undefined.
#[test]
fn path_getters_resolve_nested_values() {
    let root = Value::from_json_str(r#"{"user":{"tags":["a","b"]}}"#).unwrap();
    observe(&root);

    let second = watch(&root, "user.tags.1", |_, _| {}, WatchOptions::default());
    let missing = watch(&root, "user.missing.deep", |_, _| {}, WatchOptions::default());

    assert_eq!(second.value(), Value::from("b"));
    assert!(missing.value().is_undefined());

    let calls = Arc::new(Mutex::new(Vec::new()));
    let log = calls.clone();
    watch(
        &root,
        "user.name",
        move |new, old| log.lock().push((new.clone(), old.clone())),
        WatchOptions::default(),
    );
    set(&root, "user.name", "ada").unwrap();
    assert_eq!(*calls.lock(), vec![(Value::from("ada"), Value::Undefined)]);
}

/// A lazy watcher waits for an explicit read.
#[test]
fn lazy_watcher_defers_evaluation() {
    let state = Record::new().with("a", 1);
    let root = observe(&Value::from(state.clone()));
    let (hits, callback) = counter();
    let watcher = watch(&root, "a", callback, WatchOptions::lazy());

    assert!(watcher.is_dirty());
    assert!(watcher.value().is_undefined());
    assert_eq!(watcher.get(), Value::from(1));

    state.set("a", 2);
    assert!(watcher.is_dirty());
    assert_eq!(watcher.get(), Value::from(2));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

fn check_mutual_edges(
    state: &Record,
    keys: &[&str],
    watcher: &Watcher,
) -> Result<(), TestCaseError> {
    let held = watcher.dependencies();
    for key in keys {
        let dependency = state.dependency_of(key).unwrap();
        let in_watcher = held.iter().any(|d| d.ptr_eq(&dependency));
        prop_assert_eq!(dependency.has_subscriber(watcher), in_watcher);
    }
    Ok(())
}

proptest! {
    /// After any sequence of writes, the cached sum matches the data and
    /// every edge is mutual.
    #[test]
    fn watcher_tracks_arbitrary_writes(
        writes in prop::collection::vec((0usize..4, 0i32..5), 0..40),
    ) {
        const KEYS: [&str; 4] = ["k0", "k1", "k2", "k3"];
        let state = KEYS.iter().fold(Record::new(), |record, key| record.with(*key, 0));
        let root = observe(&Value::from(state.clone()));

        let sum = watch(&root, sum_of(&KEYS), |_, _| {}, WatchOptions::default());
        let branch = watch(
            &root,
            Getter::reader(|o| {
                if num(&o.get("k0")) as i64 % 2 == 0 {
                    o.get("k1")
                } else {
                    o.get("k2")
                }
            }),
            |_, _| {},
            WatchOptions::default(),
        );

        for (index, value) in writes {
            state.set(KEYS[index], value);

            let expected: f64 = KEYS.iter().map(|key| num(&state.get_untracked(key))).sum();
            prop_assert_eq!(num(&sum.value()), expected);
            check_mutual_edges(&state, &KEYS, &sum)?;
            check_mutual_edges(&state, &KEYS, &branch)?;
            prop_assert_eq!(branch.dependency_count(), 2);
        }
    }
}
