//! Object-Graph Inspector and property installers.
//!
//! [`inspect`] walks a value and attaches bookkeeping to every record and
//! sequence it reaches, exactly once. For records it replaces each plain key
//! with an intercepting slot:
//!
//! - data and custom-accessor keys become reactive properties ([`reactive`]):
//!   reads subscribe the active watcher, writes that change identity
//!   re-instrument the new value and notify;
//! - computed keys become memoized lazy watchers ([`computed`]) whose
//!   dependencies are forwarded to whoever reads them.
//!
//! Frozen containers and scalars pass through untouched.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, trace};

use super::context::{untracked, ActiveTarget};
use super::dependency::{Dependency, DependencyId};
use super::watcher::{Getter, Registry, WatchOptions, Watcher};
use crate::value::{Accessor, Container, Property, Record, Sequence, Slot, Value, WeakValue};

/// Bookkeeping attached to an observed container.
pub(crate) struct Observation {
    dependency: Dependency,
    /// The graph root; `None` when this container is the root.
    seed: Option<WeakValue>,
    /// Present on the root only.
    registry: Option<Registry>,
}

impl Observation {
    fn root() -> Self {
        Self {
            dependency: Dependency::new(),
            seed: None,
            registry: Some(Registry::default()),
        }
    }

    fn under(seed: &Container) -> Self {
        Self {
            dependency: Dependency::new(),
            seed: Some(seed.downgrade()),
            registry: None,
        }
    }

    pub(crate) fn dependency(&self) -> &Dependency {
        &self.dependency
    }

    pub(crate) fn seed(&self) -> Option<&WeakValue> {
        self.seed.as_ref()
    }

    pub(crate) fn registry(&self) -> Option<&Registry> {
        self.registry.as_ref()
    }
}

/// Instrument `value` in place and return it. Idempotent.
///
/// `value` becomes the root of its own graph unless it was already observed
/// under another one.
pub fn observe(value: &Value) -> Value {
    inspect(value, None)
}

/// Instrument `value` as part of the graph rooted at `seed` (or as a new root
/// when `seed` is `None`), recursing into every element and property.
pub fn inspect(value: &Value, seed: Option<&Container>) -> Value {
    let Some(container) = value.as_container() else {
        return value.clone();
    };
    if container.is_frozen() {
        trace!("frozen container passed through");
        return value.clone();
    }

    let observation = match seed {
        Some(seed) => Observation::under(seed),
        None => Observation::root(),
    };
    if !container.attach(observation) {
        return value.clone();
    }

    let seed = match seed {
        Some(seed) => seed.clone(),
        None => {
            debug!("observing new root");
            container.clone()
        }
    };

    match &container {
        Container::Sequence(sequence) => {
            for item in sequence.snapshot() {
                inspect(&item, Some(&seed));
            }
        }
        Container::Record(record) => {
            for (key, property) in record.plain_properties() {
                match property {
                    Property::Data(initial) => install_reactive(record, &key, initial, None, &seed),
                    Property::Accessor(accessor) => {
                        let initial = untracked(|| accessor.get(record));
                        install_reactive(record, &key, initial, Some(accessor), &seed);
                    }
                    Property::Computed(accessor) => install_computed(record, &key, accessor),
                }
            }
        }
    }

    value.clone()
}

/// Install an intercepted data property on `record`.
///
/// A custom accessor already defined on `key` is kept and wrapped. The
/// initial value is instrumented under the record's seed.
pub fn reactive(record: &Record, key: &str, initial: impl Into<Value>) {
    let accessor = match record.plain_property(key) {
        Some(Property::Accessor(accessor)) => Some(accessor),
        _ => None,
    };
    let seed = record.seed_container();
    install_reactive(record, key, initial.into(), accessor, &seed);
}

/// Turn the computed property defined on `key` into a memoized lazy watcher.
///
/// Returns false (and changes nothing) if `key` is not a plain computed
/// property.
pub fn computed(record: &Record, key: &str) -> bool {
    match record.plain_property(key) {
        Some(Property::Computed(accessor)) => {
            install_computed(record, key, accessor);
            true
        }
        _ => false,
    }
}

fn install_reactive(
    record: &Record,
    key: &str,
    initial: Value,
    accessor: Option<Accessor>,
    seed: &Container,
) {
    inspect(&initial, Some(seed));
    record.install(
        key,
        Slot::Reactive {
            value: initial,
            accessor,
            dependency: Dependency::new(),
        },
    );
}

fn install_computed(record: &Record, key: &str, accessor: Accessor) {
    let get = accessor.getter();
    let getter = Getter::Reader(Arc::new(move |target: &Value| match target.as_record() {
        Some(record) => get(record),
        None => Value::Undefined,
    }));
    let watcher = Watcher::new(&Value::Record(record.clone()), getter, None, WatchOptions::lazy());
    record.install(
        key,
        Slot::Computed {
            watcher,
            setter: accessor.setter(),
        },
    );
}

/// Read path of a reactive property.
pub(crate) fn read_reactive(
    record: &Record,
    stored: Value,
    accessor: Option<&Accessor>,
    dependency: &Dependency,
) -> Value {
    let value = match accessor {
        Some(accessor) => accessor.get(record),
        None => stored,
    };

    if let Some(watcher) = ActiveTarget::current() {
        watcher.depend(dependency);
        if let Some(child) = value.dependency() {
            watcher.depend(&child);
            if let Value::Sequence(sequence) = &value {
                depend_elements(sequence, &watcher);
            }
        }
    }

    value
}

/// Write path of a reactive property.
pub(crate) fn write_reactive(
    record: &Record,
    key: &str,
    stored: Value,
    value: Value,
    accessor: Option<&Accessor>,
    dependency: &Dependency,
) {
    let old = match accessor {
        Some(accessor) => untracked(|| accessor.get(record)),
        None => stored,
    };
    if value.same(&old) {
        trace!(key, "write suppressed: value unchanged");
        return;
    }

    let stored_by_setter = accessor.is_some_and(|accessor| accessor.set(record, value.clone()));
    if !stored_by_setter {
        record.store(key, value.clone());
    }

    inspect(&value, Some(&record.seed_container()));
    dependency.notify();
}

/// Read path of a computed property: re-evaluate if dirty, then hand the
/// computed's dependencies to the outer watcher.
pub(crate) fn read_computed(watcher: &Watcher) -> Value {
    let value = watcher.get();
    if let Some(outer) = ActiveTarget::current() {
        for dependency in watcher.dependencies() {
            outer.depend(&dependency);
        }
    }
    value
}

/// Subscribe `watcher` to every observed element of `sequence`, recursing
/// into nested sequences.
fn depend_elements(sequence: &Sequence, watcher: &Watcher) {
    let mut seen: HashSet<DependencyId> = HashSet::new();
    if let Some(dependency) = sequence.dependency() {
        seen.insert(dependency.id());
    }
    depend_elements_inner(sequence, watcher, &mut seen);
}

fn depend_elements_inner(sequence: &Sequence, watcher: &Watcher, seen: &mut HashSet<DependencyId>) {
    for item in sequence.snapshot() {
        let Some(dependency) = item.dependency() else {
            continue;
        };
        if !seen.insert(dependency.id()) {
            continue;
        }
        watcher.depend(&dependency);
        if let Value::Sequence(nested) = &item {
            depend_elements_inner(nested, watcher, seen);
        }
    }
}
