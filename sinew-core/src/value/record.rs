//! Records: ordered key-value containers.
//!
//! A record starts out plain. Observing it replaces each of its slots with an
//! intercepting one (see `reactive::observer`), after which `get` records
//! dependencies and `set` notifies watchers. Because Rust has no transparent
//! field interception, all access goes through [`Record::get`] and
//! [`Record::set`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::trace;

use super::{fmt_container, Accessor, Container, Property, SetFn, Value};
use crate::reactive::observer::{read_computed, read_reactive, write_reactive};
use crate::reactive::{Dependency, Observation, Watcher};

/// What a key holds.
#[derive(Clone)]
pub(crate) enum Slot {
    /// Not intercepted: the record is unobserved, or the key was added by a
    /// plain write after observation.
    Plain(Property),

    /// An intercepted data property with its own dependency.
    Reactive {
        value: Value,
        accessor: Option<Accessor>,
        dependency: Dependency,
    },

    /// A memoized derived property backed by a lazy watcher.
    Computed {
        watcher: Watcher,
        setter: Option<SetFn>,
    },
}

pub(crate) struct RecordInner {
    slots: RwLock<IndexMap<String, Slot>>,
    pub(crate) observation: OnceLock<Observation>,
    frozen: AtomicBool,
}

/// A shared handle to an ordered key-value container.
#[derive(Clone)]
pub struct Record(pub(crate) Arc<RecordInner>);

impl Record {
    pub fn new() -> Self {
        Self(Arc::new(RecordInner {
            slots: RwLock::new(IndexMap::new()),
            observation: OnceLock::new(),
            frozen: AtomicBool::new(false),
        }))
    }

    /// Builder: add a data property.
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.define(key, Property::Data(value.into()));
        self
    }

    /// Builder: add a property of any shape.
    pub fn with_property(self, key: impl Into<String>, property: Property) -> Self {
        self.define(key, property);
        self
    }

    /// Builder: add a read-only computed property.
    pub fn with_computed<G>(self, key: impl Into<String>, get: G) -> Self
    where
        G: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        self.define(key, Property::computed(get));
        self
    }

    /// Define (or redefine) a key without any interception.
    ///
    /// On an observed record the key stays untracked; use
    /// [`crate::set`] to add a key that watchers can see.
    pub fn define(&self, key: impl Into<String>, property: Property) -> &Self {
        if self.is_frozen() {
            return self;
        }
        self.0.slots.write().insert(key.into(), Slot::Plain(property));
        self
    }

    /// Read a key. `Undefined` if it does not exist.
    ///
    /// Inside a watcher evaluation, reading an intercepted key subscribes the
    /// watcher to it.
    pub fn get(&self, key: &str) -> Value {
        let slot = self.0.slots.read().get(key).cloned();
        match slot {
            None => Value::Undefined,
            Some(Slot::Plain(Property::Data(value))) => value,
            Some(Slot::Plain(Property::Accessor(accessor) | Property::Computed(accessor))) => {
                accessor.get(self)
            }
            Some(Slot::Reactive {
                value,
                accessor,
                dependency,
            }) => read_reactive(self, value, accessor.as_ref(), &dependency),
            Some(Slot::Computed { watcher, .. }) => read_computed(&watcher),
        }
    }

    /// Write a key.
    ///
    /// Existing keys are written through whatever accessor they have. A key
    /// that does not exist yet is inserted as a plain, untracked property.
    /// Writes to a frozen record are ignored.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if self.is_frozen() {
            trace!(key, "write to frozen record ignored");
            return;
        }

        let slot = self.0.slots.read().get(key).cloned();
        match slot {
            None => {
                self.0
                    .slots
                    .write()
                    .insert(key.to_owned(), Slot::Plain(Property::Data(value)));
            }
            Some(Slot::Plain(Property::Data(_))) => {
                if let Some(Slot::Plain(Property::Data(stored))) = self.0.slots.write().get_mut(key)
                {
                    *stored = value;
                }
            }
            Some(Slot::Plain(Property::Accessor(accessor) | Property::Computed(accessor))) => {
                accessor.set(self, value);
            }
            Some(Slot::Reactive {
                value: current,
                accessor,
                dependency,
            }) => write_reactive(self, key, current, value, accessor.as_ref(), &dependency),
            Some(Slot::Computed { setter, .. }) => {
                if let Some(set) = setter {
                    set(self, value);
                }
            }
        }
    }

    /// Read without subscribing the active watcher.
    pub fn get_untracked(&self, key: &str) -> Value {
        crate::reactive::untracked(|| self.get(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.slots.read().contains_key(key)
    }

    /// The keys, in insertion order.
    ///
    /// Subscribes the active watcher to the record's membership, so adding or
    /// removing keys through [`crate::set`] / [`crate::unset`] re-runs it.
    pub fn keys(&self) -> Vec<String> {
        self.track_membership();
        self.keys_untracked()
    }

    /// Number of keys. Tracked like [`Record::keys`].
    pub fn len(&self) -> usize {
        self.track_membership();
        self.0.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every key with its current value, read through the normal read path.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.keys_untracked()
            .into_iter()
            .map(|key| {
                let value = self.get(&key);
                (key, value)
            })
            .collect()
    }

    /// Make the record non-extensible. An unobserved frozen record is never
    /// instrumented, and every write to a frozen record is ignored.
    pub fn freeze(&self) {
        self.0.frozen.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.load(Ordering::SeqCst)
    }

    pub fn is_observed(&self) -> bool {
        self.0.observation.get().is_some()
    }

    /// The container-level dependency (key addition/removal).
    pub fn dependency(&self) -> Option<Dependency> {
        self.0
            .observation
            .get()
            .map(|observation| observation.dependency().clone())
    }

    /// The dependency of an intercepted data property.
    pub fn dependency_of(&self, key: &str) -> Option<Dependency> {
        match self.0.slots.read().get(key) {
            Some(Slot::Reactive { dependency, .. }) => Some(dependency.clone()),
            _ => None,
        }
    }

    /// The lazy watcher behind an installed computed property.
    pub fn computed_watcher(&self, key: &str) -> Option<Watcher> {
        match self.0.slots.read().get(key) {
            Some(Slot::Computed { watcher, .. }) => Some(watcher.clone()),
            _ => None,
        }
    }

    pub fn ptr_eq(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn keys_untracked(&self) -> Vec<String> {
        self.0.slots.read().keys().cloned().collect()
    }

    /// Snapshot of every key that is not intercepted yet.
    pub(crate) fn plain_properties(&self) -> Vec<(String, Property)> {
        self.0
            .slots
            .read()
            .iter()
            .filter_map(|(key, slot)| match slot {
                Slot::Plain(property) => Some((key.clone(), property.clone())),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn plain_property(&self, key: &str) -> Option<Property> {
        match self.0.slots.read().get(key) {
            Some(Slot::Plain(property)) => Some(property.clone()),
            _ => None,
        }
    }

    pub(crate) fn install(&self, key: &str, slot: Slot) {
        self.0.slots.write().insert(key.to_owned(), slot);
    }

    /// Overwrite the stored value of an intercepted data property.
    pub(crate) fn store(&self, key: &str, value: Value) {
        if let Some(Slot::Reactive { value: stored, .. }) = self.0.slots.write().get_mut(key) {
            *stored = value;
        }
    }

    /// Delete a key. Returns whether anything was removed.
    pub(crate) fn remove(&self, key: &str) -> bool {
        if self.is_frozen() {
            return false;
        }
        self.0.slots.write().shift_remove(key).is_some()
    }

    /// The seed this record's children are observed under: its own seed when
    /// observed, otherwise the record itself.
    pub(crate) fn seed_container(&self) -> Container {
        let container = Container::Record(self.clone());
        container.seed().unwrap_or(container)
    }

    fn track_membership(&self) {
        if let Some(dependency) = self.dependency() {
            dependency.depend();
        }
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let record = Record::new();
        {
            let mut slots = record.0.slots.write();
            for (key, value) in iter {
                slots.insert(key.into(), Slot::Plain(Property::Data(value.into())));
            }
        }
        record
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_container(Arc::as_ptr(&self.0) as usize, f, |f| {
            let slots = self.0.slots.read();
            let mut map = f.debug_map();
            for (key, slot) in slots.iter() {
                match slot {
                    Slot::Plain(Property::Data(value))
                    | Slot::Reactive {
                        value,
                        accessor: None,
                        ..
                    } => map.entry(key, value),
                    Slot::Plain(Property::Accessor(_)) | Slot::Reactive { .. } => {
                        map.entry(key, &format_args!("<accessor>"))
                    }
                    Slot::Plain(Property::Computed(_)) | Slot::Computed { .. } => {
                        map.entry(key, &format_args!("<computed>"))
                    }
                };
            }
            map.finish()
        })
    }
}
