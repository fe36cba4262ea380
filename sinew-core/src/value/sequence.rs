//! Sequences: ordered lists of values.
//!
//! Elements have no per-index dependency. Once a sequence is observed, every
//! structural or element write goes through its container-level dependency,
//! and every tracked read subscribes to it.

use std::cmp;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::trace;

use super::{fmt_container, Container, Value};
use crate::reactive::observer::inspect;
use crate::reactive::{Dependency, Observation};

pub(crate) struct SequenceInner {
    items: RwLock<Vec<Value>>,
    pub(crate) observation: OnceLock<Observation>,
    frozen: AtomicBool,
}

/// A shared handle to an ordered list.
#[derive(Clone)]
pub struct Sequence(pub(crate) Arc<SequenceInner>);

impl Sequence {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Arc::new(SequenceInner {
            items: RwLock::new(items),
            observation: OnceLock::new(),
            frozen: AtomicBool::new(false),
        }))
    }

    /// Element at `index`, or `Undefined`. Tracked.
    pub fn get(&self, index: usize) -> Value {
        self.track();
        self.0.items.read().get(index).cloned().unwrap_or_default()
    }

    /// Number of elements. Tracked.
    pub fn len(&self) -> usize {
        self.track();
        self.len_untracked()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the elements. Tracked.
    pub fn to_vec(&self) -> Vec<Value> {
        self.track();
        self.snapshot()
    }

    /// Replace the element at `index`, or append when `index` is the length.
    ///
    /// Returns false if nothing was stored: the sequence is frozen, or
    /// `index` is past the end. On an observed sequence an identity change is
    /// instrumented and notified; replacing an element with the same value is
    /// a no-op.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> bool {
        let value = value.into();
        if self.is_frozen() {
            trace!(index, "write to frozen sequence ignored");
            return false;
        }
        {
            let mut items = self.0.items.write();
            match index.cmp(&items.len()) {
                cmp::Ordering::Less => {
                    if items[index].same(&value) {
                        return true;
                    }
                    items[index] = value.clone();
                }
                cmp::Ordering::Equal => items.push(value.clone()),
                cmp::Ordering::Greater => {
                    trace!(index, len = items.len(), "write past the end ignored");
                    return false;
                }
            }
        }
        self.changed(Some(&value));
        true
    }

    pub fn push(&self, value: impl Into<Value>) {
        let value = value.into();
        if self.is_frozen() {
            return;
        }
        self.0.items.write().push(value.clone());
        self.changed(Some(&value));
    }

    pub fn pop(&self) -> Option<Value> {
        if self.is_frozen() {
            return None;
        }
        let popped = self.0.items.write().pop();
        if popped.is_some() {
            self.changed(None);
        }
        popped
    }

    /// Remove the element at `index`, shifting later elements down.
    pub fn remove(&self, index: usize) -> Option<Value> {
        if self.is_frozen() {
            return None;
        }
        let removed = {
            let mut items = self.0.items.write();
            (index < items.len()).then(|| items.remove(index))
        };
        if removed.is_some() {
            self.changed(None);
        }
        removed
    }

    pub fn freeze(&self) {
        self.0.frozen.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.load(Ordering::SeqCst)
    }

    pub fn is_observed(&self) -> bool {
        self.0.observation.get().is_some()
    }

    pub fn dependency(&self) -> Option<Dependency> {
        self.0
            .observation
            .get()
            .map(|observation| observation.dependency().clone())
    }

    pub fn ptr_eq(&self, other: &Sequence) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn snapshot(&self) -> Vec<Value> {
        self.0.items.read().clone()
    }

    pub(crate) fn len_untracked(&self) -> usize {
        self.0.items.read().len()
    }

    fn track(&self) {
        if let Some(dependency) = self.dependency() {
            dependency.depend();
        }
    }

    /// Instrument a newly stored element and notify, if observed.
    fn changed(&self, inserted: Option<&Value>) {
        let container = Container::Sequence(self.clone());
        let Some(dependency) = container.dependency() else {
            return;
        };
        if let Some(value) = inserted {
            let seed = container.seed().unwrap_or_else(|| container.clone());
            inspect(value, Some(&seed));
        }
        dependency.notify();
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Into<Value>> FromIterator<V> for Sequence {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_container(Arc::as_ptr(&self.0) as usize, f, |f| {
            f.debug_list().entries(self.0.items.read().iter()).finish()
        })
    }
}
