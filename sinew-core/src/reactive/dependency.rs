//! Dependency Tracker
//!
//! A [`Dependency`] is the subscriber set attached to one data location: an
//! intercepted property, or a whole container (for key addition/removal).
//! Edges are mutual. A watcher appears in a dependency's set exactly when
//! the dependency appears in the watcher's list, and [`Watcher::depend`] /
//! watcher pruning update both sides together.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use super::context::ActiveTarget;
use super::watcher::{Watcher, WatcherId};

/// Unique identifier for a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DependencyId(u64);

impl DependencyId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DependencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dep#{}", self.0)
    }
}

struct DependencyInner {
    id: DependencyId,
    /// Subscribers in registration order, each at most once.
    subscribers: Mutex<IndexMap<WatcherId, Watcher>>,
}

/// The subscriber set of one data location.
///
/// Cloning yields another handle to the same set.
#[derive(Clone)]
pub struct Dependency(Arc<DependencyInner>);

impl Dependency {
    pub fn new() -> Self {
        Self(Arc::new(DependencyInner {
            id: DependencyId::next(),
            subscribers: Mutex::new(IndexMap::new()),
        }))
    }

    pub fn id(&self) -> DependencyId {
        self.0.id
    }

    /// Subscribe the active watcher, if any.
    pub fn depend(&self) {
        if let Some(watcher) = ActiveTarget::current() {
            watcher.depend(self);
        }
    }

    /// Inform every subscriber, in registration order.
    ///
    /// The subscriber list is snapshotted first; each eager subscriber runs
    /// to completion (including any writes it makes) before the next one is
    /// informed.
    pub fn notify(&self) {
        let subscribers = self.subscribers();
        trace!(dependency = %self.id(), subscribers = subscribers.len(), "notify");
        for watcher in subscribers {
            watcher.inform();
        }
    }

    pub fn subscribers(&self) -> Vec<Watcher> {
        self.0.subscribers.lock().values().cloned().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.0.subscribers.lock().len()
    }

    pub fn has_subscriber(&self, watcher: &Watcher) -> bool {
        self.0.subscribers.lock().contains_key(&watcher.id())
    }

    pub fn ptr_eq(&self, other: &Dependency) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// One side of an edge; use [`Watcher::depend`] to create both.
    pub(crate) fn add_subscriber(&self, watcher: &Watcher) {
        self.0
            .subscribers
            .lock()
            .entry(watcher.id())
            .or_insert_with(|| watcher.clone());
    }

    pub(crate) fn remove_subscriber(&self, id: WatcherId) {
        self.0.subscribers.lock().shift_remove(&id);
    }

    pub(crate) fn downgrade(&self) -> WeakDependency {
        WeakDependency {
            id: self.0.id,
            inner: Arc::downgrade(&self.0),
        }
    }
}

impl Default for Dependency {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("id", &self.0.id)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// A watcher's reference to a dependency it subscribes to.
///
/// Weak, so a watcher never keeps a dropped container's bookkeeping alive.
#[derive(Clone)]
pub(crate) struct WeakDependency {
    id: DependencyId,
    inner: Weak<DependencyInner>,
}

impl WeakDependency {
    pub(crate) fn id(&self) -> DependencyId {
        self.id
    }

    pub(crate) fn upgrade(&self) -> Option<Dependency> {
        self.inner.upgrade().map(Dependency)
    }
}
