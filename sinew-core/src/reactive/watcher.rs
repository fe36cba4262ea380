//! Watcher Implementation
//!
//! A Watcher is the unit of subscription: a getter (a key path or a read
//! function) paired with an optional change callback.
//!
//! # How Watchers Work
//!
//! 1. Evaluation runs the getter with the watcher on top of the active-target
//!    stack. Every intercepted read along the way subscribes the watcher.
//!
//! 2. After evaluation, subscriptions that were held before but not renewed
//!    this time are dropped. Conditional reads therefore never keep stale
//!    subscriptions alive.
//!
//! 3. When a subscribed dependency notifies:
//!    - a lazy watcher only marks itself dirty and recomputes on next read;
//!    - an eager watcher recomputes immediately and calls its callback with
//!      `(new, old)` if the value changed identity, is a container (which may
//!      have been mutated in place), or the watcher is deep.
//!
//! # States
//!
//! `fresh -> idle/dirty -> (evaluating) -> idle/dirty -> ... -> inactive`.
//! Eager watchers are evaluated once on creation; lazy watchers start dirty.
//! [`Watcher::ignore`] is terminal: it severs every edge and nothing ever
//! reaches the watcher again.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::context::ActiveTarget;
use super::dependency::{Dependency, WeakDependency};
use super::observer::observe;
use super::traverse::traverse;
use crate::value::{KeyPath, Value, WeakValue};

/// Unique identifier for a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

impl WatcherId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watcher#{}", self.0)
    }
}

/// A read function. Receives the container the watcher was created on.
pub type Reader = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// A change callback, called with `(new, old)`.
pub type Callback = Arc<dyn Fn(&Value, &Value) + Send + Sync>;

/// What a watcher evaluates.
#[derive(Clone)]
pub enum Getter {
    /// A dotted key path resolved against the watched container.
    Path(KeyPath),
    /// An arbitrary read function.
    Reader(Reader),
}

impl Getter {
    pub fn path(path: &str) -> Self {
        Getter::Path(KeyPath::parse(path))
    }

    pub fn reader<F>(read: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Getter::Reader(Arc::new(read))
    }

    fn read(&self, target: &Value) -> Value {
        match self {
            Getter::Path(path) => path.resolve(target),
            Getter::Reader(read) => read(target),
        }
    }
}

impl From<&str> for Getter {
    fn from(path: &str) -> Self {
        Getter::path(path)
    }
}

impl From<String> for Getter {
    fn from(path: String) -> Self {
        Getter::path(&path)
    }
}

impl From<KeyPath> for Getter {
    fn from(path: KeyPath) -> Self {
        Getter::Path(path)
    }
}

impl fmt::Debug for Getter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Getter::Path(path) => write!(f, "Path({path})"),
            Getter::Reader(_) => f.write_str("Reader"),
        }
    }
}

/// Options accepted by [`watch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Traverse the whole result so nested mutations re-run the watcher even
    /// when they were never read directly.
    pub deep: bool,
    /// Defer evaluation until first read; afterwards only mark dirty on change.
    pub lazy: bool,
}

impl WatchOptions {
    pub fn deep() -> Self {
        Self {
            deep: true,
            lazy: false,
        }
    }

    pub fn lazy() -> Self {
        Self {
            deep: false,
            lazy: true,
        }
    }
}

struct WatcherState {
    active: bool,
    dirty: bool,
    value: Value,
    /// Dependencies currently held, each at most once.
    dependencies: SmallVec<[WeakDependency; 4]>,
}

struct WatcherInner {
    id: WatcherId,
    target: WeakValue,
    getter: Getter,
    callback: Option<Callback>,
    deep: bool,
    lazy: bool,
    state: Mutex<WatcherState>,
}

/// A handle to a watcher. Clones share state.
#[derive(Clone)]
pub struct Watcher(Arc<WatcherInner>);

impl Watcher {
    /// Create a watcher over `target`. Eager watchers are evaluated now.
    pub(crate) fn new(
        target: &Value,
        getter: Getter,
        callback: Option<Callback>,
        options: WatchOptions,
    ) -> Self {
        let watcher = Self(Arc::new(WatcherInner {
            id: WatcherId::next(),
            target: target.downgrade(),
            getter,
            callback,
            deep: options.deep,
            lazy: options.lazy,
            state: Mutex::new(WatcherState {
                active: true,
                dirty: options.lazy,
                value: Value::Undefined,
                dependencies: SmallVec::new(),
            }),
        }));

        if !options.lazy {
            let value = watcher.evaluate();
            watcher.0.state.lock().value = value;
        }

        watcher
    }

    pub fn id(&self) -> WatcherId {
        self.0.id
    }

    /// The cached value. `Undefined` for a lazy watcher never read.
    pub fn value(&self) -> Value {
        self.0.state.lock().value.clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.0.state.lock().dirty
    }

    pub fn is_active(&self) -> bool {
        self.0.state.lock().active
    }

    pub fn is_lazy(&self) -> bool {
        self.0.lazy
    }

    pub fn is_deep(&self) -> bool {
        self.0.deep
    }

    pub fn dependency_count(&self) -> usize {
        self.0.state.lock().dependencies.len()
    }

    /// The dependencies currently held that are still alive.
    pub fn dependencies(&self) -> Vec<Dependency> {
        self.0
            .state
            .lock()
            .dependencies
            .iter()
            .filter_map(WeakDependency::upgrade)
            .collect()
    }

    pub fn ptr_eq(&self, other: &Watcher) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Add the mutual edge between this watcher and `dependency`.
    ///
    /// Idempotent. An inactive watcher never acquires edges.
    pub fn depend(&self, dependency: &Dependency) {
        {
            let mut state = self.0.state.lock();
            if !state.active || state.dependencies.iter().any(|d| d.id() == dependency.id()) {
                return;
            }
            state.dependencies.push(dependency.downgrade());
        }
        dependency.add_subscriber(self);
        trace!(watcher = %self.id(), dependency = %dependency.id(), "subscribed");
    }

    /// Read the watcher's value, re-evaluating first if it is dirty.
    pub fn get(&self) -> Value {
        if self.is_dirty() {
            let value = self.evaluate();
            let mut state = self.0.state.lock();
            state.value = value;
            state.dirty = false;
        }
        self.value()
    }

    /// Mark the cached value stale; the next [`Watcher::get`] recomputes.
    pub fn mark_dirty(&self) {
        self.0.state.lock().dirty = true;
    }

    /// React to a change in one of the watcher's dependencies.
    pub fn inform(&self) {
        if self.0.lazy {
            self.mark_dirty();
            trace!(watcher = %self.id(), "marked dirty");
            return;
        }
        if !self.is_active() {
            return;
        }

        let value = self.evaluate();
        let old = self.value();
        if !value.same(&old) || value.is_container() || self.0.deep {
            self.0.state.lock().value = value.clone();
            if let Some(callback) = &self.0.callback {
                callback(&value, &old);
            }
        } else {
            trace!(watcher = %self.id(), "value unchanged, callback suppressed");
        }
    }

    /// Permanently deactivate the watcher and sever every edge it holds.
    pub fn ignore(&self) {
        let dependencies = {
            let mut state = self.0.state.lock();
            if !state.active {
                return;
            }
            state.active = false;
            std::mem::take(&mut state.dependencies)
        };
        for dependency in dependencies.iter().filter_map(WeakDependency::upgrade) {
            dependency.remove_subscriber(self.id());
        }
        debug!(watcher = %self.id(), released = dependencies.len(), "watcher ignored");
    }

    /// Run the getter, collecting a fresh dependency list, then drop the
    /// edges that were not renewed.
    pub(crate) fn evaluate(&self) -> Value {
        let previous = std::mem::take(&mut self.0.state.lock().dependencies);

        let value = {
            let _frame = ActiveTarget::enter(self);
            let target = self.0.target.upgrade();
            let value = self.0.getter.read(&target);
            if self.0.deep {
                traverse(&value);
            }
            value
        };

        let stale: SmallVec<[WeakDependency; 4]> = {
            let state = self.0.state.lock();
            previous
                .into_iter()
                .filter(|old| !state.dependencies.iter().any(|d| d.id() == old.id()))
                .collect()
        };
        for old in stale {
            if let Some(dependency) = old.upgrade() {
                dependency.remove_subscriber(self.id());
                trace!(watcher = %self.id(), dependency = %dependency.id(), "pruned");
            }
        }

        value
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.state.lock();
        f.debug_struct("Watcher")
            .field("id", &self.0.id)
            .field("getter", &self.0.getter)
            .field("deep", &self.0.deep)
            .field("lazy", &self.0.lazy)
            .field("active", &state.active)
            .field("dirty", &state.dirty)
            .field("dependency_count", &state.dependencies.len())
            .finish()
    }
}

/// The watchers created against one object graph, in creation order.
///
/// Attached to the graph's root and shared by every container under it.
#[derive(Clone, Default)]
pub struct Registry(Arc<Mutex<Vec<Watcher>>>);

impl Registry {
    pub(crate) fn push(&self, watcher: Watcher) {
        self.0.lock().push(watcher);
    }

    pub fn watchers(&self) -> Vec<Watcher> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn ptr_eq(&self, other: &Registry) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("len", &self.len()).finish()
    }
}

/// Watch `container` and call `on_change(new, old)` when the getter's result
/// changes.
///
/// `container` is observed first (a no-op if it already is). The returned
/// watcher is appended to the registry of the container's object graph.
pub fn watch<G, F>(container: &Value, getter: G, on_change: F, options: WatchOptions) -> Watcher
where
    G: Into<Getter>,
    F: Fn(&Value, &Value) + Send + Sync + 'static,
{
    let container = observe(container);
    let callback: Callback = Arc::new(on_change);
    let watcher = Watcher::new(&container, getter.into(), Some(callback), options);

    if let Some(registry) = container.as_container().and_then(|c| c.registry()) {
        registry.push(watcher.clone());
    }
    debug!(watcher = %watcher.id(), deep = options.deep, lazy = options.lazy, "watcher created");

    watcher
}

/// Permanently deactivate `watcher`. See [`Watcher::ignore`].
pub fn ignore(watcher: &Watcher) {
    watcher.ignore();
}
