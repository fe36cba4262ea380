//! Reactive Core
//!
//! This module implements dependency tracking over records and sequences:
//! observing a value, watching reads over it, and notifying on writes.
//!
//! # Concepts
//!
//! ## Dependencies
//!
//! A [`Dependency`] is the subscriber set of one data location. Every
//! intercepted property has one, and every observed container has one for
//! its membership (keys added or removed, elements pushed or popped).
//!
//! ## Watchers
//!
//! A [`Watcher`] evaluates a getter and remembers every dependency the getter
//! read. Eager watchers re-run and call their callback as soon as one of
//! those dependencies notifies; lazy watchers (the memoized computed
//! properties) only mark themselves dirty and recompute on the next read.
//!
//! ## Observation
//!
//! [`observe`] instruments a value graph in place. After that, reading a
//! record key inside a watcher subscribes the watcher, and writing a key
//! with a new value notifies everyone subscribed.
//!
//! # Implementation Notes
//!
//! Tracking uses a thread-local stack of active watchers (see
//! [`ActiveTarget`]). Propagation is synchronous and depth-first: a write
//! returns only after every transitively affected eager watcher has re-run.
//! Nothing deduplicates notifications across distinct dependencies, so a
//! watcher reachable along two paths from one write runs twice.

mod context;
mod dependency;
mod membership;
pub(crate) mod observer;
mod traverse;
mod watcher;

pub use context::{untracked, ActiveTarget};
pub use dependency::{Dependency, DependencyId};
pub use membership::{set, unset};
pub use observer::{computed, inspect, observe, reactive};
pub use traverse::traverse;
pub use watcher::{
    ignore, watch, Callback, Getter, Reader, Registry, WatchOptions, Watcher, WatcherId,
};

pub(crate) use observer::Observation;
