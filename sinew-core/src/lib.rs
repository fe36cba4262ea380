//! Sinew Core
//!
//! A fine-grained reactive data-binding engine. It instruments plain records
//! and sequences so that reads are observed, writes are intercepted, and
//! watchers are re-evaluated when anything they previously read changes.
//!
//! - Closed value model: records, sequences and scalars
//! - Dependency tracking with pruning of stale subscriptions
//! - Eager and deep watchers with `(new, old)` callbacks
//! - Memoized computed properties
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `value`: the value model, property accessors and key paths
//! - `reactive`: dependencies, watchers, the observer and membership mutators
//!
//! Field syntax cannot be intercepted in Rust, so all access goes through
//! [`Record::get`] / [`Record::set`] and their [`Sequence`] counterparts.
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use sinew_core::{observe, watch, Getter, Record, Value, WatchOptions};
//!
//! let state = Record::new().with("a", 1).with("b", 2);
//! let root = observe(&Value::from(state.clone()));
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let log = seen.clone();
//! let sum = watch(
//!     &root,
//!     Getter::reader(|o| {
//!         let a = o.get("a").as_number().unwrap_or(0.0);
//!         let b = o.get("b").as_number().unwrap_or(0.0);
//!         Value::from(a + b)
//!     }),
//!     move |new, old| log.lock().unwrap().push((new.clone(), old.clone())),
//!     WatchOptions::default(),
//! );
//! assert_eq!(sum.value(), Value::from(3));
//!
//! state.set("a", 5);
//! assert_eq!(*seen.lock().unwrap(), vec![(Value::from(7), Value::from(3))]);
//! ```

pub mod error;
pub mod reactive;
pub mod value;

pub use error::{Error, Result};
pub use reactive::{
    ignore, observe, set, untracked, unset, watch, Dependency, Getter, WatchOptions, Watcher,
};
pub use value::{Accessor, Container, KeyPath, Property, Record, Sequence, Value};
