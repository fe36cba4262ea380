//! Property definitions.
//!
//! A record key is defined as one of three shapes, chosen by the caller when
//! the key is created rather than inferred from the stored value:
//!
//! - [`Property::Data`]: a plain stored value;
//! - [`Property::Accessor`]: a custom getter/setter pair. When the record is
//!   observed the pair is kept and wrapped, so custom accessors compose with
//!   dependency tracking;
//! - [`Property::Computed`]: a derived value. When the record is observed it
//!   becomes a lazily re-evaluated, memoized watcher.

use std::fmt;
use std::sync::Arc;

use super::{Record, Value};

/// Getter half of an accessor. Receives the record the key lives on.
pub type GetFn = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

/// Setter half of an accessor.
pub type SetFn = Arc<dyn Fn(&Record, Value) + Send + Sync>;

/// A getter with an optional setter.
#[derive(Clone)]
pub struct Accessor {
    get: GetFn,
    set: Option<SetFn>,
}

impl Accessor {
    pub fn new<G>(get: G) -> Self
    where
        G: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            set: None,
        }
    }

    pub fn with_setter<S>(mut self, set: S) -> Self
    where
        S: Fn(&Record, Value) + Send + Sync + 'static,
    {
        self.set = Some(Arc::new(set));
        self
    }

    pub fn get(&self, record: &Record) -> Value {
        (self.get)(record)
    }

    /// Run the setter. Returns false if there is none.
    pub fn set(&self, record: &Record, value: Value) -> bool {
        match &self.set {
            Some(set) => {
                set(record, value);
                true
            }
            None => false,
        }
    }

    pub fn has_setter(&self) -> bool {
        self.set.is_some()
    }

    pub(crate) fn getter(&self) -> GetFn {
        Arc::clone(&self.get)
    }

    pub(crate) fn setter(&self) -> Option<SetFn> {
        self.set.clone()
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("has_setter", &self.has_setter())
            .finish()
    }
}

/// How a record key is defined.
#[derive(Clone, Debug)]
pub enum Property {
    Data(Value),
    Accessor(Accessor),
    Computed(Accessor),
}

impl Property {
    /// A read-only derived property.
    pub fn computed<G>(get: G) -> Self
    where
        G: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        Property::Computed(Accessor::new(get))
    }
}

impl From<Value> for Property {
    fn from(value: Value) -> Self {
        Property::Data(value)
    }
}
