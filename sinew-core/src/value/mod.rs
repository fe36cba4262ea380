//! Value Model
//!
//! Every piece of data the engine can see is a [`Value`]. The set of shapes is
//! closed and decided when the value is built:
//!
//! - scalars (`Undefined`, `Null`, `Bool`, `Number`, `String`) are inert and
//!   compare by primitive equality;
//! - [`Record`]s (ordered key-value maps) and [`Sequence`]s (ordered lists) are
//!   shared handles. Cloning a handle does not copy the data, and two handles
//!   are "the same value" only when they point at the same container.
//!
//! Containers are the only values the observer instruments. The bookkeeping it
//! attaches (dependency, seed back-reference, watcher registry) lives in a
//! private slot inside the handle, so it never shows up in key iteration,
//! `Debug` output, equality, or serialization.

mod path;
mod property;
mod record;
mod sequence;

pub use path::KeyPath;
pub use property::{Accessor, GetFn, Property, SetFn};
pub use record::Record;
pub use sequence::Sequence;

pub(crate) use record::{RecordInner, Slot};
pub(crate) use sequence::SequenceInner;

use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Weak};

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::Result;
use crate::reactive::{untracked, Dependency, Observation, Registry};

/// A dynamically shaped value: a scalar, a record, or a sequence.
#[derive(Clone, Default)]
pub enum Value {
    /// The absence of a value. Returned for missing keys and unresolvable paths.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Record(Record),
    Sequence(Sequence),
}

impl Value {
    /// Parse JSON text into plain (not yet observed) values.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        Ok(json.into())
    }

    /// Convert to a `serde_json::Value`, reading every property untracked.
    pub fn to_json(&self) -> serde_json::Value {
        untracked(|| match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Record(record) => serde_json::Value::Object(
                record
                    .entries()
                    .into_iter()
                    .filter(|(_, value)| !value.is_undefined())
                    .map(|(key, value)| (key, value.to_json()))
                    .collect(),
            ),
            Value::Sequence(sequence) => serde_json::Value::Array(
                sequence.snapshot().iter().map(Value::to_json).collect(),
            ),
        })
    }

    /// Identity / primitive equality.
    ///
    /// Scalars compare by value (`NaN` never equals itself); containers
    /// compare by handle identity, never by contents.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a.ptr_eq(b),
            (Value::Sequence(a), Value::Sequence(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Read a key: a record property, or a sequence element by decimal index.
    ///
    /// Scalars and unparseable indices yield `Undefined`.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Record(record) => record.get(key),
            Value::Sequence(sequence) => match key.parse::<usize>() {
                Ok(index) => sequence.get(index),
                Err(_) => Value::Undefined,
            },
            _ => Value::Undefined,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for records and sequences.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Record(_) | Value::Sequence(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Sequence> {
        match self {
            Value::Sequence(sequence) => Some(sequence),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<Container> {
        match self {
            Value::Record(record) => Some(Container::Record(record.clone())),
            Value::Sequence(sequence) => Some(Container::Sequence(sequence.clone())),
            _ => None,
        }
    }

    /// The container-level dependency, if this value has been observed.
    pub fn dependency(&self) -> Option<Dependency> {
        self.as_container().and_then(|container| container.dependency())
    }

    pub(crate) fn downgrade(&self) -> WeakValue {
        match self {
            Value::Record(record) => WeakValue::Record(Arc::downgrade(&record.0)),
            Value::Sequence(sequence) => WeakValue::Sequence(Arc::downgrade(&sequence.0)),
            scalar => WeakValue::Scalar(scalar.clone()),
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    // Integral values inside the exactly-representable range print as integers.
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if n.fract() == 0.0 && n.abs() <= MAX_EXACT {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

thread_local! {
    /// Containers being formatted on this thread, outermost first.
    static FORMATTING: RefCell<Vec<usize>> = RefCell::new(Vec::new());
}

struct FormatFrame;

impl Drop for FormatFrame {
    fn drop(&mut self) {
        FORMATTING.with(|stack| stack.borrow_mut().pop());
    }
}

/// Run `body` for the container at `address`, or print `<cycle>` if that
/// container is already being formatted further up.
pub(crate) fn fmt_container(
    address: usize,
    f: &mut fmt::Formatter<'_>,
    body: impl FnOnce(&mut fmt::Formatter<'_>) -> fmt::Result,
) -> fmt::Result {
    let entered = FORMATTING.with(|stack| {
        let mut stack = stack.borrow_mut();
        if stack.contains(&address) {
            return false;
        }
        stack.push(address);
        true
    });
    if !entered {
        return f.write_str("<cycle>");
    }
    let _frame = FormatFrame;
    body(f)
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Record(record) => fmt::Debug::fmt(record, f),
            Value::Sequence(sequence) => fmt::Debug::fmt(sequence, f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Record(record)
    }
}

impl From<Sequence> for Value {
    fn from(sequence: Sequence) -> Self {
        Value::Sequence(sequence)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Sequence(items.into_iter().collect())
    }
}

impl From<Container> for Value {
    fn from(container: Container) -> Self {
        match container {
            Container::Record(record) => Value::Record(record),
            Container::Sequence(sequence) => Value::Sequence(sequence),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::Sequence(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Record(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        untracked(|| match self {
            Value::Undefined | Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => number_to_json(*n).serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::Record(record) => {
                let entries: Vec<_> = record
                    .entries()
                    .into_iter()
                    .filter(|(_, value)| !value.is_undefined())
                    .collect();
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in &entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::Sequence(sequence) => {
                let items = sequence.snapshot();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in &items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        })
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

/// A record or sequence handle.
#[derive(Clone, Debug)]
pub enum Container {
    Record(Record),
    Sequence(Sequence),
}

impl Container {
    pub fn ptr_eq(&self, other: &Container) -> bool {
        match (self, other) {
            (Container::Record(a), Container::Record(b)) => a.ptr_eq(b),
            (Container::Sequence(a), Container::Sequence(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn is_frozen(&self) -> bool {
        match self {
            Container::Record(record) => record.is_frozen(),
            Container::Sequence(sequence) => sequence.is_frozen(),
        }
    }

    pub fn is_observed(&self) -> bool {
        self.observation().is_some()
    }

    /// The container-level dependency, notified when keys are added or removed.
    pub fn dependency(&self) -> Option<Dependency> {
        self.observation().map(|observation| observation.dependency().clone())
    }

    /// The root of the object graph this container was observed under.
    ///
    /// `None` if the container has not been observed, or if its root has
    /// since been dropped.
    pub fn seed(&self) -> Option<Container> {
        let observation = self.observation()?;
        match observation.seed() {
            None => Some(self.clone()),
            Some(weak) => weak.upgrade().as_container(),
        }
    }

    /// The watcher registry shared by every container under the same seed.
    pub fn registry(&self) -> Option<Registry> {
        let seed = self.seed()?;
        let registry = seed.observation()?.registry().cloned();
        registry
    }

    pub(crate) fn observation(&self) -> Option<&Observation> {
        match self {
            Container::Record(record) => record.0.observation.get(),
            Container::Sequence(sequence) => sequence.0.observation.get(),
        }
    }

    /// Attach bookkeeping. Returns false if the container already had some.
    pub(crate) fn attach(&self, observation: Observation) -> bool {
        match self {
            Container::Record(record) => record.0.observation.set(observation).is_ok(),
            Container::Sequence(sequence) => sequence.0.observation.set(observation).is_ok(),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakValue {
        match self {
            Container::Record(record) => WeakValue::Record(Arc::downgrade(&record.0)),
            Container::Sequence(sequence) => WeakValue::Sequence(Arc::downgrade(&sequence.0)),
        }
    }
}

/// A non-owning reference to a value.
///
/// Watchers and seed back-references hold their containers through this so
/// that instrumenting a graph never creates reference cycles.
#[derive(Clone)]
pub(crate) enum WeakValue {
    Scalar(Value),
    Record(Weak<RecordInner>),
    Sequence(Weak<SequenceInner>),
}

impl WeakValue {
    /// The referenced value, or `Undefined` once the container is gone.
    pub(crate) fn upgrade(&self) -> Value {
        match self {
            WeakValue::Scalar(value) => value.clone(),
            WeakValue::Record(weak) => weak
                .upgrade()
                .map(|inner| Value::Record(Record(inner)))
                .unwrap_or_default(),
            WeakValue::Sequence(weak) => weak
                .upgrade()
                .map(|inner| Value::Sequence(Sequence(inner)))
                .unwrap_or_default(),
        }
    }
}
