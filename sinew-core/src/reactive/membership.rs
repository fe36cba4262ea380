//! Membership mutators.
//!
//! Intercepted properties only see writes to keys that already exist. Adding
//! or deleting a key on an observed container has to go through [`set`] and
//! [`unset`], which notify the container-level dependency.

use tracing::trace;

use super::context::untracked;
use super::observer::reactive;
use crate::error::{Error, Result};
use crate::value::{KeyPath, Value};

/// Write `value` at `key` on `container`, adding the key if it is new.
///
/// `key` may be a dotted path; everything before the last segment must
/// resolve to a record or sequence. A sequence index may address an existing
/// element or the position just past the end. An existing key is written
/// through its accessor. A new key on an observed record becomes a reactive
/// property and the record's container-level dependency is notified, even if
/// the value is later written again unchanged.
pub fn set(container: &Value, key: &str, value: impl Into<Value>) -> Result<Value> {
    let value = value.into();
    let path = KeyPath::parse(key);
    let Some((parent_path, last)) = path.split_last() else {
        return Err(Error::NotAContainer { key: key.to_owned() });
    };
    let parent = untracked(|| parent_path.lookup(container));

    match parent {
        Some(Value::Record(record)) => {
            if record.contains_key(last) {
                record.set(last, value.clone());
                return Ok(value);
            }
            if record.is_frozen() {
                return Err(Error::NotExtensible { key: last.to_owned() });
            }
            let Some(dependency) = record.dependency() else {
                record.set(last, value.clone());
                return Ok(value);
            };
            reactive(&record, last, value.clone());
            trace!(key = last, "key added");
            dependency.notify();
            Ok(value)
        }
        Some(Value::Sequence(sequence)) => {
            let index = last
                .parse::<usize>()
                .map_err(|_| Error::InvalidIndex { key: last.to_owned() })?;
            let len = sequence.len_untracked();
            if index > len {
                return Err(Error::InvalidIndex { key: last.to_owned() });
            }
            if sequence.is_frozen() && index == len {
                return Err(Error::NotExtensible { key: last.to_owned() });
            }
            sequence.set(index, value.clone());
            Ok(value)
        }
        _ => Err(Error::NotAContainer { key: key.to_owned() }),
    }
}

/// Delete `key` from `container`. A no-op if the key does not resolve.
///
/// On a sequence the element is removed and later elements shift down.
pub fn unset(container: &Value, key: &str) {
    let path = KeyPath::parse(key);
    let Some((parent_path, last)) = path.split_last() else {
        return;
    };
    let parent = untracked(|| parent_path.lookup(container));

    match parent {
        Some(Value::Record(record)) => {
            if !record.remove(last) {
                return;
            }
            trace!(key = last, "key removed");
            if let Some(dependency) = record.dependency() {
                dependency.notify();
            }
        }
        Some(Value::Sequence(sequence)) => {
            if let Ok(index) = last.parse::<usize>() {
                sequence.remove(index);
            }
        }
        _ => {}
    }
}
