//! Dotted key paths.
//!
//! `"user.tags.0"` addresses key `user`, then key `tags`, then element `0`.
//! Resolution never fails: a missing segment resolves to `Undefined`.

use std::fmt;

use smallvec::SmallVec;

use super::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct KeyPath {
    segments: SmallVec<[String; 4]>,
}

impl KeyPath {
    /// Split on `.`. The empty string is the empty path, which resolves to
    /// the root itself.
    pub fn parse(path: &str) -> Self {
        if path.is_empty() {
            return Self::default();
        }
        Self {
            segments: path.split('.').map(str::to_owned).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The parent path and the final key, or `None` for the empty path.
    pub fn split_last(&self) -> Option<(KeyPath, &str)> {
        let (last, parent) = self.segments.split_last()?;
        let parent = KeyPath {
            segments: parent.iter().cloned().collect(),
        };
        Some((parent, last.as_str()))
    }

    /// Walk the path from `root`, or `None` at the first missing segment.
    ///
    /// Each step is an ordinary read, so walking a path inside a watcher
    /// subscribes the watcher to every property along the way.
    pub fn lookup(&self, root: &Value) -> Option<Value> {
        let mut current = root.clone();
        for segment in &self.segments {
            current = match &current {
                Value::Record(record) if record.contains_key(segment) => record.get(segment),
                Value::Sequence(sequence) => {
                    let index = segment.parse::<usize>().ok()?;
                    if index >= sequence.len_untracked() {
                        return None;
                    }
                    sequence.get(index)
                }
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn resolve(&self, root: &Value) -> Value {
        self.lookup(root).unwrap_or_default()
    }
}

impl From<&str> for KeyPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Record, Sequence};

    fn sample() -> Value {
        let tags: Sequence = vec!["a", "b"].into_iter().collect();
        let user = Record::new().with("name", "ada").with("tags", tags);
        Value::from(Record::new().with("user", user))
    }

    #[test]
    fn parse_splits_on_dots() {
        let path = KeyPath::parse("user.tags.0");
        assert_eq!(path.segments(), ["user", "tags", "0"]);
        assert_eq!(path.to_string(), "user.tags.0");
        assert!(KeyPath::parse("").is_empty());
    }

    #[test]
    fn resolves_records_and_sequences() {
        let root = sample();
        assert_eq!(KeyPath::parse("user.name").resolve(&root), Value::from("ada"));
        assert_eq!(KeyPath::parse("user.tags.1").resolve(&root), Value::from("b"));
    }

    #[test]
    fn unresolvable_paths_are_undefined() {
        let root = sample();
        for path in ["nope", "user.age", "user.tags.9", "user.tags.x", "user.name.first"] {
            assert!(KeyPath::parse(path).lookup(&root).is_none(), "{path}");
            assert!(KeyPath::parse(path).resolve(&root).is_undefined(), "{path}");
        }
    }

    #[test]
    fn empty_path_is_the_root() {
        let root = sample();
        assert!(KeyPath::parse("").resolve(&root).same(&root));
    }

    #[test]
    fn split_last_separates_parent() {
        let path = KeyPath::parse("a.b.c");
        let (parent, last) = path.split_last().unwrap();
        assert_eq!(parent.to_string(), "a.b");
        assert_eq!(last, "c");
        assert!(KeyPath::default().split_last().is_none());
    }
}
