//! Error types for the reactive core.
//!
//! Most failure modes in the binding engine are silent no-ops by contract
//! (instrumenting a frozen value, writing an unchanged value, removing a key
//! that is not there). The variants below cover the few operations that can
//! genuinely be asked to do something impossible.

use thiserror::Error;

/// Errors returned by membership mutation and the JSON bridge.
#[derive(Error, Debug)]
pub enum Error {
    /// The key path's parent resolved to a scalar (or nothing at all).
    #[error("cannot set `{key}`: parent is not a record or sequence")]
    NotAContainer {
        /// The full key path that was being written.
        key: String,
    },

    /// A sequence was addressed with a key that is not a decimal index.
    #[error("`{key}` is not a valid sequence index")]
    InvalidIndex {
        /// The offending key segment.
        key: String,
    },

    /// A new key was added to a frozen container.
    #[error("cannot add `{key}` to a frozen container")]
    NotExtensible {
        /// The key that could not be added.
        key: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for sinew operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_key() {
        let err = Error::NotAContainer { key: "a.b".into() };
        assert_eq!(err.to_string(), "cannot set `a.b`: parent is not a record or sequence");

        let err = Error::InvalidIndex { key: "x".into() };
        assert_eq!(err.to_string(), "`x` is not a valid sequence index");
    }

    #[test]
    fn json_errors_convert() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = parse.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
