//! Typed failure kinds.
//!
//! Every fallible operation in Cinegraph returns `anyhow::Result`. When a
//! failure belongs to one of the kinds below, the error chain carries an
//! [`EngineError`] so callers can classify it with
//! `err.downcast_ref::<EngineError>()`.
//!
//! | Kind | Meaning | Recovery |
//! |------|---------|----------|
//! | `Configuration` | store unreachable, table/column/collection missing | fatal, never retried |
//! | `Integrity` | orphaned edge rows present | run orphan repair |
//! | `Query` | unknown query id, malformed parameter | fix the call |
//! | `RebuildIncomplete` | embedded build interrupted | re-run the whole rebuild |

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("integrity error: {orphans} orphaned rows in {rule}")]
    Integrity { rule: String, orphans: i64 },

    #[error("query error [{query}]: {message}")]
    Query { query: String, message: String },

    #[error("rebuild of '{collection}' incomplete: {reason}")]
    RebuildIncomplete { collection: String, reason: String },
}

impl EngineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        EngineError::Configuration(message.into())
    }

    pub fn query(query: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Query {
            query: query.into(),
            message: message.into(),
        }
    }

    /// Missing table or collection, with the component that needed it.
    pub fn missing(kind: &str, name: &str) -> Self {
        EngineError::Configuration(format!("{} '{}' does not exist", kind, name))
    }
}

/// Classify an `anyhow` error chain, if it carries an [`EngineError`].
pub fn engine_error(err: &anyhow::Error) -> Option<&EngineError> {
    err.chain().find_map(|e| e.downcast_ref::<EngineError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn classify_through_context() {
        let res: anyhow::Result<()> = Err(EngineError::missing("table", "movies").into());
        let err = res.context("running q2").unwrap_err();
        match engine_error(&err) {
            Some(EngineError::Configuration(msg)) => assert!(msg.contains("movies")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn query_error_message_names_query() {
        let err = EngineError::query("q42", "unknown query id");
        assert_eq!(err.to_string(), "query error [q42]: unknown query id");
    }
}
