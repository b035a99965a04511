//! Task identifiers
//!
//! IDs are opaque strings declared in the source documents (e.g. `IMPL-1`,
//! `BUILD-001-TESTS`). They must be non-empty and must not contain whitespace
//! or parentheses, since they appear inside `ids(...)` finder arguments.
//!
//! Outline headings that carry no explicit ID get a derived one of the form
//! `t-{7-char-hash}`, hashed from the heading's outline path so the same
//! heading keeps the same ID across loads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Task ID must not be empty")]
    Empty,

    #[error("Invalid task ID '{0}': IDs may not contain whitespace or parentheses")]
    InvalidChars(String),
}

/// Generates a 7-character hash from a seed string
fn generate_hash(seed: &str) -> String {
    let hash = blake3::hash(seed.as_bytes());
    let hex = hash.to_hex();
    hex[..7].to_string()
}

/// Globally unique, stable task identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// Derives an ID from a seed (the outline path of a heading)
    pub fn derive(seed: &str) -> Self {
        Self(format!("t-{}", generate_hash(seed)))
    }

    /// Returns the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl FromStr for TaskId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        if s.chars().any(|c| c.is_whitespace() || c == '(' || c == ')') {
            return Err(IdError::InvalidChars(s.to_string()));
        }

        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for TaskId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_id() {
        let id: TaskId = "IMPL-1".parse().unwrap();
        assert_eq!(id.as_str(), "IMPL-1");
        assert_eq!(id.to_string(), "IMPL-1");
    }

    #[test]
    fn parse_trims_whitespace() {
        let id: TaskId = "  TEST-1 ".parse().unwrap();
        assert_eq!(id.as_str(), "TEST-1");
    }

    #[test]
    fn reject_empty() {
        assert_eq!("".parse::<TaskId>(), Err(IdError::Empty));
        assert_eq!("   ".parse::<TaskId>(), Err(IdError::Empty));
    }

    #[test]
    fn reject_invalid_chars() {
        assert!(matches!("a b".parse::<TaskId>(), Err(IdError::InvalidChars(_))));
        assert!(matches!("ids(x)".parse::<TaskId>(), Err(IdError::InvalidChars(_))));
    }

    #[test]
    fn derived_ids_are_stable() {
        let a = TaskId::derive("Goal/Write tests");
        let b = TaskId::derive("Goal/Write tests");
        let c = TaskId::derive("Goal/Write docs");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with("t-"));
        assert_eq!(a.as_str().len(), 9);
    }

    #[test]
    fn serde_roundtrip() {
        let id: TaskId = "X-1".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"X-1\"");

        let parsed: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn serde_rejects_invalid() {
        let result: Result<TaskId, _> = serde_json::from_str("\"has space\"");
        assert!(result.is_err());
    }
}
