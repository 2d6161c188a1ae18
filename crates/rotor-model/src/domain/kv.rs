use serde::{Deserialize, Serialize};

/// Single environment binding passed to an execution unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    key: String,
    value: String,
}

impl KeyValue {
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// `KEY=value`, the form container runtimes expect for env bindings.
    pub fn to_binding(&self) -> String {
        format!("{}={}", self.key, self.value)
    }

    /// Parse a `KEY=value` binding. Values may contain `=`.
    pub fn parse_binding(raw: &str) -> Option<Self> {
        let (key, value) = raw.split_once('=')?;
        if key.is_empty() {
            return None;
        }
        Some(Self::new(key, value))
    }
}
