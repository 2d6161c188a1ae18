use std::fmt;

use serde::{Deserialize, Serialize};

use crate::PLACEHOLDER_IDENTITY;

/// Opaque credential bound to a slot's worker process.
///
/// The value is never interpreted; the only special value is the placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Placeholder entries are structurally valid but never assigned to a unit.
    #[inline]
    pub fn is_placeholder(&self) -> bool {
        self.0 == PLACEHOLDER_IDENTITY
    }

    /// Real identities are non-placeholder, non-blank values.
    #[inline]
    pub fn is_real(&self) -> bool {
        !self.is_placeholder() && !self.0.trim().is_empty()
    }

    pub fn placeholder() -> Self {
        Self(PLACEHOLDER_IDENTITY.to_string())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_not_real() {
        assert!(Identity::placeholder().is_placeholder());
        assert!(!Identity::placeholder().is_real());
        assert!(!Identity::from("   ").is_real());
        assert!(Identity::from("12345").is_real());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&Identity::from("abc")).unwrap();
        assert_eq!(json, r#""abc""#);
    }
}
