//! Hierarchical namespaces used to group entity and repository declarations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

const SEPARATOR: &str = "::";

/// A validated `::`-separated path such as `library::entity`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    /// Parse and validate a namespace.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidNamespace`] when the path is
    /// empty or one of its segments is empty or holds characters other than
    /// ASCII alphanumerics and `_`.
    pub fn parse(value: impl Into<String>) -> Result<Self, ConfigurationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ConfigurationError::InvalidNamespace {
                namespace: value,
                reason: "namespace must not be empty",
            });
        }
        for segment in value.split(SEPARATOR) {
            if segment.is_empty() {
                return Err(ConfigurationError::InvalidNamespace {
                    namespace: value,
                    reason: "namespace segments must not be empty",
                });
            }
            if !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(ConfigurationError::InvalidNamespace {
                    namespace: value,
                    reason: "namespace segments may only hold ASCII alphanumerics and '_'",
                });
            }
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `other` is this namespace or lives below it.
    ///
    /// Matching happens on segment boundaries: `library` contains
    /// `library::entity` but not `librarian::entity`.
    #[must_use]
    pub fn contains(&self, other: &str) -> bool {
        match other.strip_prefix(self.0.as_str()) {
            Some("") => true,
            Some(rest) => rest.starts_with(SEPARATOR),
            None => false,
        }
    }

    /// Whether one of the two namespaces contains the other.
    #[must_use]
    pub fn overlaps(&self, other: &Namespace) -> bool {
        self.contains(other.as_str()) || other.contains(self.as_str())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Namespace {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Namespace {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Namespace> for String {
    fn from(value: Namespace) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_accept_nested_namespace() {
        let ns = Namespace::parse("library::entity").unwrap();
        assert_eq!(ns.as_str(), "library::entity");
    }

    #[test]
    fn should_reject_empty_namespace() {
        assert!(Namespace::parse("").is_err());
    }

    #[test]
    fn should_reject_empty_segment() {
        assert!(Namespace::parse("library::::entity").is_err());
        assert!(Namespace::parse("library::").is_err());
    }

    #[test]
    fn should_reject_dotted_segment() {
        let result = Namespace::parse("com.dirk.library");
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidNamespace { .. })
        ));
    }

    #[test]
    fn should_contain_itself_and_children() {
        let ns = Namespace::parse("library").unwrap();
        assert!(ns.contains("library"));
        assert!(ns.contains("library::entity"));
        assert!(ns.contains("library::entity::archive"));
    }

    #[test]
    fn should_not_contain_sibling_sharing_a_prefix() {
        let ns = Namespace::parse("library").unwrap();
        assert!(!ns.contains("librarian::entity"));
        assert!(!ns.contains("accounts::entity"));
    }

    #[test]
    fn should_detect_overlap_in_both_directions() {
        let parent = Namespace::parse("library").unwrap();
        let child = Namespace::parse("library::repository").unwrap();
        let other = Namespace::parse("accounts::repository").unwrap();
        assert!(parent.overlaps(&child));
        assert!(child.overlaps(&parent));
        assert!(!child.overlaps(&other));
    }
}
